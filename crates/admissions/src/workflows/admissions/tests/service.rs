use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::workflows::admissions::domain::{ApplicantId, ApplicationId, WorkflowState};
use crate::workflows::admissions::errors::{NotFoundError, PreconditionError, WorkflowError};
use crate::workflows::admissions::memory::{InMemoryApplicationRepository, InMemoryPaymentLedger};
use crate::workflows::admissions::payments::{
    PaymentLedger, PaymentOutcome, PaymentRequestStatus, PaymentStatus,
};
use crate::workflows::admissions::repository::{ApplicationRepository, RepositoryError};
use crate::workflows::admissions::validation::FieldIssue;
use crate::workflows::admissions::AdmissionsWorkflow;

#[test]
fn payment_moves_team_without_cofounders_to_awaiting_cofounders() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);

    assert_eq!(record.application.state, WorkflowState::AwaitingCofounders);
    assert_eq!(record.application.stage_number, 2);
}

#[test]
fn payment_moves_solo_team_straight_to_submission() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 1);

    assert_eq!(record.application.state, WorkflowState::AwaitingSubmission);
    assert_eq!(record.application.stage_number, 2);
}

#[test]
fn submit_without_cofounders_is_a_precondition_failure_even_for_invalid_payloads() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);

    for body in [valid_payload(), payload(&[("video_url", "")])] {
        match workflow.submit(record.id(), 2, &body) {
            Err(WorkflowError::Precondition(PreconditionError::CofoundersRequired {
                required: 1,
                missing: 1,
            })) => {}
            other => panic!("expected cofounders precondition, got {other:?}"),
        }
    }

    let message = workflow
        .submit(record.id(), 2, &valid_payload())
        .expect_err("still rejected")
        .to_string();
    assert!(message.starts_with("cofounders required"), "{message}");
    assert_state(&workflow, record.id(), WorkflowState::AwaitingCofounders);
}

#[test]
fn adding_cofounder_unlocks_submission_and_normalizes_urls() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);

    let updated = workflow
        .add_cofounder(record.id(), "Ravi Cofounder", "ravi@example.com")
        .expect("cofounder added");
    assert_eq!(updated.application.state, WorkflowState::AwaitingSubmission);

    let accepted = workflow
        .submit(record.id(), 2, &valid_payload())
        .expect("submission accepted");
    assert_eq!(accepted.state, WorkflowState::Submitted);
    assert_eq!(
        accepted.submission.urls.get("website").map(String::as_str),
        Some("http://example.com")
    );
    assert_eq!(
        accepted.submission.urls.get("git_repo_url").map(String::as_str),
        Some("https://github.com/user/repo")
    );
    assert_eq!(
        accepted.submission.values.get("app_type").map(String::as_str),
        Some("website")
    );
    assert_state(&workflow, record.id(), WorkflowState::Submitted);
}

#[test]
fn missing_required_url_is_reported_per_field() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 1);

    match workflow.submit(record.id(), 2, &payload(&[("video_url", "https://facebook.com")])) {
        Err(WorkflowError::Validation(error)) => {
            assert_eq!(error.field_errors.len(), 1);
            assert_eq!(error.issue("git_repo_url"), Some(&FieldIssue::Missing));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_state(&workflow, record.id(), WorkflowState::AwaitingSubmission);
}

#[test]
fn submissions_after_deadline_fail_regardless_of_payload() {
    let Harness {
        workflow, clock, ..
    } = harness();
    let record = paid_application(&workflow, 1);
    clock.set(coding_stage_ends_at() + Duration::seconds(1));

    for body in [valid_payload(), payload(&[("unknown", "value")])] {
        match workflow.submit(record.id(), 2, &body) {
            Err(WorkflowError::WindowClosed { stage: 2, ends_at }) => {
                assert_eq!(ends_at, coding_stage_ends_at());
            }
            other => panic!("expected closed window, got {other:?}"),
        }
    }
}

#[test]
fn submit_on_the_deadline_is_still_accepted() {
    let Harness {
        workflow, clock, ..
    } = harness();
    let record = paid_application(&workflow, 1);
    clock.set(coding_stage_ends_at());

    assert!(workflow.submit(record.id(), 2, &valid_payload()).is_ok());
}

#[test]
fn redo_then_submit_leaves_exactly_one_active_submission() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 1);
    workflow
        .submit(record.id(), 2, &valid_payload())
        .expect("first submission");

    let redone = workflow
        .redo_submission(record.id(), 2)
        .expect("redo allowed while open");
    assert_eq!(redone.application.state, WorkflowState::AwaitingSubmission);
    assert!(redone.active_submission(2).is_none());

    let mut second = valid_payload();
    second.insert("website".to_string(), "https://example.org".to_string());
    let accepted = workflow
        .submit(record.id(), 2, &second)
        .expect("resubmission accepted");
    assert_eq!(accepted.state, WorkflowState::Submitted);

    let stored = workflow.get(record.id()).expect("stored");
    let active: Vec<_> = stored
        .submissions
        .iter()
        .filter(|submission| submission.active && submission.stage_number == 2)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, accepted.submission.id);
    assert_eq!(stored.submissions.len(), 2, "history is kept");
    assert!(stored.submissions[0].redone_at.is_some());
}

#[test]
fn redo_requires_an_open_window_and_a_submission() {
    let Harness {
        workflow, clock, ..
    } = harness();
    let record = paid_application(&workflow, 1);

    assert!(matches!(
        workflow.redo_submission(record.id(), 2),
        Err(WorkflowError::Precondition(PreconditionError::InvalidState {
            state: WorkflowState::AwaitingSubmission,
            ..
        }))
    ));

    workflow
        .submit(record.id(), 2, &valid_payload())
        .expect("submission accepted");
    clock.advance(Duration::days(30));

    assert!(matches!(
        workflow.redo_submission(record.id(), 2),
        Err(WorkflowError::WindowClosed { stage: 2, .. })
    ));
    assert_state(&workflow, record.id(), WorkflowState::Submitted);
}

#[test]
fn unpaid_applications_cannot_submit() {
    let Harness { workflow, .. } = harness();
    let record = workflow
        .create_application(new_application(1))
        .expect("created");

    assert!(matches!(
        workflow.submit(record.id(), 1, &payload(&[])),
        Err(WorkflowError::Precondition(
            PreconditionError::PaymentRequired { .. }
        ))
    ));
}

#[test]
fn submissions_target_the_current_stage_only() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 1);

    assert!(matches!(
        workflow.submit(record.id(), 3, &payload(&[])),
        Err(WorkflowError::Precondition(PreconditionError::StageMismatch {
            current: 2,
            requested: 3
        }))
    ));
    assert!(matches!(
        workflow.submit(record.id(), 9, &payload(&[])),
        Err(WorkflowError::NotFound(NotFoundError::Stage(9)))
    ));
    assert!(matches!(
        workflow.submit(&ApplicationId("missing".to_string()), 2, &valid_payload()),
        Err(WorkflowError::NotFound(NotFoundError::Application(_)))
    ));
}

#[test]
fn advancing_walks_through_remaining_stages_to_completion() {
    let Harness {
        workflow, clock, ..
    } = harness();
    let record = paid_application(&workflow, 1);
    let id = record.id().clone();

    assert!(matches!(
        workflow.advance(&id),
        Err(WorkflowError::Precondition(PreconditionError::InvalidState { .. }))
    ));

    workflow.submit(&id, 2, &valid_payload()).expect("submitted");
    workflow.mark_advanced(&id).expect("staff advanced");
    let interview = workflow.advance(&id).expect("moved to interview");
    assert_eq!(interview.application.stage_number, 3);
    assert_eq!(interview.application.state, WorkflowState::AwaitingSubmission);

    assert!(matches!(
        workflow.submit(&id, 3, &payload(&[])),
        Err(WorkflowError::WindowNotOpen { stage: 3 })
    ));

    clock.set(interview_starts_at());
    workflow.submit(&id, 3, &payload(&[])).expect("interview submitted");
    workflow.mark_advanced(&id).expect("staff advanced");
    let done = workflow.advance(&id).expect("completed");
    assert_eq!(done.application.state, WorkflowState::Completed);
    assert_eq!(done.application.stage_number, 3);

    assert!(matches!(
        workflow.add_cofounder(&id, "Late", "late@example.com"),
        Err(WorkflowError::Precondition(PreconditionError::InvalidState { .. }))
    ));
}

#[test]
fn paid_applications_never_return_to_unpaid() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);
    let id = record.id().clone();

    let mut seen = vec![workflow.current_status(&id).expect("status")];
    seen.push(workflow.on_payment_completed(&id).expect("idempotent"));
    workflow
        .record_payment(&id, &record.team_lead.id, PaymentOutcome::credited())
        .expect("second payment recorded");
    seen.push(workflow.current_status(&id).expect("status"));
    workflow
        .add_cofounder(&id, "Ravi", "ravi@example.com")
        .expect("cofounder");
    seen.push(workflow.current_status(&id).expect("status"));
    workflow.submit(&id, 2, &valid_payload()).expect("submitted");
    seen.push(workflow.current_status(&id).expect("status"));
    workflow.redo_submission(&id, 2).expect("redo");
    seen.push(workflow.current_status(&id).expect("status"));

    assert!(seen.iter().all(|state| *state != WorkflowState::Unpaid), "{seen:?}");
    assert_eq!(
        workflow.get(&id).expect("stored").application.stage_number,
        2,
        "repeated payments do not skip stages"
    );
}

#[test]
fn incomplete_payments_keep_application_unpaid() {
    let Harness { workflow, .. } = harness();
    let record = workflow
        .create_application(new_application(2))
        .expect("created");

    workflow
        .record_payment(
            record.id(),
            &record.team_lead.id,
            PaymentOutcome {
                request_status: PaymentRequestStatus::Completed,
                payment_status: Some(PaymentStatus::Failed),
            },
        )
        .expect("attempt recorded");
    assert_state(&workflow, record.id(), WorkflowState::Unpaid);

    assert!(matches!(
        workflow.on_payment_completed(record.id()),
        Err(WorkflowError::Precondition(
            PreconditionError::PaymentIncomplete(_)
        ))
    ));
}

#[test]
fn payments_must_come_from_team_members() {
    let Harness { workflow, .. } = harness();
    let record = workflow
        .create_application(new_application(1))
        .expect("created");

    assert!(matches!(
        workflow.record_payment(
            record.id(),
            &ApplicantId("stranger".to_string()),
            PaymentOutcome::credited()
        ),
        Err(WorkflowError::NotFound(NotFoundError::Applicant { .. }))
    ));
    assert!(workflow.payments(record.id()).expect("ledger").is_empty());
}

#[test]
fn cofounders_are_validated_and_deduplicated() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);

    match workflow.add_cofounder(record.id(), " ", "not-an-email") {
        Err(WorkflowError::Validation(error)) => {
            assert_eq!(error.issue("name"), Some(&FieldIssue::Missing));
            assert_eq!(error.issue("email"), Some(&FieldIssue::InvalidEmail));
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert!(matches!(
        workflow.add_cofounder(record.id(), "Asha Again", "ASHA@example.com"),
        Err(WorkflowError::Precondition(
            PreconditionError::DuplicateApplicant { .. }
        ))
    ));
}

#[test]
fn extra_cofounders_grow_the_team() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 2);

    workflow
        .add_cofounder(record.id(), "Ravi", "ravi@example.com")
        .expect("first cofounder");
    let grown = workflow
        .add_cofounder(record.id(), "Meera", "meera@example.com")
        .expect("second cofounder");

    assert_eq!(grown.cofounders.len(), 2);
    assert_eq!(grown.application.team_size, 3);
    assert_eq!(grown.application.state, WorkflowState::AwaitingSubmission);
    // One write per cofounder, the unlocking transition included.
    assert_eq!(grown.application.version, record.application.version + 2);
}

#[test]
fn create_application_reports_every_invalid_field() {
    let Harness { workflow, .. } = harness();
    let mut request = new_application(0);
    request.team_lead_name = String::new();
    request.team_lead_email = "lead".to_string();

    match workflow.create_application(request) {
        Err(WorkflowError::Validation(error)) => {
            assert_eq!(error.issue("team_size"), Some(&FieldIssue::OutOfRange));
            assert_eq!(error.issue("team_lead_name"), Some(&FieldIssue::Missing));
            assert_eq!(
                error.issue("team_lead_email"),
                Some(&FieldIssue::InvalidEmail)
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn deleting_paid_applications_is_restricted() {
    let Harness {
        workflow,
        repository,
        ledger,
        ..
    } = harness();
    let paid = paid_application(&workflow, 1);
    assert!(matches!(
        workflow.delete_application(paid.id()),
        Err(WorkflowError::Precondition(
            PreconditionError::DeletionRestricted
        ))
    ));

    let unpaid = workflow
        .create_application(new_application(1))
        .expect("created");
    workflow
        .record_payment(
            unpaid.id(),
            &unpaid.team_lead.id,
            PaymentOutcome {
                request_status: PaymentRequestStatus::Sent,
                payment_status: None,
            },
        )
        .expect("pending attempt");
    workflow
        .delete_application(unpaid.id())
        .expect("unpaid application deleted");

    assert!(repository
        .load_application(unpaid.id())
        .expect("store reachable")
        .is_none());
    assert!(ledger
        .payments_for(unpaid.id())
        .expect("ledger reachable")
        .is_empty());
    assert!(matches!(
        workflow.current_status(unpaid.id()),
        Err(WorkflowError::NotFound(_))
    ));
}

#[test]
fn concurrent_submissions_for_one_application_accept_exactly_one() {
    let Harness { workflow, .. } = harness();
    let record = paid_application(&workflow, 1);
    let id = record.id().clone();

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let workflow = Arc::clone(&workflow);
                let id = id.clone();
                scope.spawn(move || workflow.submit(&id, 2, &valid_payload()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread finished"))
            .collect()
    });

    let accepted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(outcomes.iter().filter_map(|outcome| outcome.as_ref().err()).all(|err| matches!(
        err,
        WorkflowError::Precondition(PreconditionError::InvalidState {
            state: WorkflowState::Submitted,
            ..
        })
    )));

    let stored = workflow.get(&id).expect("stored");
    assert_eq!(stored.submissions.len(), 1);
}

#[test]
fn store_failures_surface_as_unexpected_errors() {
    let workflow = AdmissionsWorkflow::with_clock(
        registry(),
        Arc::new(UnavailableRepository),
        Arc::new(InMemoryPaymentLedger::default()),
        Arc::new(crate::workflows::admissions::FixedClock::new(now())),
    );

    let error = workflow
        .create_application(new_application(1))
        .expect_err("store offline");
    assert!(matches!(
        error,
        WorkflowError::Repository(RepositoryError::Unavailable(_))
    ));
    assert!(error.is_unexpected());

    let error = workflow
        .submit(&ApplicationId("app-1".to_string()), 2, &valid_payload())
        .expect_err("store offline");
    assert!(error.is_unexpected());
}

#[test]
fn credit_recorded_while_store_is_down_is_settled_without_charging_twice() {
    let repository = Arc::new(SaveFailingRepository::default());
    let ledger = Arc::new(InMemoryPaymentLedger::default());
    let workflow = AdmissionsWorkflow::with_clock(
        registry(),
        repository.clone(),
        ledger.clone(),
        Arc::new(crate::workflows::admissions::FixedClock::new(now())),
    );
    let record = workflow
        .create_application(new_application(1))
        .expect("created");

    repository.fail_saves(true);
    let payment = workflow
        .record_payment(record.id(), &record.team_lead.id, PaymentOutcome::credited())
        .expect("payment stands even when the transition cannot be saved");
    assert!(payment.is_paid());
    assert_eq!(
        workflow.current_status(record.id()).expect("status"),
        WorkflowState::Unpaid
    );

    repository.fail_saves(false);
    let retried = workflow
        .record_payment(record.id(), &record.team_lead.id, PaymentOutcome::credited())
        .expect("retry settles");
    assert_eq!(retried.id, payment.id);
    assert_eq!(ledger.payments_for(record.id()).expect("ledger").len(), 1);
    assert_eq!(
        workflow.current_status(record.id()).expect("status"),
        WorkflowState::AwaitingSubmission
    );
}

#[test]
fn pending_transition_can_be_completed_explicitly() {
    let repository = Arc::new(SaveFailingRepository::default());
    let workflow = AdmissionsWorkflow::with_clock(
        registry(),
        repository.clone(),
        Arc::new(InMemoryPaymentLedger::default()),
        Arc::new(crate::workflows::admissions::FixedClock::new(now())),
    );
    let record = workflow
        .create_application(new_application(2))
        .expect("created");

    repository.fail_saves(true);
    workflow
        .record_payment(record.id(), &record.team_lead.id, PaymentOutcome::credited())
        .expect("payment recorded");
    assert!(workflow
        .on_payment_completed(record.id())
        .expect_err("store still offline")
        .is_unexpected());

    repository.fail_saves(false);
    assert_eq!(
        workflow.on_payment_completed(record.id()).expect("settles"),
        WorkflowState::AwaitingCofounders
    );
}

#[test]
fn failed_purge_keeps_the_application() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let ledger = Arc::new(PurgeFailingLedger::default());
    let workflow = AdmissionsWorkflow::with_clock(
        registry(),
        repository.clone(),
        ledger.clone(),
        Arc::new(crate::workflows::admissions::FixedClock::new(now())),
    );
    let record = workflow
        .create_application(new_application(1))
        .expect("created");
    workflow
        .record_payment(
            record.id(),
            &record.team_lead.id,
            PaymentOutcome {
                request_status: PaymentRequestStatus::Sent,
                payment_status: None,
            },
        )
        .expect("pending attempt");

    assert!(matches!(
        workflow.delete_application(record.id()),
        Err(WorkflowError::Ledger(_))
    ));
    let kept = repository
        .load_application(record.id())
        .expect("store reachable")
        .expect("application restored");
    assert_eq!(kept.team_lead.id, record.team_lead.id);
    assert_eq!(ledger.payments_for(record.id()).expect("ledger").len(), 1);
    assert_eq!(
        workflow.current_status(record.id()).expect("status"),
        WorkflowState::Unpaid
    );
}
