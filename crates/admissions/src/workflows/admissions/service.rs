use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::clock::{Clock, SystemClock};
use super::domain::{
    Applicant, ApplicantId, ApplicantRole, Application, ApplicationId, ApplicationRecord,
    NewApplication, Submission, SubmissionAccepted, SubmissionId, WorkflowState,
};
use super::errors::{NotFoundError, PreconditionError, WorkflowError};
use super::locks::{hold, ApplicationLocks};
use super::payments::{Payment, PaymentLedger, PaymentOutcome};
use super::repository::{ApplicationFilter, ApplicationRepository};
use super::stages::{Stage, StageRegistry};
use super::validation::{is_plausible_email, FieldIssue, SubmissionValidator, ValidationError};

/// Engine driving applications through payment, team completion, and stage submissions.
///
/// Every mutating call runs read-check-write under a per-application lock, and the store's
/// version check rejects any save that raced past it.
pub struct AdmissionsWorkflow<R, L> {
    registry: Arc<StageRegistry>,
    repository: Arc<R>,
    ledger: Arc<L>,
    validator: SubmissionValidator,
    clock: Arc<dyn Clock>,
    locks: ApplicationLocks,
    sequence: AtomicU64,
}

impl<R, L> AdmissionsWorkflow<R, L>
where
    R: ApplicationRepository + 'static,
    L: PaymentLedger + 'static,
{
    pub fn new(registry: Arc<StageRegistry>, repository: Arc<R>, ledger: Arc<L>) -> Self {
        Self::with_clock(registry, repository, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry: Arc<StageRegistry>,
        repository: Arc<R>,
        ledger: Arc<L>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            repository,
            ledger,
            validator: SubmissionValidator,
            clock,
            locks: ApplicationLocks::default(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{id:06}")
    }

    /// Build and store a new application at the batch's initial stage.
    pub fn create_application(
        &self,
        request: NewApplication,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let mut field_errors = BTreeMap::new();
        let name = request.team_lead_name.trim();
        if name.is_empty() {
            field_errors.insert("team_lead_name".to_string(), FieldIssue::Missing);
        }
        if !is_plausible_email(&request.team_lead_email) {
            field_errors.insert("team_lead_email".to_string(), FieldIssue::InvalidEmail);
        }
        if request.team_size == 0 {
            field_errors.insert("team_size".to_string(), FieldIssue::OutOfRange);
        }
        if request.batch.trim().is_empty() {
            field_errors.insert("batch".to_string(), FieldIssue::Missing);
        }
        if !field_errors.is_empty() {
            return Err(ValidationError { field_errors }.into());
        }

        let application = Application {
            id: ApplicationId(self.next_id("app")),
            batch: request.batch.trim().to_string(),
            stage_number: self.registry.initial_stage().number,
            state: WorkflowState::Unpaid,
            team_size: request.team_size,
            college: request.college.filter(|college| !college.trim().is_empty()),
            created_at: self.clock.now(),
            version: 0,
        };
        let team_lead = Applicant {
            id: ApplicantId(self.next_id("applicant")),
            name: name.to_string(),
            email: request.team_lead_email.trim().to_ascii_lowercase(),
            role: ApplicantRole::TeamLead,
        };

        let record = self.repository.insert_application(ApplicationRecord {
            application,
            team_lead,
            cofounders: Vec::new(),
            submissions: Vec::new(),
        })?;

        info!(
            application_id = %record.id(),
            team_size = record.application.team_size,
            "application created"
        );
        Ok(record)
    }

    /// Record a payment attempt; a paid attempt runs the post-payment transition.
    ///
    /// The ledger entry stands even if that transition cannot be saved. It is retried by
    /// `on_payment_completed` or by recording another credit, which reuses the settled payment
    /// instead of charging twice.
    pub fn record_payment(
        &self,
        application_id: &ApplicationId,
        applicant_id: &ApplicantId,
        outcome: PaymentOutcome,
    ) -> Result<Payment, WorkflowError> {
        self.with_application(application_id, |record| {
            if !record.is_member(applicant_id) {
                return Err(NotFoundError::Applicant {
                    application_id: application_id.clone(),
                    applicant_id: applicant_id.clone(),
                }
                .into());
            }

            if outcome.is_paid() && record.application.state == WorkflowState::Unpaid {
                let settled = self
                    .ledger
                    .payments_for(application_id)?
                    .into_iter()
                    .find(Payment::is_paid);
                if let Some(payment) = settled {
                    // An earlier credit was recorded but its transition never saved.
                    self.apply_payment_completed(record)?;
                    return Ok(payment);
                }
            }

            let payment =
                self.ledger
                    .record_payment(application_id, applicant_id, outcome, self.clock.now())?;
            info!(
                application_id = %application_id,
                payment_id = %payment.id.0,
                paid = payment.is_paid(),
                "payment recorded"
            );

            if payment.is_paid() {
                if let Err(err) = self.apply_payment_completed(record) {
                    warn!(
                        application_id = %application_id,
                        payment_id = %payment.id.0,
                        error = %err,
                        "payment recorded but transition pending"
                    );
                }
            }
            Ok(payment)
        })
    }

    /// Post-payment transition. Idempotent once the application has left `Unpaid`.
    pub fn on_payment_completed(
        &self,
        application_id: &ApplicationId,
    ) -> Result<WorkflowState, WorkflowError> {
        self.with_application(application_id, |record| {
            self.apply_payment_completed(record)
                .map(|record| record.application.state)
        })
    }

    fn apply_payment_completed(
        &self,
        mut record: ApplicationRecord,
    ) -> Result<ApplicationRecord, WorkflowError> {
        if record.application.state != WorkflowState::Unpaid {
            return Ok(record);
        }
        if !self.ledger.is_paid(record.id())? {
            return Err(PreconditionError::PaymentIncomplete(record.id().clone()).into());
        }

        let current = self.registry.stage_at(record.application.stage_number)?;
        if let Some(next) = self.registry.next_stage(current) {
            record.application.stage_number = next.number;
        }
        let next_state = Self::pre_submission_state(&record);
        self.transition(record, next_state)
    }

    /// Add a cofounder to the team. Completes `AwaitingCofounders` once the team is full.
    pub fn add_cofounder(
        &self,
        application_id: &ApplicationId,
        name: &str,
        email: &str,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let mut field_errors = BTreeMap::new();
        if name.trim().is_empty() {
            field_errors.insert("name".to_string(), FieldIssue::Missing);
        }
        if email.trim().is_empty() {
            field_errors.insert("email".to_string(), FieldIssue::Missing);
        } else if !is_plausible_email(email) {
            field_errors.insert("email".to_string(), FieldIssue::InvalidEmail);
        }
        if !field_errors.is_empty() {
            return Err(ValidationError { field_errors }.into());
        }

        let email = email.trim().to_ascii_lowercase();
        self.with_application(application_id, |mut record| {
            if record.application.state == WorkflowState::Completed {
                return Err(PreconditionError::InvalidState {
                    state: record.application.state,
                    operation: "add cofounders",
                }
                .into());
            }

            let taken = record.team_lead.email == email
                || self
                    .repository
                    .load_cofounders(record.id())?
                    .iter()
                    .any(|cofounder| cofounder.email == email);
            if taken {
                return Err(PreconditionError::DuplicateApplicant { email }.into());
            }

            let team = record.cofounders.len() + 2;
            if team > usize::from(record.application.team_size) {
                record.application.team_size = u8::try_from(team).unwrap_or(u8::MAX);
            }

            let from = record.application.state;
            if from == WorkflowState::AwaitingCofounders
                && record.cofounders.len() + 1 >= record.application.required_cofounders()
            {
                record.application.state = WorkflowState::AwaitingSubmission;
            }

            let cofounder = Applicant {
                id: ApplicantId(self.next_id("applicant")),
                name: name.trim().to_string(),
                email,
                role: ApplicantRole::Cofounder,
            };
            let saved = self.repository.add_cofounder_record(record, cofounder)?;
            info!(
                application_id = %saved.id(),
                cofounders = saved.cofounders.len(),
                "cofounder added"
            );
            if saved.application.state != from {
                info!(
                    application_id = %saved.id(),
                    stage = saved.application.stage_number,
                    %from,
                    to = %saved.application.state,
                    "application transitioned"
                );
            }
            Ok(saved)
        })
    }

    /// Accept a stage payload. Checks, in order: payment, current stage, state, window,
    /// cofounders, then the payload itself.
    pub fn submit(
        &self,
        application_id: &ApplicationId,
        stage_number: u32,
        payload: &BTreeMap<String, String>,
    ) -> Result<SubmissionAccepted, WorkflowError> {
        let stage = self.registry.stage_at(stage_number)?;
        let result = self.with_application(application_id, |mut record| {
            self.ensure_current_stage(&record, stage_number, "submit")?;
            let state = record.application.state;
            if !state.accepts_submission() {
                return Err(PreconditionError::InvalidState {
                    state,
                    operation: "submit",
                }
                .into());
            }

            let now = self.clock.now();
            self.ensure_window_open(stage, now)?;

            if !record.has_required_cofounders() {
                let required = record.application.required_cofounders();
                return Err(PreconditionError::CofoundersRequired {
                    required,
                    missing: required - record.cofounders.len(),
                }
                .into());
            }

            let validated = self.validator.validate(stage, payload)?;

            for previous in record
                .submissions
                .iter_mut()
                .filter(|submission| submission.active && submission.stage_number == stage_number)
            {
                previous.active = false;
                previous.redone_at = Some(now);
            }

            let submission = Submission {
                id: SubmissionId(self.next_id("sub")),
                stage_number,
                urls: validated.urls,
                values: validated.values,
                submitted_at: now,
                active: true,
                redone_at: None,
            };
            record.submissions.push(submission.clone());

            let saved = self.transition(record, WorkflowState::Submitted)?;
            Ok(SubmissionAccepted {
                application_id: saved.id().clone(),
                stage_number,
                submission,
                state: saved.application.state,
            })
        });

        if let Err(err) = &result {
            warn!(application_id = %application_id, stage = stage_number, error = %err, "submission rejected");
        }
        result
    }

    /// Withdraw the active submission for the current stage while its window is open.
    pub fn redo_submission(
        &self,
        application_id: &ApplicationId,
        stage_number: u32,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let stage = self.registry.stage_at(stage_number)?;
        self.with_application(application_id, |mut record| {
            self.ensure_current_stage(&record, stage_number, "redo a submission")?;
            if record.application.state != WorkflowState::Submitted {
                return Err(PreconditionError::InvalidState {
                    state: record.application.state,
                    operation: "redo a submission",
                }
                .into());
            }

            let now = self.clock.now();
            self.ensure_window_open(stage, now)?;

            for submission in record
                .submissions
                .iter_mut()
                .filter(|submission| submission.active && submission.stage_number == stage_number)
            {
                submission.active = false;
                submission.redone_at = Some(now);
            }

            let next_state = Self::pre_submission_state(&record);
            self.transition(record, next_state)
        })
    }

    /// Staff decision that a submitted application passes its current stage.
    pub fn mark_advanced(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, WorkflowError> {
        self.with_application(application_id, |record| {
            if record.application.state != WorkflowState::Submitted {
                return Err(PreconditionError::InvalidState {
                    state: record.application.state,
                    operation: "mark as advanced",
                }
                .into());
            }
            self.transition(record, WorkflowState::Advanced)
        })
    }

    /// Move an advanced application into its next stage, or complete it after the last one.
    pub fn advance(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, WorkflowError> {
        self.with_application(application_id, |mut record| {
            if record.application.state != WorkflowState::Advanced {
                return Err(PreconditionError::InvalidState {
                    state: record.application.state,
                    operation: "advance",
                }
                .into());
            }

            let current = self.registry.stage_at(record.application.stage_number)?;
            match self.registry.next_stage(current) {
                Some(next) => {
                    record.application.stage_number = next.number;
                    let next_state = Self::pre_submission_state(&record);
                    self.transition(record, next_state)
                }
                None => self.transition(record, WorkflowState::Completed),
            }
        })
    }

    pub fn current_status(
        &self,
        application_id: &ApplicationId,
    ) -> Result<WorkflowState, WorkflowError> {
        self.get(application_id)
            .map(|record| record.application.state)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.repository
            .load_application(application_id)?
            .ok_or_else(|| NotFoundError::Application(application_id.clone()).into())
    }

    pub fn list(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        Ok(self.repository.list_applications(filter)?)
    }

    pub fn payments(&self, application_id: &ApplicationId) -> Result<Vec<Payment>, WorkflowError> {
        self.get(application_id)?;
        Ok(self.ledger.payments_for(application_id)?)
    }

    /// Remove an application with its team and submissions. Paid applications are kept.
    pub fn delete_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let removed = self.with_application(application_id, |record| {
            if self.ledger.is_paid(record.id())? {
                return Err(PreconditionError::DeletionRestricted.into());
            }
            let removed = self.repository.delete_application(record.id())?;
            let purged = match self.ledger.purge(record.id()) {
                Ok(purged) => purged,
                Err(err) => {
                    if let Err(restore) = self.repository.insert_application(removed) {
                        warn!(
                            application_id = %record.id(),
                            error = %restore,
                            "could not restore application after failed purge"
                        );
                    }
                    return Err(err.into());
                }
            };
            info!(application_id = %record.id(), purged_payments = purged, "application deleted");
            Ok(removed)
        })?;
        self.locks.forget(application_id);
        Ok(removed)
    }

    fn with_application<T>(
        &self,
        application_id: &ApplicationId,
        operation: impl FnOnce(ApplicationRecord) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let handle = self.locks.handle(application_id);
        let _guard = hold(&handle);
        let record = self
            .repository
            .load_application(application_id)?
            .ok_or_else(|| NotFoundError::Application(application_id.clone()))?;
        operation(record)
    }

    fn ensure_current_stage(
        &self,
        record: &ApplicationRecord,
        requested: u32,
        operation: &'static str,
    ) -> Result<(), WorkflowError> {
        if record.application.state == WorkflowState::Unpaid {
            return Err(PreconditionError::PaymentRequired { operation }.into());
        }
        if record.application.stage_number != requested {
            return Err(PreconditionError::StageMismatch {
                current: record.application.stage_number,
                requested,
            }
            .into());
        }
        Ok(())
    }

    fn ensure_window_open(
        &self,
        stage: &Stage,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.registry.is_open(stage, now) {
            return Ok(());
        }
        match stage.ends_at {
            Some(ends_at) if now > ends_at => Err(WorkflowError::WindowClosed {
                stage: stage.number,
                ends_at,
            }),
            _ => Err(WorkflowError::WindowNotOpen {
                stage: stage.number,
            }),
        }
    }

    fn pre_submission_state(record: &ApplicationRecord) -> WorkflowState {
        if record.has_required_cofounders() {
            WorkflowState::AwaitingSubmission
        } else {
            WorkflowState::AwaitingCofounders
        }
    }

    fn transition(
        &self,
        mut record: ApplicationRecord,
        to: WorkflowState,
    ) -> Result<ApplicationRecord, WorkflowError> {
        let from = record.application.state;
        record.application.state = to;
        let saved = self.repository.save_application(record)?;
        info!(
            application_id = %saved.id(),
            stage = saved.application.stage_number,
            %from,
            %to,
            "application transitioned"
        );
        Ok(saved)
    }
}
