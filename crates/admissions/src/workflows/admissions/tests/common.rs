use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::admissions::domain::{
    ApplicantId, ApplicationId, ApplicationRecord, NewApplication, WorkflowState,
};
use crate::workflows::admissions::memory::{InMemoryApplicationRepository, InMemoryPaymentLedger};
use crate::workflows::admissions::payments::{
    LedgerError, Payment, PaymentLedger, PaymentOutcome,
};
use crate::workflows::admissions::repository::{
    ApplicationFilter, ApplicationRepository, RepositoryError,
};
use crate::workflows::admissions::stages::{Stage, StageRegistry};
use crate::workflows::admissions::validation::FieldRule;
use crate::workflows::admissions::{admissions_router, AdmissionsWorkflow, FixedClock};

pub(super) type MemoryWorkflow = AdmissionsWorkflow<InMemoryApplicationRepository, InMemoryPaymentLedger>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn coding_stage_ends_at() -> DateTime<Utc> {
    now() + Duration::days(15)
}

pub(super) fn interview_starts_at() -> DateTime<Utc> {
    now() + Duration::days(16)
}

pub(super) fn stages() -> Vec<Stage> {
    vec![
        Stage {
            number: 1,
            name: "Application".to_string(),
            starts_at: None,
            ends_at: None,
            fields: Vec::new(),
        },
        Stage {
            number: 2,
            name: "Coding and Video".to_string(),
            starts_at: Some(now() - Duration::days(1)),
            ends_at: Some(coding_stage_ends_at()),
            fields: vec![
                FieldRule::url("git_repo_url", "Code Repository"),
                FieldRule::choice("app_type", &["website", "android", "ios"]).optional(),
                FieldRule::url("website", "Live Website").optional(),
                FieldRule::url("video_url", "Facebook Video"),
            ],
        },
        Stage {
            number: 3,
            name: "Interview".to_string(),
            starts_at: Some(interview_starts_at()),
            ends_at: Some(now() + Duration::days(46)),
            fields: Vec::new(),
        },
    ]
}

pub(super) fn registry() -> Arc<StageRegistry> {
    Arc::new(StageRegistry::new(stages()).expect("fixture stages are valid"))
}

pub(super) struct Harness {
    pub(super) workflow: Arc<MemoryWorkflow>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) ledger: Arc<InMemoryPaymentLedger>,
}

pub(super) fn harness() -> Harness {
    let clock = Arc::new(FixedClock::new(now()));
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let ledger = Arc::new(InMemoryPaymentLedger::default());
    let workflow = Arc::new(AdmissionsWorkflow::with_clock(
        registry(),
        repository.clone(),
        ledger.clone(),
        clock.clone(),
    ));
    Harness {
        workflow,
        clock,
        repository,
        ledger,
    }
}

pub(super) fn new_application(team_size: u8) -> NewApplication {
    NewApplication {
        batch: "batch-3".to_string(),
        team_lead_name: "Asha Lead".to_string(),
        team_lead_email: "asha@example.com".to_string(),
        team_size,
        college: Some("College of Engineering".to_string()),
    }
}

/// Application whose team lead has completed payment.
pub(super) fn paid_application(workflow: &MemoryWorkflow, team_size: u8) -> ApplicationRecord {
    let record = workflow
        .create_application(new_application(team_size))
        .expect("application created");
    workflow
        .record_payment(record.id(), &record.team_lead.id, PaymentOutcome::credited())
        .expect("payment recorded");
    workflow.get(record.id()).expect("application stored")
}

pub(super) fn payload(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub(super) fn valid_payload() -> BTreeMap<String, String> {
    payload(&[
        ("git_repo_url", "https://github.com/user/repo"),
        ("app_type", "website"),
        ("website", "example.com"),
        ("video_url", "https://facebook.com/user/videos/random"),
    ])
}

pub(super) fn assert_state(workflow: &MemoryWorkflow, id: &ApplicationId, expected: WorkflowState) {
    assert_eq!(
        workflow.current_status(id).expect("status available"),
        expected
    );
}

/// Store that fails every call, standing in for an unreachable database.
pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert_application(
        &self,
        _record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_application(
        &self,
        _record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_applications(
        &self,
        _filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// In-memory store whose saves can be switched off after records exist.
#[derive(Default)]
pub(super) struct SaveFailingRepository {
    pub(super) inner: InMemoryApplicationRepository,
    pub(super) failing: AtomicBool,
}

impl SaveFailingRepository {
    pub(super) fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ApplicationRepository for SaveFailingRepository {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert_application(record)
    }

    fn load_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.load_application(id)
    }

    fn save_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("offline".to_string()));
        }
        self.inner.save_application(record)
    }

    fn delete_application(
        &self,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.delete_application(id)
    }

    fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list_applications(filter)
    }
}

/// In-memory ledger that cannot purge.
#[derive(Default)]
pub(super) struct PurgeFailingLedger {
    pub(super) inner: InMemoryPaymentLedger,
}

impl PaymentLedger for PurgeFailingLedger {
    fn record_payment(
        &self,
        application_id: &ApplicationId,
        applicant_id: &ApplicantId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment, LedgerError> {
        self.inner
            .record_payment(application_id, applicant_id, outcome, at)
    }

    fn payments_for(&self, application_id: &ApplicationId) -> Result<Vec<Payment>, LedgerError> {
        self.inner.payments_for(application_id)
    }

    fn purge(&self, _application_id: &ApplicationId) -> Result<usize, LedgerError> {
        Err(LedgerError::Unavailable("offline".to_string()))
    }
}

pub(super) fn router_for(workflow: Arc<MemoryWorkflow>) -> axum::Router {
    admissions_router(workflow)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
