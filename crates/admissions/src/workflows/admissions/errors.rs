use chrono::{DateTime, Utc};

use super::domain::{ApplicantId, ApplicationId, WorkflowState};
use super::payments::LedgerError;
use super::repository::RepositoryError;
use super::validation::ValidationError;

/// Reference to an application, stage, or team member that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("application {0} not found")]
    Application(ApplicationId),
    #[error("stage {0} not found")]
    Stage(u32),
    #[error("applicant {applicant_id} is not on application {application_id}")]
    Applicant {
        application_id: ApplicationId,
        applicant_id: ApplicantId,
    },
}

/// Workflow state does not allow the requested operation yet. The user can act on these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("cofounders required: add {missing} more cofounder(s) before submitting")]
    CofoundersRequired { required: usize, missing: usize },
    #[error("payment required before {operation}")]
    PaymentRequired { operation: &'static str },
    #[error("payment for application {0} has not been completed")]
    PaymentIncomplete(ApplicationId),
    #[error("application is at stage {current}, not stage {requested}")]
    StageMismatch { current: u32, requested: u32 },
    #[error("cannot {operation} while application is {state}")]
    InvalidState {
        state: WorkflowState,
        operation: &'static str,
    },
    #[error("{email} is already on the team")]
    DuplicateApplicant { email: String },
    #[error("application has completed payments and cannot be deleted")]
    DeletionRestricted,
}

/// Failure surfaced by the admissions workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("stage {stage} closed at {ends_at}")]
    WindowClosed { stage: u32, ends_at: DateTime<Utc> },
    #[error("stage {stage} has not opened yet")]
    WindowNotOpen { stage: u32 },
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WorkflowError {
    /// Store and ledger failures. The attempted transition was not applied.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, WorkflowError::Repository(_) | WorkflowError::Ledger(_))
    }
}
