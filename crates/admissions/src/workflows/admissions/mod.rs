//! Batch admissions: payment-gated stage progression, team completion, and stage submissions.

mod clock;
pub mod domain;
pub mod errors;
mod locks;
pub mod memory;
pub mod payments;
pub mod repository;
pub mod router;
pub mod service;
pub mod stages;
pub mod validation;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Applicant, ApplicantId, ApplicantRole, Application, ApplicationId, ApplicationRecord,
    ApplicationStatusView, NewApplication, Submission, SubmissionAccepted, WorkflowState,
};
pub use errors::{NotFoundError, PreconditionError, WorkflowError};
pub use memory::{InMemoryApplicationRepository, InMemoryPaymentLedger};
pub use payments::{
    LedgerError, Payment, PaymentLedger, PaymentOutcome, PaymentRequestStatus, PaymentStatus,
};
pub use repository::{ApplicationFilter, ApplicationRepository, RepositoryError};
pub use router::admissions_router;
pub use service::AdmissionsWorkflow;
pub use stages::{Stage, StageRegistry, StageRegistryError};
pub use validation::{
    normalize_url, FieldIssue, FieldKind, FieldRule, SubmissionValidator, ValidationError,
};
