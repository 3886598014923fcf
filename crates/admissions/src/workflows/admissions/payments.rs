use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicantId, ApplicationId, PaymentId};

/// Lifecycle of the payment request sent to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

/// Settlement status reported for the payment itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Credit,
    Failed,
}

/// Gateway outcome as reported to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub request_status: PaymentRequestStatus,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

impl PaymentOutcome {
    pub const fn credited() -> Self {
        Self {
            request_status: PaymentRequestStatus::Completed,
            payment_status: Some(PaymentStatus::Credit),
        }
    }

    pub const fn is_paid(&self) -> bool {
        matches!(self.request_status, PaymentRequestStatus::Completed)
            && matches!(self.payment_status, Some(PaymentStatus::Credit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub application_id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub request_status: PaymentRequestStatus,
    pub payment_status: Option<PaymentStatus>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        PaymentOutcome {
            request_status: self.request_status,
            payment_status: self.payment_status,
        }
        .is_paid()
    }
}

/// Records payment attempts per application.
pub trait PaymentLedger: Send + Sync {
    /// Append an attempt; `paid_at` is stamped with `at` when the outcome is paid.
    fn record_payment(
        &self,
        application_id: &ApplicationId,
        applicant_id: &ApplicantId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment, LedgerError>;
    fn payments_for(&self, application_id: &ApplicationId) -> Result<Vec<Payment>, LedgerError>;
    fn purge(&self, application_id: &ApplicationId) -> Result<usize, LedgerError>;

    fn is_paid(&self, application_id: &ApplicationId) -> Result<bool, LedgerError> {
        Ok(self
            .payments_for(application_id)?
            .iter()
            .any(Payment::is_paid))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("payment ledger unavailable: {0}")]
    Unavailable(String),
}
