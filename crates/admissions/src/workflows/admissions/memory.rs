//! In-process store and ledger used by the API service, the demo, and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::domain::{ApplicantId, ApplicationId, ApplicationRecord, PaymentId};
use super::payments::{LedgerError, Payment, PaymentLedger, PaymentOutcome};
use super::repository::{ApplicationFilter, ApplicationRepository, RepositoryError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<BTreeMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.records);
        if guard.contains_key(record.id()) {
            return Err(RepositoryError::AlreadyExists);
        }
        guard.insert(record.id().clone(), record.clone());
        Ok(record)
    }

    fn load_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(lock(&self.records).get(id).cloned())
    }

    fn save_application(
        &self,
        mut record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.records);
        let stored = guard
            .get_mut(record.id())
            .ok_or(RepositoryError::NotFound)?;

        if stored.application.version != record.application.version {
            return Err(RepositoryError::StaleVersion {
                expected: record.application.version,
                found: stored.application.version,
            });
        }

        record.application.version += 1;
        *stored = record.clone();
        Ok(record)
    }

    fn delete_application(&self, id: &ApplicationId) -> Result<ApplicationRecord, RepositoryError> {
        lock(&self.records)
            .remove(id)
            .ok_or(RepositoryError::NotFound)
    }

    fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(lock(&self.records)
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct LedgerState {
    sequence: u64,
    payments: HashMap<ApplicationId, Vec<Payment>>,
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl PaymentLedger for InMemoryPaymentLedger {
    fn record_payment(
        &self,
        application_id: &ApplicationId,
        applicant_id: &ApplicantId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment, LedgerError> {
        let mut guard = lock(&self.state);
        guard.sequence += 1;
        let payment = Payment {
            id: PaymentId(format!("pay-{:06}", guard.sequence)),
            application_id: application_id.clone(),
            applicant_id: applicant_id.clone(),
            request_status: outcome.request_status,
            payment_status: outcome.payment_status,
            paid_at: outcome.is_paid().then_some(at),
        };
        guard
            .payments
            .entry(application_id.clone())
            .or_default()
            .push(payment.clone());
        Ok(payment)
    }

    fn payments_for(&self, application_id: &ApplicationId) -> Result<Vec<Payment>, LedgerError> {
        Ok(lock(&self.state)
            .payments
            .get(application_id)
            .cloned()
            .unwrap_or_default())
    }

    fn purge(&self, application_id: &ApplicationId) -> Result<usize, LedgerError> {
        Ok(lock(&self.state)
            .payments
            .remove(application_id)
            .map_or(0, |payments| payments.len()))
    }
}
