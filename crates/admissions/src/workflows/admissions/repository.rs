use serde::Deserialize;

use super::domain::{Applicant, ApplicationId, ApplicationRecord, WorkflowState};

/// Storage abstraction for application aggregates so the engine can be exercised in isolation.
///
/// Saves are optimistic: `save_application` only succeeds when the record's `version` matches
/// the stored one, and the returned record carries the bumped version.
pub trait ApplicationRepository: Send + Sync {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn load_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn save_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;
    /// Removes the application together with its team and submissions.
    fn delete_application(&self, id: &ApplicationId) -> Result<ApplicationRecord, RepositoryError>;
    fn list_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    fn load_cofounders(&self, id: &ApplicationId) -> Result<Vec<Applicant>, RepositoryError> {
        self.load_application(id)?
            .map(|record| record.cofounders)
            .ok_or(RepositoryError::NotFound)
    }

    /// Appends `cofounder` to a loaded record and saves it under the usual version check, so
    /// team size or state changes made on `record` land in the same write.
    fn add_cofounder_record(
        &self,
        mut record: ApplicationRecord,
        cofounder: Applicant,
    ) -> Result<ApplicationRecord, RepositoryError> {
        record.cofounders.push(cofounder);
        self.save_application(record)
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record was modified concurrently (expected version {expected}, found {found})")]
    StaleVersion { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Typed filter for listing applications; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub state: Option<WorkflowState>,
    #[serde(default)]
    pub stage_number: Option<u32>,
}

impl ApplicationFilter {
    pub fn in_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    pub fn in_state(mut self, state: WorkflowState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn at_stage(mut self, stage_number: u32) -> Self {
        self.stage_number = Some(stage_number);
        self
    }

    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        let application = &record.application;
        self.batch
            .as_ref()
            .map_or(true, |batch| application.batch == *batch)
            && self.state.map_or(true, |state| application.state == state)
            && self
                .stage_number
                .map_or(true, |number| application.stage_number == number)
    }
}
