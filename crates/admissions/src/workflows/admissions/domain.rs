use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for batch applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for team members (the lead and cofounders).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an application in the admissions workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Unpaid,
    AwaitingCofounders,
    AwaitingSubmission,
    Submitted,
    Advanced,
    Completed,
}

impl WorkflowState {
    pub const fn label(self) -> &'static str {
        match self {
            WorkflowState::Unpaid => "unpaid",
            WorkflowState::AwaitingCofounders => "awaiting_cofounders",
            WorkflowState::AwaitingSubmission => "awaiting_submission",
            WorkflowState::Submitted => "submitted",
            WorkflowState::Advanced => "advanced",
            WorkflowState::Completed => "completed",
        }
    }

    /// States in which the current stage still accepts a submission.
    pub const fn accepts_submission(self) -> bool {
        matches!(
            self,
            WorkflowState::AwaitingCofounders | WorkflowState::AwaitingSubmission
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One team's admission attempt for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub batch: String,
    pub stage_number: u32,
    pub state: WorkflowState,
    pub team_size: u8,
    pub college: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every successful save.
    pub version: u64,
}

impl Application {
    /// Cofounders needed so that the lead plus cofounders make up the team.
    pub fn required_cofounders(&self) -> usize {
        usize::from(self.team_size.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantRole {
    TeamLead,
    Cofounder,
}

/// A person on an application's team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub name: String,
    pub email: String,
    pub role: ApplicantRole,
}

/// Stage submission holding the normalized URLs and remaining field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub stage_number: u32,
    pub urls: BTreeMap<String, String>,
    pub values: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redone_at: Option<DateTime<Utc>>,
}

/// Aggregate owned by the applicant record store. Everything here shares the
/// application's lifecycle and is removed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub team_lead: Applicant,
    pub cofounders: Vec<Applicant>,
    pub submissions: Vec<Submission>,
}

impl ApplicationRecord {
    pub fn id(&self) -> &ApplicationId {
        &self.application.id
    }

    pub fn is_member(&self, applicant_id: &ApplicantId) -> bool {
        self.team_lead.id == *applicant_id
            || self
                .cofounders
                .iter()
                .any(|cofounder| cofounder.id == *applicant_id)
    }

    pub fn has_required_cofounders(&self) -> bool {
        self.cofounders.len() >= self.application.required_cofounders()
    }

    pub fn active_submission(&self, stage_number: u32) -> Option<&Submission> {
        self.submissions
            .iter()
            .find(|submission| submission.active && submission.stage_number == stage_number)
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application.id.clone(),
            state: self.application.state,
            stage_number: self.application.stage_number,
            team_size: self.application.team_size,
            cofounders: self.cofounders.len(),
            active_submission: self
                .active_submission(self.application.stage_number)
                .cloned(),
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub state: WorkflowState,
    pub stage_number: u32,
    pub team_size: u8,
    pub cofounders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_submission: Option<Submission>,
}

/// Input for the application factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub batch: String,
    pub team_lead_name: String,
    pub team_lead_email: String,
    pub team_size: u8,
    #[serde(default)]
    pub college: Option<String>,
}

/// Result handed back when a stage submission is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionAccepted {
    pub application_id: ApplicationId,
    pub stage_number: u32,
    pub submission: Submission,
    pub state: WorkflowState,
}
