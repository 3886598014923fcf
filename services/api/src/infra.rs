use admissions::error::AppError;
use admissions::workflows::admissions::{FieldRule, Stage, StageRegistry, StageRegistryError};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Built-in batch used when no stage file is configured. Windows are anchored on `now` so a
/// freshly started service always has the coding stage open.
pub(crate) fn default_stage_registry(now: DateTime<Utc>) -> Result<StageRegistry, StageRegistryError> {
    let coding_opens = now - Duration::days(1);
    let coding_closes = now + Duration::days(14);
    let interview_opens = coding_closes + Duration::days(1);
    let interview_closes = interview_opens + Duration::days(14);

    StageRegistry::new(vec![
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
            starts_at: Some(coding_opens),
            ends_at: Some(coding_closes),
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
            starts_at: Some(interview_opens),
            ends_at: Some(interview_closes),
            fields: Vec::new(),
        },
        Stage {
            number: 4,
            name: "Pre-selection".to_string(),
            starts_at: None,
            ends_at: None,
            fields: Vec::new(),
        },
    ])
}

pub(crate) fn load_stage_registry(
    path: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<StageRegistry, AppError> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            let registry = StageRegistry::from_json_reader(BufReader::new(file))?;
            info!(path = %path.display(), stages = registry.stages().len(), "loaded stage definitions");
            Ok(registry)
        }
        None => Ok(default_stage_registry(now)?),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Midnight UTC of `date`.
pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
