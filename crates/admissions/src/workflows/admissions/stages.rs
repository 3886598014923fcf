use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::NotFoundError;
use super::validation::FieldRule;

/// Numbered admission stage with an optional submission window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl Stage {
    fn has_window(&self) -> bool {
        self.starts_at.is_some() || self.ends_at.is_some()
    }

    fn overlaps(&self, other: &Stage) -> bool {
        let starts_before_other_ends = match (self.starts_at, other.ends_at) {
            (Some(start), Some(end)) => start < end,
            _ => true,
        };
        let other_starts_before_end = match (other.starts_at, self.ends_at) {
            (Some(start), Some(end)) => start < end,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageRegistryError {
    #[error("a batch needs at least one stage")]
    Empty,
    #[error("stage numbers must be strictly increasing (found {found} after {previous})")]
    NotIncreasing { previous: u32, found: u32 },
    #[error("stage {number} ends before it starts")]
    InvertedWindow { number: u32 },
    #[error("stage {first} and stage {second} have overlapping windows")]
    OverlappingWindows { first: u32, second: u32 },
    #[error("unable to read stage definitions: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ordered, immutable catalog of the stages of one batch.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    pub fn new(stages: Vec<Stage>) -> Result<Self, StageRegistryError> {
        if stages.is_empty() {
            return Err(StageRegistryError::Empty);
        }

        for pair in stages.windows(2) {
            if pair[1].number <= pair[0].number {
                return Err(StageRegistryError::NotIncreasing {
                    previous: pair[0].number,
                    found: pair[1].number,
                });
            }
        }

        for stage in &stages {
            if let (Some(start), Some(end)) = (stage.starts_at, stage.ends_at) {
                if end < start {
                    return Err(StageRegistryError::InvertedWindow {
                        number: stage.number,
                    });
                }
            }
        }

        let windowed: Vec<&Stage> = stages.iter().filter(|stage| stage.has_window()).collect();
        for (index, first) in windowed.iter().enumerate() {
            if let Some(second) = windowed[index + 1..]
                .iter()
                .find(|second| first.overlaps(second))
            {
                return Err(StageRegistryError::OverlappingWindows {
                    first: first.number,
                    second: second.number,
                });
            }
        }

        Ok(Self { stages })
    }

    /// Load a JSON array of stage definitions.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, StageRegistryError> {
        let stages: Vec<Stage> = serde_json::from_reader(reader)?;
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn initial_stage(&self) -> &Stage {
        // `new` refuses empty catalogs.
        &self.stages[0]
    }

    pub fn stage_at(&self, number: u32) -> Result<&Stage, NotFoundError> {
        self.stages
            .iter()
            .find(|stage| stage.number == number)
            .ok_or(NotFoundError::Stage(number))
    }

    pub fn next_stage(&self, current: &Stage) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.number > current.number)
    }

    /// Inclusive on both ends; a missing bound never closes the window.
    pub fn is_open(&self, stage: &Stage, at: DateTime<Utc>) -> bool {
        let started = stage.starts_at.map_or(true, |start| at >= start);
        let not_ended = stage.ends_at.map_or(true, |end| at <= end);
        started && not_ended
    }
}
