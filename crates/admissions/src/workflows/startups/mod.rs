//! Startup records and the activity queries used to follow up with quiet teams.

pub mod domain;
pub mod query;

pub use domain::{
    parameterize, FounderId, KarmaPoint, NewStartup, Startup, StartupError, StartupId,
};
pub use query::{
    current_split, endangered, inactive_for_week, inactive_last_week, ActivityWindows,
    StartupFilter, StartupSplit,
};
