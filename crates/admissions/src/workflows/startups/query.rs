use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::domain::Startup;

/// Reporting windows for the activity queries. Weeks run Monday to Monday in `time_zone`,
/// shifted by `week_cutoff_hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindows {
    pub time_zone: Tz,
    pub week_cutoff_hours: u32,
    pub endangered_weeks: u32,
}

impl Default for ActivityWindows {
    fn default() -> Self {
        Self {
            time_zone: chrono_tz::Asia::Calcutta,
            week_cutoff_hours: 18,
            endangered_weeks: 3,
        }
    }
}

impl ActivityWindows {
    /// Half-open `[start, end)` karma window for the week containing `date`.
    pub fn week_containing(&self, date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let local = date.with_timezone(&self.time_zone).date_naive();
        let monday = local - Duration::days(i64::from(local.weekday().num_days_from_monday()));
        let cutoff = Duration::hours(i64::from(self.week_cutoff_hours));

        let start = self.localize(midnight(monday) + cutoff);
        let end = self.localize(midnight(monday + Duration::days(7)) + cutoff);
        (start, end)
    }

    fn localize(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        self.time_zone
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| self.time_zone.from_utc_datetime(&naive))
            .with_timezone(&Utc)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Typed replacement for chained scopes. Unset fields match everything; tags must all be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StartupFilter {
    #[serde(default)]
    pub admitted: Option<bool>,
    #[serde(default)]
    pub dropped_out: Option<bool>,
    #[serde(default)]
    pub tagged_with: BTreeSet<String>,
}

impl StartupFilter {
    pub fn admitted(mut self) -> Self {
        self.admitted = Some(true);
        self
    }

    pub fn approved(mut self) -> Self {
        self.dropped_out = Some(false);
        self
    }

    pub fn dropped_out(mut self) -> Self {
        self.dropped_out = Some(true);
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tagged_with.insert(tag.into());
        self
    }

    pub fn matches(&self, startup: &Startup) -> bool {
        self.admitted
            .map_or(true, |admitted| startup.is_admitted() == admitted)
            && self
                .dropped_out
                .map_or(true, |dropped| startup.dropped_out == dropped)
            && self.tagged_with.is_subset(&startup.tags)
    }

    pub fn apply<'a>(&self, startups: &'a [Startup]) -> Vec<&'a Startup> {
        startups
            .iter()
            .filter(|startup| self.matches(startup))
            .collect()
    }
}

fn has_karma_between(startup: &Startup, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    startup
        .karma_points
        .iter()
        .any(|point| point.created_at >= start && point.created_at < end)
}

/// Approved, admitted startups with no karma in the week containing `date`.
pub fn inactive_for_week<'a>(
    startups: &'a [Startup],
    date: DateTime<Utc>,
    windows: &ActivityWindows,
) -> Vec<&'a Startup> {
    let (start, end) = windows.week_containing(date);
    StartupFilter::default()
        .admitted()
        .approved()
        .apply(startups)
        .into_iter()
        .filter(|startup| !has_karma_between(startup, start, end))
        .collect()
}

/// [`inactive_for_week`] for the week before `now`.
pub fn inactive_last_week<'a>(
    startups: &'a [Startup],
    now: DateTime<Utc>,
    windows: &ActivityWindows,
) -> Vec<&'a Startup> {
    inactive_for_week(startups, now - Duration::weeks(1), windows)
}

/// Approved, admitted startups with no karma in the last `endangered_weeks` weeks.
pub fn endangered<'a>(
    startups: &'a [Startup],
    now: DateTime<Utc>,
    windows: &ActivityWindows,
) -> Vec<&'a Startup> {
    let since = now
        .checked_sub_signed(Duration::weeks(i64::from(windows.endangered_weeks)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    StartupFilter::default()
        .admitted()
        .approved()
        .apply(startups)
        .into_iter()
        .filter(|startup| {
            !startup
                .karma_points
                .iter()
                .any(|point| point.created_at >= since && point.created_at <= now)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartupSplit {
    #[serde(rename = "Approved")]
    pub approved: usize,
    #[serde(rename = "Dropped-out")]
    pub dropped_out: usize,
}

pub fn current_split(startups: &[Startup]) -> StartupSplit {
    let dropped_out = startups.iter().filter(|startup| startup.dropped_out).count();
    StartupSplit {
        approved: startups.len() - dropped_out,
        dropped_out,
    }
}
