// Day-by-day projection across the unlock window

use super::math::compute_metrics;
use super::types::{GlobalState, ProjectConfig, VestingMetrics, VestingParameters};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub day: u32,
    pub date: Option<NaiveDate>,
    pub metrics: VestingMetrics,
}

/// Ordered projection for days `0..=unlock_duration_days`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `day`; entries are indexed by day
    pub fn at_day(&self, day: u32) -> Option<&TimelineEntry> {
        self.entries.get(day as usize)
    }

    pub fn final_entry(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }
}

/// Project the full timeline. Empty when `config` is absent or the amount is
/// not positive. `global` is threaded unchanged through every day; a missing
/// snapshot counts as an empty loyalty pool.
pub fn project(
    max_token_amount: f64,
    config: Option<&ProjectConfig>,
    global: Option<&GlobalState>,
    start_date: Option<NaiveDate>,
) -> Timeline {
    project_until(max_token_amount, config, global, start_date, || false).unwrap_or_default()
}

/// Same as [`project`], checking `cancelled` before each day. Returns `None`
/// as soon as cancellation is observed.
pub fn project_until<F>(
    max_token_amount: f64,
    config: Option<&ProjectConfig>,
    global: Option<&GlobalState>,
    start_date: Option<NaiveDate>,
    cancelled: F,
) -> Option<Timeline>
where
    F: Fn() -> bool,
{
    let Some(config) = config else {
        return Some(Timeline::default());
    };
    if !(max_token_amount > 0.0) {
        return Some(Timeline::default());
    }

    let global = global.copied().unwrap_or_default();
    let mut entries = Vec::with_capacity(config.unlock_duration_days as usize + 1);

    for day in 0..=config.unlock_duration_days {
        if cancelled() {
            return None;
        }
        let params = VestingParameters::from_sources(max_token_amount, config, &global, day);
        entries.push(TimelineEntry {
            day,
            date: start_date.and_then(|start| start.checked_add_signed(Duration::days(day as i64))),
            metrics: compute_metrics(&params),
        });
    }

    Some(Timeline { entries })
}
