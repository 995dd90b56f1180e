//! Per-date collection of daily stats into typed records.
//!
//! Fetch failures never cross the per-date boundary: a date either yields a
//! [`DailyRecord`] or a skip with its reason.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde_json::Value;

use crate::error::Result;
use crate::models::DailyRecord;

/// What the collector needs from an authenticated session: the daily
/// activity summary and the sleep detail for one calendar date.
#[async_trait]
pub trait StatsSource {
    async fn daily_stats(&self, date: NaiveDate) -> Result<Value>;
    async fn sleep_data(&self, date: NaiveDate) -> Result<Value>;
}

/// Result of collecting one date.
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    Collected(DailyRecord),
    Skipped { date: NaiveDate, reason: String },
}

impl DayOutcome {
    pub fn record(&self) -> Option<&DailyRecord> {
        match self {
            Self::Collected(record) => Some(record),
            Self::Skipped { .. } => None,
        }
    }
}

/// Collect the `window_days` consecutive dates ending today (local time),
/// oldest first.
pub async fn collect_window(source: &dyn StatsSource, window_days: u32) -> Vec<DayOutcome> {
    let today = Local::now().date_naive();
    collect_window_ending(source, today, window_days).await
}

/// Collect the `window_days` consecutive dates ending at `end_date`,
/// oldest first. One date at a time; the remote session is not assumed
/// safe for concurrent use.
pub async fn collect_window_ending(
    source: &dyn StatsSource,
    end_date: NaiveDate,
    window_days: u32,
) -> Vec<DayOutcome> {
    let mut outcomes = Vec::with_capacity(window_days as usize);
    for offset in (0..i64::from(window_days)).rev() {
        let date = end_date - Duration::days(offset);
        outcomes.push(collect_day(source, date).await);
    }
    outcomes
}

/// Collect a single date. A failed stats fetch skips the date; a failed
/// sleep fetch only zeroes the sleep column.
async fn collect_day(source: &dyn StatsSource, date: NaiveDate) -> DayOutcome {
    let stats = match source.daily_stats(date).await {
        Ok(stats) => stats,
        Err(e) => {
            return DayOutcome::Skipped {
                date,
                reason: e.to_string(),
            }
        }
    };

    let sleep = source.sleep_data(date).await.ok();

    DayOutcome::Collected(DailyRecord::from_remote(date, &stats, sleep.as_ref()))
}

/// The collected records, in the order the outcomes were produced.
pub fn records(outcomes: &[DayOutcome]) -> Vec<DailyRecord> {
    outcomes
        .iter()
        .filter_map(|outcome| outcome.record())
        .cloned()
        .collect()
}
