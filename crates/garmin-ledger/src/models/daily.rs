//! The daily health record: one row of the ledger.
//!
//! All "missing remote field → default" policy lives in
//! [`DailyRecord::from_remote`]; the rest of the crate only sees the typed
//! record.

use chrono::NaiveDate;
use serde_json::Value;

/// Ledger column labels, date first, in the fixed write order.
///
/// These match the files the predecessor tool wrote, so existing ledgers
/// keep merging cleanly.
pub const COLUMNS: [&str; 8] = [
    "Fecha",
    "Pasos",
    "Objetivo",
    "Distancia (km)",
    "Calorías Act",
    "Calorías Tot",
    "HR Reposo",
    "Sueño (h)",
];

/// Cell text written when the resting heart rate is unavailable.
pub const HEART_RATE_SENTINEL: &str = "N/A";

/// Resting heart rate: a measurement, or explicitly unavailable.
///
/// The sentinel keeps the column non-blank while staying out of the
/// column average (only parseable numbers are averaged).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestingHeartRate {
    Bpm(u64),
    NotAvailable,
}

impl RestingHeartRate {
    pub fn to_cell(self) -> String {
        match self {
            Self::Bpm(bpm) => bpm.to_string(),
            Self::NotAvailable => HEART_RATE_SENTINEL.to_string(),
        }
    }
}

/// One collected day, in ledger column order.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub steps: u64,
    pub step_goal: u64,
    pub distance_km: f64,
    pub active_calories: u64,
    pub total_calories: u64,
    pub resting_heart_rate: RestingHeartRate,
    pub sleep_hours: f64,
}

impl DailyRecord {
    /// Build a record from the remote daily-summary payload and, when the
    /// sleep fetch succeeded, the sleep payload.
    ///
    /// Counters default to 0 when absent; a missing or null resting heart
    /// rate becomes the sentinel; any missing level of sleep nesting means
    /// 0 hours. Some deployments return the `dailyStepGoal` /
    /// `…Kilocalories` spellings, so those are accepted as fallbacks.
    pub fn from_remote(date: NaiveDate, stats: &Value, sleep: Option<&Value>) -> Self {
        let resting_heart_rate = stats
            .get("restingHeartRate")
            .and_then(as_whole_number)
            .map(RestingHeartRate::Bpm)
            .unwrap_or(RestingHeartRate::NotAvailable);

        Self {
            date,
            steps: read_u64(stats, &["totalSteps"]),
            step_goal: read_u64(stats, &["stepGoal", "dailyStepGoal"]),
            distance_km: round2(read_f64(stats, &["totalDistanceMeters"]) / 1000.0),
            active_calories: read_u64(stats, &["activeCalories", "activeKilocalories"]),
            total_calories: read_u64(stats, &["totalCalories", "totalKilocalories"]),
            resting_heart_rate,
            sleep_hours: sleep.map(sleep_hours_from).unwrap_or(0.0),
        }
    }

    /// Cells in ledger column order, formatted as the file has always
    /// written them.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.date.format("%Y-%m-%d").to_string(),
            self.steps.to_string(),
            self.step_goal.to_string(),
            format_real(self.distance_km),
            self.active_calories.to_string(),
            self.total_calories.to_string(),
            self.resting_heart_rate.to_cell(),
            format_real(self.sleep_hours),
        ]
    }
}

/// Hours of sleep from the wellness payload, 0 when the nesting is absent.
fn sleep_hours_from(sleep: &Value) -> f64 {
    sleep
        .get("dailySleepDTO")
        .and_then(|dto| dto.get("sleepTimeSeconds"))
        .and_then(Value::as_f64)
        .map(|seconds| round2(seconds / 3600.0))
        .unwrap_or(0.0)
}

fn read_u64(value: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| value.get(key).and_then(as_whole_number))
        .unwrap_or(0)
}

/// Counters arrive as integers or as whole floats (`715.0`) depending on
/// the deployment; accept both.
fn as_whole_number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn read_f64(value: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a real-valued cell: at least one fractional digit, at most two
/// (`5500.0`, `71.5`, `7.62`), matching the historic ledger format.
pub fn format_real(value: f64) -> String {
    let s = format!("{:.2}", value);
    match s.strip_suffix('0') {
        Some(trimmed) if !trimmed.ends_with('.') => trimmed.to_string(),
        _ => s,
    }
}
