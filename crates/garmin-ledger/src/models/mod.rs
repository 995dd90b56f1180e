//! Data models for Garmin Connect responses and ledger rows.

pub mod daily;

pub use daily::{DailyRecord, RestingHeartRate};
