//! Usage logging and frequent-question detection.

pub mod usage_log;

pub use usage_log::{UsageLog, UsageRecord};
