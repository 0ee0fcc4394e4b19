//! Small shared value types used across component boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UTC timestamp, serialized as ISO-8601 (spec §3).
pub type Timestamp = DateTime<Utc>;

pub fn now() -> Timestamp {
    Utc::now()
}

/// A scalar-or-string metadata value (spec §3: "key/value metadata map
/// (string -> scalar-or-string)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Number(v)
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

/// Clamp a scalar into an inclusive range, as used throughout the
/// phi-calculator and scorers.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}
