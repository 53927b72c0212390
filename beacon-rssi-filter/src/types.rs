//! Core types for the beacon RSSI filter library
//!
//! This module defines the fundamental types shared by the filters and the
//! tracked transmitter: timestamps, raw measurements, the published
//! transmitter state and the library error type.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the library
pub type Timestamp = DateTime<Utc>;

/// Result type for filter and tracking operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// RSSI value reported by the radio stack when no signal strength is available
pub const RSSI_UNAVAILABLE: i32 = 127;

/// Floor value used to pad sparsely sampled windows ("certainly out of range")
pub const RSSI_FLOOR: i32 = -110;

/// A single timestamped RSSI sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Received signal strength in dBm
    pub rssi: i32,
    /// Time at which the sample was recorded
    pub observed_at: Timestamp,
}

impl Measurement {
    pub fn new(rssi: i32, observed_at: Timestamp) -> Self {
        Self { rssi, observed_at }
    }

    /// Age of this measurement relative to `now`
    pub fn age(&self, now: Timestamp) -> Duration {
        now - self.observed_at
    }

    /// True if the measurement is still inside a window of `window_ms`
    pub fn is_fresh(&self, now: Timestamp, window_ms: u64) -> bool {
        self.age(now) < millis(window_ms)
    }
}

/// Millisecond setting as a duration, saturating at the largest representable span
pub fn millis(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

/// Published state of a tracked transmitter
///
/// The running estimates are written only when a ranging cycle is committed.
/// `None` means "no estimate" and is distinct from any numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitterState {
    /// Opaque transmitter identifier supplied by the scanning layer
    pub id: String,
    /// Last accepted raw RSSI reading
    pub rssi: Option<i32>,
    /// Trimmed-quantile running average, in dBm
    pub running_average_rssi: Option<f64>,
    /// Strongest recent reading, in dBm
    pub running_max_rssi: Option<f64>,
}

impl TransmitterState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rssi: None,
            running_average_rssi: None,
            running_max_rssi: None,
        }
    }

    /// JSON representation used by the diagnostic sink
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "rssi": self.rssi,
            "running_average_rssi": self.running_average_rssi,
            "running_max_rssi": self.running_max_rssi,
        })
    }
}

impl fmt::Display for TransmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} avg={} max={}",
            self.id,
            format_estimate(self.running_average_rssi),
            format_estimate(self.running_max_rssi)
        )
    }
}

/// Format an optional estimate, using `-` for "no estimate"
pub fn format_estimate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

/// Errors that can occur while configuring filters or tracking transmitters
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Could not construct RSSI filter '{name}': {reason}")]
    FilterConstruction { name: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> Timestamp {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_measurement_freshness_is_strict() {
        let m = Measurement::new(-60, at(1_000));
        assert!(m.is_fresh(at(1_000), 500));
        assert!(m.is_fresh(at(1_499), 500));
        assert!(!m.is_fresh(at(1_500), 500));
    }

    #[test]
    fn test_freshness_sees_sub_millisecond_age() {
        let m = Measurement::new(-60, at(1_000));
        let just_inside = at(1_499) + Duration::microseconds(999);
        assert!(m.is_fresh(just_inside, 500));
        assert!(!m.is_fresh(at(1_500) + Duration::microseconds(1), 500));
    }

    #[test]
    fn test_equal_rssi_at_different_times_are_distinct() {
        let a = Measurement::new(-70, at(0));
        let b = Measurement::new(-70, at(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(5000), Duration::milliseconds(5000));
        assert_eq!(millis(u64::MAX), Duration::MAX);
    }

    #[test]
    fn test_state_display_and_json() {
        let mut state = TransmitterState::new("beacon-1");
        assert_eq!(format!("{}", state), "beacon-1 avg=- max=-");

        state.running_average_rssi = Some(-71.256);
        state.running_max_rssi = Some(-60.0);
        assert_eq!(format!("{}", state), "beacon-1 avg=-71.26 max=-60.00");

        let json = state.to_json();
        assert_eq!(json["id"], "beacon-1");
        assert_eq!(json["running_max_rssi"], -60.0);
        assert!(json["rssi"].is_null());
    }
}
