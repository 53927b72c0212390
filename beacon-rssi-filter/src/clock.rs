//! Time sources
//!
//! Filters and transmitters never read the wall clock directly. They ask a
//! [`Clock`], which is the system clock in production and a manually driven
//! clock when replaying recorded samples or in tests.

use crate::types::Timestamp;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::time::Instant;

/// Source of the current time
///
/// Successive readings must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic system clock
///
/// Wall-clock time is read once at construction; every later reading is that
/// anchor plus the elapsed monotonic time, so NTP steps do not move windows.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_utc: Timestamp,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_utc: Utc::now(),
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Duration::from_std(self.anchor.elapsed())
            .ok()
            .and_then(|elapsed| self.anchor_utc.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Clock that only moves when told to
///
/// Used by the replay tool (time follows the recorded samples) and by tests
/// that need exact control over window expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock starting at the given instant
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock starting at `ms` milliseconds after the Unix epoch
    ///
    /// Values outside the representable range are clamped to it.
    pub fn from_millis(ms: i64) -> Self {
        Self::new(millis_to_timestamp(ms))
    }

    /// Move the clock forward by `ms` milliseconds, saturating at the latest representable instant
    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock();
        *now = Duration::try_milliseconds(ms)
            .and_then(|step| now.checked_add_signed(step))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }

    /// Jump to `ms` milliseconds after the Unix epoch, clamped like [`ManualClock::from_millis`]
    pub fn set_millis(&self, ms: i64) {
        self.set(millis_to_timestamp(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::from_millis(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Timestamp `ms` milliseconds after the Unix epoch, `None` when it cannot be represented
pub fn timestamp_from_millis(ms: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(ms)
}

/// Convert milliseconds since the Unix epoch into a timestamp, clamping to the representable range
pub fn millis_to_timestamp(ms: i64) -> Timestamp {
    let earliest = DateTime::<Utc>::MIN_UTC.timestamp_millis();
    let latest = DateTime::<Utc>::MAX_UTC.timestamp_millis();
    timestamp_from_millis(ms.clamp(earliest, latest)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
