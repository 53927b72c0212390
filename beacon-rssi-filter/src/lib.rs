//! Beacon RSSI Filter Library
//!
//! Signal smoothing and liveness tracking for radio transmitters whose
//! received signal strength arrives as noisy, irregularly spaced samples.
//!
//! # Architecture
//!
//! For every observed transmitter the library maintains:
//! - a trimmed-quantile running average (long window, floor padding)
//! - a running max (short window)
//! - a tracked/expired liveness judgment
//!
//! Samples are ingested at any time; estimates are recomputed and published
//! once per ranging cycle by `commit_measurements`, so consumers always read
//! a consistent snapshot.
//!
//! The library does NOT:
//! - Scan for transmitters or parse advertisements
//! - Convert RSSI into distance
//! - Persist samples beyond the rolling windows
//!
//! # Example Usage
//!
//! ```
//! use beacon_rssi_filter::{RangedTransmitter, TrackingConfig, TrackingContext};
//!
//! let context = TrackingContext::new(TrackingConfig::new().with_max_tracking_age_ms(5000));
//! let transmitter = RangedTransmitter::new("beacon-1", -65, &context).unwrap();
//! transmitter.add_measurement(-63);
//! transmitter.add_measurement(127); // "RSSI unavailable", ignored
//!
//! transmitter.commit_measurements();
//! let state = transmitter.state();
//! assert_eq!(state.running_max_rssi, Some(-63.0));
//! assert!(state.running_average_rssi.is_some());
//! ```

// Public modules
pub mod clock;
pub mod config;
pub mod datalog;
pub mod filters;
pub mod registry;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AverageFilterConfig, FilterKind, MaxFilterConfig, TrackingConfig};
pub use datalog::{DiagnosticSink, JsonDataLogger, NullSink};
pub use filters::{FilterFactory, FilterSelector, RssiFilter, RunningAverageFilter, RunningMaxFilter};
pub use registry::RangingRegistry;
pub use tracker::{RangedTransmitter, TrackingContext};
pub use types::{
    FilterError, Measurement, Result, Timestamp, TransmitterState, RSSI_FLOOR, RSSI_UNAVAILABLE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
