//! RSSI filters
//!
//! Each filter owns a time-bounded window of [`Measurement`]s and reduces it
//! to one scalar on demand. Two implementations ship with the library:
//! - [`RunningAverageFilter`]: long window, floor padding, quantile trimming
//! - [`RunningMaxFilter`]: short window, strongest recent sample
//!
//! Which implementation produces a transmitter's running average is chosen
//! at runtime through a [`FilterSelector`], so callers can plug in their own
//! [`RssiFilter`] without touching the tracker.

use crate::clock::Clock;
use crate::config::{FilterKind, TrackingConfig};
use crate::types::{Measurement, Result, Timestamp};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub mod running_average;
pub mod running_max;

pub use running_average::RunningAverageFilter;
pub use running_max::RunningMaxFilter;

/// Common interface of all RSSI filters
///
/// Implementations are shared between the ingest side and the commit side
/// of a ranging cycle, so every method takes `&self` and guards the window
/// internally.
pub trait RssiFilter: Send + Sync {
    /// Record a sample at the current clock time
    fn add_measurement(&self, rssi: i32);

    /// True if no live sample remains after discarding expired ones
    fn no_measurements_available(&self) -> bool;

    /// Reduce the live window to one value
    ///
    /// Returns `None` when no estimate can be produced. Callers are expected
    /// to check [`no_measurements_available`](Self::no_measurements_available)
    /// first.
    fn calculate_rssi(&self) -> Option<f64>;

    /// Number of live samples after discarding expired ones
    fn measurement_count(&self) -> usize;

    /// Short name used in log output
    fn name(&self) -> &'static str;
}

/// Builds filter instances for new transmitters
///
/// Any `Fn(&TrackingConfig, Arc<dyn Clock>) -> Result<Box<dyn RssiFilter>>`
/// closure is a factory.
pub trait FilterFactory: Send + Sync {
    fn build(&self, config: &TrackingConfig, clock: Arc<dyn Clock>) -> Result<Box<dyn RssiFilter>>;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> FilterFactory for F
where
    F: Fn(&TrackingConfig, Arc<dyn Clock>) -> Result<Box<dyn RssiFilter>> + Send + Sync,
{
    fn build(&self, config: &TrackingConfig, clock: Arc<dyn Clock>) -> Result<Box<dyn RssiFilter>> {
        self(config, clock)
    }
}

/// Selects the filter implementation used for the running average
#[derive(Clone, Default)]
pub enum FilterSelector {
    #[default]
    RunningAverage,
    RunningMax,
    Custom(Arc<dyn FilterFactory>),
}

impl FilterSelector {
    /// Wrap a custom factory
    pub fn custom(factory: impl FilterFactory + 'static) -> Self {
        FilterSelector::Custom(Arc::new(factory))
    }

    /// Construct a filter for one transmitter
    pub fn build(&self, config: &TrackingConfig, clock: Arc<dyn Clock>) -> Result<Box<dyn RssiFilter>> {
        match self {
            FilterSelector::RunningAverage => {
                Ok(Box::new(RunningAverageFilter::new(config.average, clock)?))
            }
            FilterSelector::RunningMax => Ok(Box::new(RunningMaxFilter::new(config.max, clock)?)),
            FilterSelector::Custom(factory) => factory.build(config, clock),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FilterSelector::RunningAverage => "running_average",
            FilterSelector::RunningMax => "running_max",
            FilterSelector::Custom(factory) => factory.name(),
        }
    }
}

impl From<FilterKind> for FilterSelector {
    fn from(kind: FilterKind) -> Self {
        match kind {
            FilterKind::RunningAverage => FilterSelector::RunningAverage,
            FilterKind::RunningMax => FilterSelector::RunningMax,
        }
    }
}

impl fmt::Debug for FilterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterSelector({})", self.name())
    }
}

/// Time-bounded sample window shared by the built-in filters
///
/// Eviction and every read happen under one lock, so a sample added on the
/// ingest thread is either fully visible to a concurrent query or not at all.
#[derive(Debug)]
pub(crate) struct MeasurementWindow {
    expiration_ms: u64,
    measurements: Mutex<Vec<Measurement>>,
}

impl MeasurementWindow {
    pub(crate) fn new(expiration_ms: u64) -> Self {
        Self {
            expiration_ms,
            measurements: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, measurement: Measurement) {
        self.measurements.lock().push(measurement);
    }

    /// Evict expired samples, sort the rest ascending by RSSI, then run `f`
    pub(crate) fn with_refreshed<R>(&self, now: Timestamp, f: impl FnOnce(&[Measurement]) -> R) -> R {
        let mut measurements = self.measurements.lock();
        let before = measurements.len();
        measurements.retain(|m| m.is_fresh(now, self.expiration_ms));
        if measurements.len() != before {
            log::trace!(
                "Evicted {} expired measurement(s), {} left",
                before - measurements.len(),
                measurements.len()
            );
        }
        measurements.sort_by_key(|m| m.rssi);
        f(&measurements)
    }

    pub(crate) fn live_count(&self, now: Timestamp) -> usize {
        self.with_refreshed(now, |live| live.len())
    }
}
