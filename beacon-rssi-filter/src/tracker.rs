//! Tracked transmitter
//!
//! A [`RangedTransmitter`] owns one running-average filter and one running-max
//! filter for a single transmitter, together with its liveness bookkeeping.
//!
//! Ingest and publication are split in two phases:
//! - `add_measurement` may be called any number of times during a cycle
//! - `commit_measurements` is called once per cycle, after ingest, and is the
//!   only place the published running estimates change
//!
//! Liveness is evaluated lazily: a transmitter is expired when its last
//! accepted measurement is older than the configured maximum tracking age.

use crate::clock::{Clock, SystemClock};
use crate::config::TrackingConfig;
use crate::datalog::{DiagnosticSink, NullSink};
use crate::filters::{FilterSelector, RssiFilter, RunningMaxFilter};
use crate::types::{millis, Result, Timestamp, TransmitterState, RSSI_UNAVAILABLE};
use chrono::Duration;
use parking_lot::Mutex;
use std::sync::Arc;

/// Component tag used for diagnostic records
pub const COMPONENT: &str = "RangedTransmitter";

/// Everything a transmitter needs from its surroundings
///
/// Built once per session and shared by every transmitter.
#[derive(Clone)]
pub struct TrackingContext {
    pub config: TrackingConfig,
    pub clock: Arc<dyn Clock>,
    pub selector: FilterSelector,
    pub sink: Arc<dyn DiagnosticSink>,
}

impl TrackingContext {
    /// Context using the system clock, the configured built-in filter and no diagnostics
    pub fn new(config: TrackingConfig) -> Self {
        let selector = FilterSelector::from(config.average_filter);
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            selector,
            sink: Arc::new(NullSink),
        }
    }

    /// Builder method: use a different clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder method: override the running-average filter implementation
    pub fn with_selector(mut self, selector: FilterSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Builder method: send commit records to a diagnostic sink
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for TrackingContext {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Liveness {
    tracked: bool,
    last_tracked_at: Option<Timestamp>,
}

/// One observed transmitter with its filters and liveness state
pub struct RangedTransmitter {
    state: Mutex<TransmitterState>,
    liveness: Mutex<Liveness>,
    average_filter: Box<dyn RssiFilter>,
    max_filter: Box<dyn RssiFilter>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticSink>,
    max_tracking_age_ms: u64,
}

impl RangedTransmitter {
    /// Start tracking a transmitter and apply its first measurement
    ///
    /// Fails when the configured filter implementation cannot be built; the
    /// transmitter must not be tracked in that case.
    pub fn new(id: impl Into<String>, initial_rssi: i32, context: &TrackingContext) -> Result<Self> {
        let id = id.into();
        let average_filter = context
            .selector
            .build(&context.config, context.clock.clone())
            .map_err(|e| {
                log::error!(
                    "Could not construct RSSI filter '{}' for {}: {}",
                    context.selector.name(),
                    id,
                    e
                );
                e
            })?;
        let max_filter: Box<dyn RssiFilter> = Box::new(
            RunningMaxFilter::new(context.config.max, context.clock.clone()).map_err(|e| {
                log::error!("Could not construct RSSI filter 'RunningMaxFilter' for {}: {}", id, e);
                e
            })?,
        );

        let transmitter = Self {
            state: Mutex::new(TransmitterState::new(id)),
            liveness: Mutex::new(Liveness::default()),
            average_filter,
            max_filter,
            clock: context.clock.clone(),
            sink: context.sink.clone(),
            max_tracking_age_ms: context.config.max_tracking_age_ms,
        };
        transmitter.add_measurement(initial_rssi);
        Ok(transmitter)
    }

    pub fn id(&self) -> String {
        self.state.lock().id.clone()
    }

    /// Snapshot of the published state
    pub fn state(&self) -> TransmitterState {
        self.state.lock().clone()
    }

    /// Feed one raw reading
    ///
    /// The "RSSI unavailable" sentinel is dropped without touching liveness
    /// or either filter.
    pub fn add_measurement(&self, rssi: i32) {
        if rssi == RSSI_UNAVAILABLE {
            log::trace!("Ignoring unavailable RSSI reading for {}", self.id());
            return;
        }

        {
            let mut liveness = self.liveness.lock();
            liveness.tracked = true;
            liveness.last_tracked_at = Some(self.clock.now());
        }
        self.state.lock().rssi = Some(rssi);
        self.average_filter.add_measurement(rssi);
        self.max_filter.add_measurement(rssi);
    }

    /// Recompute and publish both running estimates
    ///
    /// Called once per ranging cycle after all of that cycle's measurements
    /// have been added. A filter without live samples publishes `None`.
    pub fn commit_measurements(&self) {
        let running_average = Self::estimate(self.average_filter.as_ref());
        let running_max = Self::estimate(self.max_filter.as_ref());

        let snapshot = {
            let mut state = self.state.lock();
            state.running_average_rssi = running_average;
            state.running_max_rssi = running_max;
            state.clone()
        };

        match running_average {
            Some(value) => log::info!("{}: new running average: {:.2}", snapshot.id, value),
            None => log::debug!(
                "{}: no measurements available to calculate running average",
                snapshot.id
            ),
        }
        match running_max {
            Some(value) => log::info!("{}: new running max: {:.2}", snapshot.id, value),
            None => log::debug!("{}: no measurements available to calculate running max", snapshot.id),
        }

        self.sink.log(snapshot.to_json(), COMPONENT);
    }

    fn estimate(filter: &dyn RssiFilter) -> Option<f64> {
        if filter.no_measurements_available() {
            None
        } else {
            filter.calculate_rssi()
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.liveness.lock().tracked
    }

    /// Force the tracked flag, e.g. to drop a transmitter from the visible set
    pub fn set_tracked(&self, tracked: bool) {
        self.liveness.lock().tracked = tracked;
    }

    /// Time of the last accepted measurement
    pub fn last_tracked_at(&self) -> Option<Timestamp> {
        self.liveness.lock().last_tracked_at
    }

    /// Time since the last accepted measurement, `None` if there never was one
    pub fn tracking_age(&self) -> Option<Duration> {
        self.last_tracked_at().map(|at| self.clock.now() - at)
    }

    /// True when no measurement has been accepted for longer than the maximum tracking age
    pub fn is_expired(&self) -> bool {
        match self.tracking_age() {
            Some(age) => age > millis(self.max_tracking_age_ms),
            None => true,
        }
    }

    /// True when the running-average filter holds no live samples
    pub fn no_measurements_available(&self) -> bool {
        self.average_filter.no_measurements_available()
    }

    /// Names of the filters in use, average first
    pub fn filter_names(&self) -> (&'static str, &'static str) {
        (self.average_filter.name(), self.max_filter.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::FilterError;

    fn context(clock: &Arc<ManualClock>) -> TrackingContext {
        TrackingContext::new(TrackingConfig::default()).with_clock(clock.clone())
    }

    #[test]
    fn test_initial_measurement_is_applied() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let transmitter = RangedTransmitter::new("b-1", -65, &context(&clock)).unwrap();

        assert!(transmitter.is_tracked());
        assert!(!transmitter.no_measurements_available());
        assert_eq!(transmitter.last_tracked_at(), Some(clock.now()));
        assert_eq!(transmitter.state().rssi, Some(-65));
        // Nothing is published before the first commit
        assert_eq!(transmitter.state().running_average_rssi, None);
        assert_eq!(
            transmitter.filter_names(),
            ("RunningAverageFilter", "RunningMaxFilter")
        );
    }

    #[test]
    fn test_sentinel_is_rejected() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let transmitter = RangedTransmitter::new("b-1", -70, &context(&clock)).unwrap();
        let stamped = transmitter.last_tracked_at();

        transmitter.set_tracked(false);
        clock.advance_ms(1000);
        transmitter.add_measurement(RSSI_UNAVAILABLE);

        assert!(!transmitter.is_tracked());
        assert_eq!(transmitter.last_tracked_at(), stamped);
        assert_eq!(transmitter.state().rssi, Some(-70));

        transmitter.commit_measurements();
        assert_eq!(transmitter.state().running_max_rssi, Some(-70.0));
    }

    #[test]
    fn test_sentinel_as_first_reading_leaves_transmitter_untracked() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let transmitter = RangedTransmitter::new("b-1", RSSI_UNAVAILABLE, &context(&clock)).unwrap();

        assert!(!transmitter.is_tracked());
        assert!(transmitter.tracking_age().is_none());
        assert!(transmitter.is_expired());
        assert!(transmitter.no_measurements_available());
    }

    #[test]
    fn test_expiry_boundary() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let config = TrackingConfig::new().with_max_tracking_age_ms(5000);
        let ctx = TrackingContext::new(config).with_clock(clock.clone());
        let transmitter = RangedTransmitter::new("b-1", -60, &ctx).unwrap();

        clock.advance_ms(4999);
        assert!(!transmitter.is_expired());
        clock.advance_ms(1);
        assert!(!transmitter.is_expired());
        clock.advance_ms(1);
        assert!(transmitter.is_expired());
        assert_eq!(transmitter.tracking_age().map(|a| a.num_milliseconds()), Some(5001));

        transmitter.add_measurement(-61);
        assert!(!transmitter.is_expired());
    }

    #[test]
    fn test_expiry_sees_sub_millisecond_age() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let config = TrackingConfig::new().with_max_tracking_age_ms(5000);
        let ctx = TrackingContext::new(config).with_clock(clock.clone());
        let transmitter = RangedTransmitter::new("b-1", -60, &ctx).unwrap();
        let start = clock.now();

        clock.set(start + Duration::milliseconds(5000));
        assert!(!transmitter.is_expired());
        clock.set(start + Duration::microseconds(5_000_001));
        assert!(transmitter.is_expired());
        clock.set(start + Duration::microseconds(5_000_900));
        assert!(transmitter.is_expired());
    }

    #[test]
    fn test_commit_publishes_no_estimate_when_windows_drain() {
        let clock = Arc::new(ManualClock::from_millis(10_000));
        let transmitter = RangedTransmitter::new("b-1", -65, &context(&clock)).unwrap();

        transmitter.commit_measurements();
        let state = transmitter.state();
        assert!(state.running_average_rssi.is_some());
        assert_eq!(state.running_max_rssi, Some(-65.0));

        clock.advance_ms(7500);
        transmitter.commit_measurements();
        let state = transmitter.state();
        assert!(state.running_average_rssi.is_some());
        assert_eq!(state.running_max_rssi, None);

        clock.advance_ms(12_500);
        transmitter.commit_measurements();
        assert_eq!(transmitter.state().running_average_rssi, None);
        assert!(transmitter.no_measurements_available());
    }

    #[test]
    fn test_failing_selector_refuses_to_track() {
        let clock = Arc::new(ManualClock::default());
        let selector = FilterSelector::custom(
            |_: &TrackingConfig, _: Arc<dyn Clock>| -> Result<Box<dyn RssiFilter>> {
                Err(FilterError::FilterConstruction {
                    name: "broken".to_string(),
                    reason: "unavailable".to_string(),
                })
            },
        );
        let ctx = context(&clock).with_selector(selector);
        let result = RangedTransmitter::new("b-1", -60, &ctx);
        assert!(matches!(result, Err(FilterError::FilterConstruction { .. })));
    }

    #[test]
    fn test_invalid_max_config_refuses_to_track() {
        let clock = Arc::new(ManualClock::default());
        let config = TrackingConfig::new().with_max_expiration_ms(0);
        let ctx = TrackingContext::new(config).with_clock(clock);
        let result = RangedTransmitter::new("b-1", -60, &ctx);
        assert!(matches!(result, Err(FilterError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_invalid_average_config_refuses_to_track() {
        let clock = Arc::new(ManualClock::default());
        let config = TrackingConfig::new().with_sample_rate_ms(0);
        let ctx = TrackingContext::new(config).with_clock(clock);
        assert!(RangedTransmitter::new("b-1", -60, &ctx).is_err());
    }
}
