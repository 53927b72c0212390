//! Trimmed-quantile running average
//!
//! Produces a proximity estimate that resists both dropouts and spikes:
//!
//! 1. Samples older than the window are evicted.
//! 2. The live samples are copied and padded with [`RSSI_FLOOR`] readings
//!    until the copy holds as many samples as a fully populated window
//!    (`expiration_ms / sample_rate_ms`). Missing samples therefore pull the
//!    estimate towards "out of range" instead of being ignored.
//! 3. The padded copy is sorted ascending and the weakest `quantile`
//!    fraction is discarded.
//! 4. The arithmetic mean of the remaining (strongest) tail is the result.
//!
//! With the default parameters a single `-60` reading is padded with 39
//! floor readings; averaging from index 20 of 40 gives
//! `(-60 + 19 * -110) / 20 = -107.5`.

use super::{MeasurementWindow, RssiFilter};
use crate::clock::Clock;
use crate::config::AverageFilterConfig;
use crate::types::{Measurement, Result, Timestamp, RSSI_FLOOR};
use std::sync::Arc;

/// Trimmed-quantile average over a padded sample window
pub struct RunningAverageFilter {
    config: AverageFilterConfig,
    window: MeasurementWindow,
    clock: Arc<dyn Clock>,
}

impl RunningAverageFilter {
    /// Create a filter, rejecting unusable parameters
    pub fn new(config: AverageFilterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: MeasurementWindow::new(config.expiration_ms),
            config,
            clock,
        })
    }

    pub fn config(&self) -> &AverageFilterConfig {
        &self.config
    }
}

/// Pad, sort, trim and average a live window
///
/// Returns `None` for an empty window or when the quantile leaves nothing
/// to average.
pub(crate) fn trimmed_quantile_mean(
    live: &[Measurement],
    config: &AverageFilterConfig,
    now: Timestamp,
) -> Option<f64> {
    if live.is_empty() {
        return None;
    }

    let capacity = config.window_capacity();
    let mut padded: Vec<Measurement> = Vec::with_capacity(capacity.max(live.len()));
    padded.extend_from_slice(live);
    while padded.len() < capacity {
        padded.push(Measurement::new(RSSI_FLOOR, now));
    }
    padded.sort_by_key(|m| m.rssi);

    let start = (config.quantile * padded.len() as f64).floor() as usize;
    if start >= padded.len() {
        return None;
    }

    let tail = &padded[start..];
    let sum: f64 = tail.iter().map(|m| m.rssi as f64).sum();
    let average = sum / tail.len() as f64;

    log::debug!(
        "Running average based on {} measurements with {} padding samples: {:.2}, max: {}",
        padded.len(),
        padded.len() - live.len(),
        average,
        padded[padded.len() - 1].rssi
    );
    Some(average)
}

impl RssiFilter for RunningAverageFilter {
    fn add_measurement(&self, rssi: i32) {
        self.window.push(Measurement::new(rssi, self.clock.now()));
        log::trace!("RunningAverageFilter: added measurement {}", rssi);
    }

    fn no_measurements_available(&self) -> bool {
        self.measurement_count() == 0
    }

    fn calculate_rssi(&self) -> Option<f64> {
        let now = self.clock.now();
        self.window
            .with_refreshed(now, |live| trimmed_quantile_mean(live, &self.config, now))
    }

    fn measurement_count(&self) -> usize {
        self.window.live_count(self.clock.now())
    }

    fn name(&self) -> &'static str {
        "RunningAverageFilter"
    }
}
