//! Running max filter
//!
//! Reports the strongest sample seen within a short window. It reacts to a
//! nearby burst long before the running average, which stays suppressed by
//! floor padding in a noisy environment.

use super::{MeasurementWindow, RssiFilter};
use crate::clock::Clock;
use crate::config::MaxFilterConfig;
use crate::types::{Measurement, Result};
use std::sync::Arc;

/// Strongest RSSI over a short window
pub struct RunningMaxFilter {
    config: MaxFilterConfig,
    window: MeasurementWindow,
    clock: Arc<dyn Clock>,
}

impl RunningMaxFilter {
    pub fn new(config: MaxFilterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: MeasurementWindow::new(config.expiration_ms),
            config,
            clock,
        })
    }

    pub fn config(&self) -> &MaxFilterConfig {
        &self.config
    }
}

impl RssiFilter for RunningMaxFilter {
    fn add_measurement(&self, rssi: i32) {
        self.window.push(Measurement::new(rssi, self.clock.now()));
        log::trace!("RunningMaxFilter: added measurement {}", rssi);
    }

    fn no_measurements_available(&self) -> bool {
        self.measurement_count() == 0
    }

    fn calculate_rssi(&self) -> Option<f64> {
        let max = self
            .window
            .with_refreshed(self.clock.now(), |live| live.iter().map(|m| m.rssi).max())?;
        log::debug!("Running max RSSI: {}", max);
        Some(max as f64)
    }

    fn measurement_count(&self) -> usize {
        self.window.live_count(self.clock.now())
    }

    fn name(&self) -> &'static str {
        "RunningMaxFilter"
    }
}
