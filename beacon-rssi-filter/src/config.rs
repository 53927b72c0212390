//! Tracking configuration types
//!
//! All tunables live in one [`TrackingConfig`] that is built once at startup
//! and handed to every transmitter through a
//! [`TrackingContext`](crate::tracker::TrackingContext). Nothing here is
//! global; two registries may run side by side with different settings.

use crate::types::{FilterError, Result};
use serde::{Deserialize, Serialize};

/// Default time without an accepted measurement before a transmitter expires
pub const DEFAULT_MAX_TRACKING_AGE_MS: u64 = 5000;
/// Default window of the running average filter
pub const DEFAULT_AVERAGE_EXPIRATION_MS: u64 = 20000;
/// Default expected interval between samples
pub const DEFAULT_SAMPLE_RATE_MS: u64 = 500;
/// Default fraction of the weakest samples discarded before averaging
pub const DEFAULT_SAMPLE_QUANTILE: f64 = 0.5;
/// Default window of the running max filter
pub const DEFAULT_MAX_EXPIRATION_MS: u64 = 7500;

/// Configuration for transmitter tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// A transmitter with no accepted measurement for longer than this is expired
    #[serde(default = "default_max_tracking_age")]
    pub max_tracking_age_ms: u64,

    /// Built-in filter used for the running average estimate
    #[serde(default)]
    pub average_filter: FilterKind,

    /// Parameters of the trimmed-quantile average filter
    #[serde(default)]
    pub average: AverageFilterConfig,

    /// Parameters of the running max filter
    #[serde(default)]
    pub max: MaxFilterConfig,
}

/// Parameters of the trimmed-quantile average filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageFilterConfig {
    /// Samples older than this are discarded
    #[serde(default = "default_average_expiration")]
    pub expiration_ms: u64,

    /// Expected interval between samples; sets how many slots a full window has
    #[serde(default = "default_sample_rate")]
    pub sample_rate_ms: u64,

    /// Fraction of the weakest (padded) samples discarded before averaging
    #[serde(default = "default_quantile")]
    pub quantile: f64,
}

/// Parameters of the running max filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxFilterConfig {
    /// Samples older than this are discarded
    #[serde(default = "default_max_expiration")]
    pub expiration_ms: u64,
}

/// Built-in filter implementations selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Trimmed-quantile average with floor padding
    #[default]
    RunningAverage,
    /// Strongest sample in the window
    RunningMax,
}

fn default_max_tracking_age() -> u64 {
    DEFAULT_MAX_TRACKING_AGE_MS
}

fn default_average_expiration() -> u64 {
    DEFAULT_AVERAGE_EXPIRATION_MS
}

fn default_sample_rate() -> u64 {
    DEFAULT_SAMPLE_RATE_MS
}

fn default_quantile() -> f64 {
    DEFAULT_SAMPLE_QUANTILE
}

fn default_max_expiration() -> u64 {
    DEFAULT_MAX_EXPIRATION_MS
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_tracking_age_ms: DEFAULT_MAX_TRACKING_AGE_MS,
            average_filter: FilterKind::default(),
            average: AverageFilterConfig::default(),
            max: MaxFilterConfig::default(),
        }
    }
}

impl Default for AverageFilterConfig {
    fn default() -> Self {
        Self {
            expiration_ms: DEFAULT_AVERAGE_EXPIRATION_MS,
            sample_rate_ms: DEFAULT_SAMPLE_RATE_MS,
            quantile: DEFAULT_SAMPLE_QUANTILE,
        }
    }
}

impl Default for MaxFilterConfig {
    fn default() -> Self {
        Self {
            expiration_ms: DEFAULT_MAX_EXPIRATION_MS,
        }
    }
}

impl AverageFilterConfig {
    /// Number of samples a fully populated window holds
    pub fn window_capacity(&self) -> usize {
        (self.expiration_ms / self.sample_rate_ms.max(1)) as usize
    }

    /// Check that the parameters describe a usable filter
    pub fn validate(&self) -> Result<()> {
        if self.expiration_ms == 0 {
            return Err(FilterError::InvalidConfiguration(
                "average filter expiration_ms must be greater than 0".to_string(),
            ));
        }
        if self.sample_rate_ms == 0 {
            return Err(FilterError::InvalidConfiguration(
                "average filter sample_rate_ms must be greater than 0".to_string(),
            ));
        }
        if self.sample_rate_ms > self.expiration_ms {
            return Err(FilterError::InvalidConfiguration(format!(
                "average filter sample_rate_ms ({}) exceeds expiration_ms ({})",
                self.sample_rate_ms, self.expiration_ms
            )));
        }
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "average filter quantile must lie in (0, 1), got {}",
                self.quantile
            )));
        }
        Ok(())
    }
}

impl MaxFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.expiration_ms == 0 {
            return Err(FilterError::InvalidConfiguration(
                "max filter expiration_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl TrackingConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the maximum tracking age
    pub fn with_max_tracking_age_ms(mut self, ms: u64) -> Self {
        self.max_tracking_age_ms = ms;
        self
    }

    /// Builder method: select the built-in average filter
    pub fn with_average_filter(mut self, kind: FilterKind) -> Self {
        self.average_filter = kind;
        self
    }

    /// Builder method: set the average filter window
    pub fn with_average_expiration_ms(mut self, ms: u64) -> Self {
        self.average.expiration_ms = ms;
        self
    }

    /// Builder method: set the expected sample interval
    pub fn with_sample_rate_ms(mut self, ms: u64) -> Self {
        self.average.sample_rate_ms = ms;
        self
    }

    /// Builder method: set the trimming quantile
    pub fn with_quantile(mut self, quantile: f64) -> Self {
        self.average.quantile = quantile;
        self
    }

    /// Builder method: set the max filter window
    pub fn with_max_expiration_ms(mut self, ms: u64) -> Self {
        self.max.expiration_ms = ms;
        self
    }

    /// Check the whole configuration
    ///
    /// Filter parameters are also checked when a filter is built, so an
    /// unvalidated config fails at the first transmitter instead.
    pub fn validate(&self) -> Result<()> {
        self.average.validate()?;
        self.max.validate()?;
        Ok(())
    }
}
