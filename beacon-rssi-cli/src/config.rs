//! Configuration loading and parsing

use anyhow::{Context, Result};
use beacon_rssi_filter::TrackingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub datalog: DatalogConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulated ranging cycle
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CycleConfig {
    /// Length of one ranging cycle in milliseconds
    #[serde(default = "default_period")]
    pub period_ms: u64,
    /// Empty cycles to run after the last sample, to watch estimates decay
    #[serde(default)]
    pub drain_cycles: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period(),
            drain_cycles: 0,
        }
    }
}

fn default_period() -> u64 {
    1100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatalogConfig {
    #[serde(default)]
    pub enabled: bool,
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub crowded: bool,
    #[serde(default)]
    pub range: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    pub path: Option<PathBuf>,
    /// Also report transmitters that were not seen in a cycle
    #[serde(default)]
    pub include_untracked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Json,
}

impl AppConfig {
    /// Check settings the library does not validate itself
    pub fn validate(&self) -> Result<()> {
        self.tracking
            .validate()
            .context("Invalid [tracking] section")?;
        if self.cycle.period_ms == 0 {
            anyhow::bail!("[cycle] period_ms must be greater than 0");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_rssi_filter::FilterKind;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [tracking]
            max_tracking_age_ms = 3000
            average_filter = "running_average"

            [tracking.average]
            expiration_ms = 10000
            quantile = 0.3

            [tracking.max]
            expiration_ms = 5000

            [cycle]
            period_ms = 1000
            drain_cycles = 5

            [datalog]
            enabled = true
            path = "BeaconData.json"
            range = 2

            [output]
            format = "json"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.tracking.max_tracking_age_ms, 3000);
        assert_eq!(config.tracking.average_filter, FilterKind::RunningAverage);
        assert_eq!(config.tracking.average.expiration_ms, 10000);
        assert_eq!(config.tracking.average.sample_rate_ms, 500);
        assert_eq!(config.tracking.average.quantile, 0.3);
        assert_eq!(config.tracking.max.expiration_ms, 5000);
        assert_eq!(config.cycle.period_ms, 1000);
        assert_eq!(config.cycle.drain_cycles, 5);
        assert!(config.datalog.enabled);
        assert_eq!(config.datalog.range, 2);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.tracking, TrackingConfig::default());
        assert_eq!(config.cycle.period_ms, 1100);
        assert!(!config.datalog.enabled);
        assert_eq!(config.output.format, OutputFormat::Txt);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: AppConfig = toml::from_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.tracking, TrackingConfig::default());
        assert_eq!(config.cycle.period_ms, CycleConfig::default().period_ms);
        assert!(config.datalog.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let config: AppConfig = toml::from_str("[cycle]\nperiod_ms = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: AppConfig = toml::from_str("[tracking.average]\nquantile = 1.5\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cycle]\nperiod_ms = 500\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.cycle.period_ms, 500);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
