//! Diagnostic JSON data logger
//!
//! Appends one JSON object per line to a data file so that recorded ranging
//! sessions can be analysed offline. Logging is strictly best-effort: a
//! disabled logger does nothing, and a logger whose file cannot be written
//! reports the problem once through the `log` facade and then keeps
//! swallowing failures. Nothing here ever returns an error to the tracking
//! path.

use crate::types::TransmitterState;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default data file name
pub const DEFAULT_DATA_FILE: &str = "BeaconData.json";

/// Append-only sink for structured diagnostic records
pub trait DiagnosticSink: Send + Sync {
    /// Record `record` under `component`. Must not fail or panic.
    fn log(&self, record: Value, component: &str);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn log(&self, _record: Value, _component: &str) {}
}

#[derive(Debug, Default)]
struct LoggerSettings {
    enabled: bool,
    path: Option<PathBuf>,
    crowded: bool,
    in_range: i32,
}

/// JSON line logger writing to a data file
#[derive(Debug, Default)]
pub struct JsonDataLogger {
    settings: Mutex<LoggerSettings>,
    failure_reported: AtomicBool,
}

impl JsonDataLogger {
    /// Create a disabled logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an enabled logger appending to `path`
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        let logger = Self::new();
        logger.set_enabled(true, Some(path.into()));
        logger
    }

    /// Enable or disable logging and set the output file
    ///
    /// Enabling without a path is allowed; every record is then dropped and
    /// the missing path is reported once.
    pub fn set_enabled(&self, enabled: bool, path: Option<PathBuf>) {
        let mut settings = self.settings.lock();
        settings.enabled = enabled;
        settings.path = path;
        self.failure_reported.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.lock().enabled
    }

    /// Mark subsequent records as taken in a crowded environment
    pub fn set_crowded(&self, crowded: bool) {
        self.settings.lock().crowded = crowded;
    }

    /// Annotate subsequent records with the ground-truth range of the session
    pub fn set_range(&self, range: i32) {
        self.settings.lock().in_range = range;
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.settings.lock().path.clone()
    }

    /// True once a write failure has been reported since the last `set_enabled`
    pub fn has_reported_failure(&self) -> bool {
        self.failure_reported.load(Ordering::Relaxed)
    }

    /// Log a free-form message
    pub fn log_message(&self, message: &str, component: &str) {
        let mut record = Map::new();
        record.insert("message".to_string(), Value::from(message));
        self.log(Value::Object(record), component);
    }

    /// Log the published state of a transmitter
    pub fn log_state(&self, state: &TransmitterState, component: &str) {
        self.log(state.to_json(), component);
    }

    fn annotate(&self, record: Value, component: &str, settings: &LoggerSettings) -> Value {
        let mut object = match record {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        object.insert("component".to_string(), Value::from(component));
        object.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        object.insert("crowded".to_string(), Value::from(settings.crowded));
        object.insert("in_range".to_string(), Value::from(settings.in_range));
        Value::Object(object)
    }

    fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }

    /// Log the first failure only; returns whether this call logged
    fn report_failure(&self, message: &str) -> bool {
        let first = !self.failure_reported.swap(true, Ordering::Relaxed);
        if first {
            log::error!("JsonDataLogger: {}", message);
        }
        first
    }
}

impl DiagnosticSink for JsonDataLogger {
    fn log(&self, record: Value, component: &str) {
        let (line, path) = {
            let settings = self.settings.lock();
            if !settings.enabled {
                return;
            }
            let Some(path) = settings.path.clone() else {
                drop(settings);
                self.report_failure("no output file configured");
                return;
            };
            (self.annotate(record, component, &settings).to_string(), path)
        };

        if let Err(e) = Self::append_line(&path, &line) {
            self.report_failure(&format!("could not write to {:?}: {}", path, e));
        }
    }
}
