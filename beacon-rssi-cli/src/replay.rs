//! Replay of recorded RSSI samples
//!
//! A sample log is a JSON-lines file, one reading per line:
//!
//! ```text
//! {"t_ms": 0, "id": "beacon-a", "rssi": -64}
//! {"t_ms": 120, "id": "beacon-b", "rssi": 127}
//! ```
//!
//! Time follows the recording: a manual clock is moved to each sample's
//! timestamp before it is ingested, and every time a cycle boundary is
//! crossed the registry finalizes the cycle. Blank lines and lines starting
//! with `#` are ignored.
//!
//! Once every transmitter has been dropped, the empty cycles of a recording
//! gap are skipped and replay resumes at the cycle holding the next sample.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use beacon_rssi_filter::clock::timestamp_from_millis;
use beacon_rssi_filter::types::Timestamp;
use beacon_rssi_filter::{
    DiagnosticSink, ManualClock, RangingRegistry, TrackingContext, TransmitterState,
    RSSI_UNAVAILABLE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One recorded reading
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SampleRecord {
    /// Milliseconds since the start of the recording
    pub t_ms: u64,
    /// Transmitter identifier
    pub id: String,
    /// Raw RSSI in dBm (127 = unavailable)
    pub rssi: i32,
}

/// Parsed sample file
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    pub source: PathBuf,
    pub samples: Vec<SampleRecord>,
    /// Lines that could not be parsed
    pub skipped_lines: usize,
}

/// Published states at the end of one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Cycle end, milliseconds since the start of the recording
    pub t_ms: u64,
    pub states: Vec<CycleEntry>,
}

/// One transmitter's published state in a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleEntry {
    #[serde(flatten)]
    pub state: TransmitterState,
    pub tracked: bool,
}

/// Everything produced by replaying one sample log
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    pub source: PathBuf,
    pub cycles: Vec<CycleReport>,
    pub samples: usize,
    pub rejected_samples: usize,
    pub skipped_lines: usize,
    pub out_of_order: usize,
    /// Samples whose timestamp cannot be represented on the replay clock
    pub out_of_range: usize,
    pub construction_failures: usize,
    /// Last published state per transmitter, sorted by id
    pub last_states: Vec<TransmitterState>,
}

/// Read a JSON-lines sample file
pub fn read_samples(path: &Path) -> Result<SampleLog> {
    let file = File::open(path).with_context(|| format!("Failed to open sample file: {:?}", path))?;
    let reader = BufReader::new(file);

    let mut sample_log = SampleLog {
        source: path.to_path_buf(),
        ..SampleLog::default()
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?} line {}", path, index + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<SampleRecord>(trimmed) {
            Ok(sample) => sample_log.samples.push(sample),
            Err(e) => {
                log::warn!("Skipping {:?} line {}: {}", path, index + 1, e);
                sample_log.skipped_lines += 1;
            }
        }
    }

    log::info!(
        "Loaded {} samples from {:?} ({} skipped lines)",
        sample_log.samples.len(),
        path,
        sample_log.skipped_lines
    );
    Ok(sample_log)
}

/// Replay clock time for a recording offset
fn recording_time(t_ms: u64) -> Option<Timestamp> {
    i64::try_from(t_ms).ok().and_then(timestamp_from_millis)
}

/// Upcoming cycle boundaries in recording time
///
/// `next_end` is `None` once the next boundary would overflow.
#[derive(Debug, Clone, Copy)]
struct CycleSchedule {
    period: u64,
    next_end: Option<u64>,
}

impl CycleSchedule {
    fn starting_at(t_ms: u64, period: u64) -> Self {
        Self {
            period,
            next_end: t_ms.checked_add(period),
        }
    }

    /// Boundary to close before a sample at `t_ms` can be ingested
    fn due(&self, t_ms: u64) -> Option<u64> {
        self.next_end.filter(|end| t_ms >= *end)
    }

    fn advance(&mut self) {
        self.next_end = self.next_end.and_then(|end| end.checked_add(self.period));
    }

    /// Move to the first boundary after `t_ms`, returning how many boundaries were passed over
    fn skip_past(&mut self, t_ms: u64) -> u64 {
        let Some(end) = self.next_end.filter(|end| t_ms >= *end) else {
            return 0;
        };
        let skipped = (t_ms - end) / self.period + 1;
        self.next_end = skipped
            .checked_mul(self.period)
            .and_then(|offset| end.checked_add(offset));
        skipped
    }
}

/// Run a sample log through a fresh registry in simulated ranging cycles
pub fn replay(sample_log: &SampleLog, config: &AppConfig, sink: Arc<dyn DiagnosticSink>) -> ReplayOutcome {
    let mut outcome = ReplayOutcome {
        source: sample_log.source.clone(),
        skipped_lines: sample_log.skipped_lines,
        ..ReplayOutcome::default()
    };

    let Some((mut now, mut now_at)) = sample_log
        .samples
        .iter()
        .find_map(|sample| recording_time(sample.t_ms).map(|at| (sample.t_ms, at)))
    else {
        outcome.out_of_range = sample_log.samples.len();
        log::warn!("No replayable samples in {:?}", sample_log.source);
        return outcome;
    };

    let clock = Arc::new(ManualClock::new(now_at));
    let context = TrackingContext::new(config.tracking.clone())
        .with_clock(clock.clone())
        .with_sink(sink);
    let mut registry = RangingRegistry::new(context);
    let mut last_states: BTreeMap<String, TransmitterState> = Default::default();
    let mut schedule = CycleSchedule::starting_at(now, config.cycle.period_ms);

    for sample in &sample_log.samples {
        let Some(sample_at) = recording_time(sample.t_ms) else {
            log::warn!(
                "Skipping sample for {} at {} ms: outside the representable time range",
                sample.id,
                sample.t_ms
            );
            outcome.out_of_range += 1;
            continue;
        };

        while let Some(end) = schedule.due(sample.t_ms) {
            // Boundaries at or before a valid sample time are always representable
            let Some(end_at) = recording_time(end) else { break };
            clock.set(end_at);
            outcome.cycles.push(finish_cycle(&mut registry, end, config, &mut last_states));
            schedule.advance();

            if registry.is_empty() {
                let skipped = schedule.skip_past(sample.t_ms);
                if skipped > 0 {
                    log::debug!("Skipped {} idle cycle(s) before {} ms", skipped, sample.t_ms);
                }
            }
        }

        if sample.t_ms < now {
            log::warn!(
                "Sample for {} at {} ms is older than {} ms, replaying it at {} ms",
                sample.id,
                sample.t_ms,
                now,
                now
            );
            outcome.out_of_order += 1;
        } else {
            now = sample.t_ms;
            now_at = sample_at;
        }
        clock.set(now_at);

        outcome.samples += 1;
        if sample.rssi == RSSI_UNAVAILABLE {
            outcome.rejected_samples += 1;
        }
        if registry.observe(&sample.id, sample.rssi).is_err() {
            outcome.construction_failures += 1;
        }
    }

    for _ in 0..=config.cycle.drain_cycles {
        let Some((end, end_at)) = schedule
            .next_end
            .and_then(|end| recording_time(end).map(|at| (end, at)))
        else {
            log::warn!("Stopping drain: next cycle boundary is outside the representable time range");
            break;
        };
        clock.set(end_at);
        outcome.cycles.push(finish_cycle(&mut registry, end, config, &mut last_states));
        schedule.advance();
    }

    outcome.last_states = last_states.into_values().collect();
    log::info!(
        "Replayed {:?}: {} samples in {} cycles, {} transmitters still held",
        sample_log.source,
        outcome.samples,
        outcome.cycles.len(),
        registry.len()
    );
    outcome
}

fn finish_cycle(
    registry: &mut RangingRegistry,
    t_ms: u64,
    config: &AppConfig,
    last_states: &mut BTreeMap<String, TransmitterState>,
) -> CycleReport {
    let reported = registry.finalize_cycle();
    let mut states: Vec<CycleEntry> = reported
        .into_iter()
        .map(|state| CycleEntry { state, tracked: true })
        .collect();

    if config.output.include_untracked {
        for id in registry.ids() {
            if states.iter().any(|entry| entry.state.id == id) {
                continue;
            }
            if let Some(transmitter) = registry.get(&id) {
                states.push(CycleEntry {
                    state: transmitter.state(),
                    tracked: false,
                });
            }
        }
        states.sort_by(|a, b| a.state.id.cmp(&b.state.id));
    }

    for entry in &states {
        last_states.insert(entry.state.id.clone(), entry.state.clone());
    }

    CycleReport { t_ms, states }
}
