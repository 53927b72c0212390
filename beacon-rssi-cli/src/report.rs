//! Report generation
//!
//! Per-cycle estimates are written either as aligned text or as JSON lines;
//! the run summary is always text.

use crate::config::OutputFormat;
use crate::replay::{CycleReport, ReplayOutcome};
use anyhow::Result;
use beacon_rssi_filter::types::format_estimate;
use std::io::Write;

/// Write every cycle of one replay
pub fn write_cycles(out: &mut dyn Write, outcome: &ReplayOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Txt => {
            writeln!(out, "# {}", outcome.source.display())?;
            writeln!(out, "{:>10}  {:<24} {:>8} {:>8}  {}", "t_ms", "id", "avg", "max", "status")?;
            for cycle in &outcome.cycles {
                write_cycle_txt(out, cycle)?;
            }
        }
        OutputFormat::Json => {
            for cycle in &outcome.cycles {
                writeln!(out, "{}", serde_json::to_string(cycle)?)?;
            }
        }
    }
    Ok(())
}

fn write_cycle_txt(out: &mut dyn Write, cycle: &CycleReport) -> Result<()> {
    for entry in &cycle.states {
        writeln!(
            out,
            "{:>10}  {:<24} {:>8} {:>8}  {}",
            cycle.t_ms,
            entry.state.id,
            format_estimate(entry.state.running_average_rssi),
            format_estimate(entry.state.running_max_rssi),
            if entry.tracked { "tracked" } else { "untracked" }
        )?;
    }
    Ok(())
}

/// Write the end-of-run summary
pub fn write_summary(out: &mut dyn Write, outcome: &ReplayOutcome) -> Result<()> {
    writeln!(out, "\n=== REPLAY SUMMARY: {} ===", outcome.source.display())?;
    writeln!(out, "Cycles:                {}", outcome.cycles.len())?;
    writeln!(out, "Samples replayed:      {}", outcome.samples)?;
    writeln!(out, "Unavailable readings:  {}", outcome.rejected_samples)?;
    writeln!(out, "Skipped lines:         {}", outcome.skipped_lines)?;
    writeln!(out, "Out-of-order samples:  {}", outcome.out_of_order)?;
    writeln!(out, "Out-of-range samples:  {}", outcome.out_of_range)?;
    writeln!(out, "Filter failures:       {}", outcome.construction_failures)?;

    if !outcome.last_states.is_empty() {
        writeln!(out, "\nLast published estimates:")?;
        for state in &outcome.last_states {
            writeln!(out, "  {}", state)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::CycleEntry;
    use beacon_rssi_filter::TransmitterState;
    use std::path::PathBuf;

    fn outcome() -> ReplayOutcome {
        let mut state = TransmitterState::new("beacon-a");
        state.running_average_rssi = Some(-71.5);
        state.running_max_rssi = Some(-60.0);

        ReplayOutcome {
            source: PathBuf::from("hallway.jsonl"),
            cycles: vec![CycleReport {
                t_ms: 1100,
                states: vec![CycleEntry {
                    state: state.clone(),
                    tracked: true,
                }],
            }],
            samples: 12,
            rejected_samples: 1,
            out_of_range: 2,
            last_states: vec![state],
            ..ReplayOutcome::default()
        }
    }

    #[test]
    fn test_txt_cycles() {
        let mut buf = Vec::new();
        write_cycles(&mut buf, &outcome(), OutputFormat::Txt).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("# hallway.jsonl\n"));
        let row = text.lines().nth(2).unwrap();
        assert!(row.contains("beacon-a"));
        assert!(row.contains("-71.50"));
        assert!(row.contains("-60.00"));
        assert!(row.ends_with("tracked"));
    }

    #[test]
    fn test_json_cycles() {
        let mut buf = Vec::new();
        write_cycles(&mut buf, &outcome(), OutputFormat::Json).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(value["t_ms"], 1100);
        assert_eq!(value["states"][0]["id"], "beacon-a");
        assert_eq!(value["states"][0]["tracked"], true);
        assert_eq!(value["states"][0]["running_average_rssi"], -71.5);
    }

    #[test]
    fn test_summary() {
        let mut buf = Vec::new();
        write_summary(&mut buf, &outcome()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Samples replayed:      12"));
        assert!(text.contains("Unavailable readings:  1"));
        assert!(text.contains("Out-of-range samples:  2"));
        assert!(text.contains("beacon-a avg=-71.50 max=-60.00"));
    }
}
