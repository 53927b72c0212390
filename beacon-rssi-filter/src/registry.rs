//! Ranging registry
//!
//! Keeps every transmitter seen in recent cycles and drives the two-phase
//! ingest/commit protocol on their behalf:
//!
//! 1. During a cycle, [`RangingRegistry::observe`] creates a transmitter on
//!    its first sighting and forwards later readings to it.
//! 2. At the end of the cycle, [`RangingRegistry::finalize_cycle`] commits
//!    every transmitter seen in that cycle and reports the ones with a
//!    running average. Transmitters that still hold samples are kept but
//!    marked untracked until they are seen again; transmitters whose
//!    windows have drained are dropped.

use crate::tracker::{RangedTransmitter, TrackingContext};
use crate::types::{Result, TransmitterState};
use std::collections::HashMap;

/// Per-session collection of tracked transmitters
pub struct RangingRegistry {
    context: TrackingContext,
    transmitters: HashMap<String, RangedTransmitter>,
}

impl RangingRegistry {
    pub fn new(context: TrackingContext) -> Self {
        Self {
            context,
            transmitters: HashMap::new(),
        }
    }

    pub fn context(&self) -> &TrackingContext {
        &self.context
    }

    /// Record one reading for the transmitter `id`
    ///
    /// A transmitter whose filters cannot be built is not tracked; the error
    /// is logged and returned.
    pub fn observe(&mut self, id: &str, rssi: i32) -> Result<()> {
        if let Some(transmitter) = self.transmitters.get(id) {
            transmitter.add_measurement(rssi);
            return Ok(());
        }

        match RangedTransmitter::new(id, rssi, &self.context) {
            Ok(transmitter) => {
                log::debug!("Started tracking {}", id);
                self.transmitters.insert(id.to_string(), transmitter);
                Ok(())
            }
            Err(e) => {
                log::error!("Not tracking {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Close the current cycle and return the states worth reporting
    ///
    /// The result is sorted by transmitter id.
    pub fn finalize_cycle(&mut self) -> Vec<TransmitterState> {
        let mut reported = Vec::new();

        self.transmitters.retain(|id, transmitter| {
            if transmitter.is_tracked() {
                transmitter.commit_measurements();
                let state = transmitter.state();
                if state.running_average_rssi.is_some() {
                    reported.push(state);
                }
            }

            if transmitter.no_measurements_available() {
                log::debug!("Dropping {}: no recent measurements", id);
                false
            } else {
                transmitter.set_tracked(false);
                true
            }
        });

        reported.sort_by(|a, b| a.id.cmp(&b.id));
        reported
    }

    /// Drop every transmitter past its maximum tracking age
    ///
    /// Returns the ids removed, sorted.
    pub fn prune_expired(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.transmitters.retain(|id, transmitter| {
            if transmitter.is_expired() {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        removed
    }

    pub fn get(&self, id: &str) -> Option<&RangedTransmitter> {
        self.transmitters.get(id)
    }

    /// Ids of all transmitters currently held, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.transmitters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.transmitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transmitters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TrackingConfig;
    use crate::types::RSSI_UNAVAILABLE;
    use std::sync::Arc;

    fn registry() -> (Arc<ManualClock>, RangingRegistry) {
        let clock = Arc::new(ManualClock::from_millis(100_000));
        let context = TrackingContext::new(TrackingConfig::default()).with_clock(clock.clone());
        (clock, RangingRegistry::new(context))
    }

    #[test]
    fn test_first_sighting_creates_transmitter() {
        let (_clock, mut registry) = registry();
        assert!(registry.is_empty());

        registry.observe("b", -60).unwrap();
        registry.observe("a", -70).unwrap();
        registry.observe("a", -72).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.get("a").unwrap().state().rssi, Some(-72));
    }

    #[test]
    fn test_finalize_reports_and_untracks() {
        let (clock, mut registry) = registry();
        registry.observe("a", -60).unwrap();
        registry.observe("b", -80).unwrap();

        let reported = registry.finalize_cycle();
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0].id, "a");
        assert_eq!(reported[0].running_max_rssi, Some(-60.0));
        assert!(!registry.get("a").unwrap().is_tracked());

        // Only "a" is seen in the next cycle
        clock.advance_ms(1100);
        registry.observe("a", -58).unwrap();
        let reported = registry.finalize_cycle();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].id, "a");
        assert_eq!(reported[0].running_max_rssi, Some(-58.0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_transmitter_dropped_once_window_drains() {
        let (clock, mut registry) = registry();
        registry.observe("a", -60).unwrap();
        registry.finalize_cycle();

        clock.advance_ms(19_999);
        registry.finalize_cycle();
        assert_eq!(registry.len(), 1);

        clock.advance_ms(1);
        registry.finalize_cycle();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sentinel_first_sighting_is_dropped_at_finalize() {
        let (_clock, mut registry) = registry();
        registry.observe("ghost", RSSI_UNAVAILABLE).unwrap();
        assert_eq!(registry.len(), 1);

        let reported = registry.finalize_cycle();
        assert!(reported.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prune_expired() {
        let (clock, mut registry) = registry();
        registry.observe("old", -60).unwrap();
        clock.advance_ms(3000);
        registry.observe("new", -60).unwrap();
        clock.advance_ms(2500);

        assert_eq!(registry.prune_expired(), vec!["old".to_string()]);
        assert_eq!(registry.ids(), vec!["new".to_string()]);
    }

    #[test]
    fn test_construction_failure_is_not_tracked() {
        let clock = Arc::new(ManualClock::default());
        let config = TrackingConfig::new().with_quantile(2.0);
        let context = TrackingContext::new(config).with_clock(clock);
        let mut registry = RangingRegistry::new(context);

        assert!(registry.observe("a", -60).is_err());
        assert!(registry.is_empty());
    }
}
