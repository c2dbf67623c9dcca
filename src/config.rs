//! # Global runtime configuration.
//!
//! Provides [`Config`] — centralized settings for the orchestrator runtime.
//!
//! Config is consumed in two places:
//! 1. **Orchestrator creation**: `Orchestrator::builder(config)`
//! 2. **Processor behavior**: look-ahead, starvation and fault thresholds
//!
//! ## Sentinel values
//! - `look_ahead = 0` → treated as 1 (the loop always inspects the head)
//! - `grace = 0s` → no drain wait, force shutdown immediately

use std::time::Duration;

/// Global configuration for the orchestrator runtime.
///
/// ## Field semantics
/// - `look_ahead`: how many pending petitions one scheduling round may
///   inspect when the head's admission predicate does not hold. `1` means
///   strict priority order with no overtaking.
/// - `starvation_threshold`: number of times a petition may be seen and
///   re-queued before it is considered starving; while any petition is
///   starving the effective look-ahead collapses to 1 so the queue head
///   cannot be overtaken indefinitely.
/// - `fault_threshold`: consecutive processor-loop failures after which
///   liveness reporting stops so the external supervisor can restart the
///   service. The loop itself keeps running.
/// - `bus_capacity`: ring-buffer capacity of the event bus; slow
///   subscribers past this lag observe `Lagged` and skip old events.
/// - `grace`: maximum wait for live petitions to finish during shutdown.
/// - `idle_wait_min` / `idle_wait_max`: bounds of the jittered sleep taken
///   when a full round makes no progress and the queue head is unchanged.
#[derive(Clone, Debug)]
pub struct Config {
    /// Pending petitions inspected per scheduling round.
    pub look_ahead: usize,

    /// Re-queue count after which a petition is considered starving.
    pub starvation_threshold: u32,

    /// Consecutive loop faults before liveness reporting is suppressed.
    pub fault_threshold: u32,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Maximum time to wait for live petitions during shutdown.
    pub grace: Duration,

    /// Lower bound of the idle-round jittered sleep.
    pub idle_wait_min: Duration,

    /// Upper bound of the idle-round jittered sleep.
    pub idle_wait_max: Duration,
}

impl Config {
    /// Returns the look-ahead clamped to a minimum of 1.
    #[inline]
    pub fn look_ahead_clamped(&self) -> usize {
        self.look_ahead.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the idle-wait bounds as an ordered `(min, max)` pair.
    #[inline]
    pub fn idle_wait_bounds(&self) -> (Duration, Duration) {
        if self.idle_wait_min <= self.idle_wait_max {
            (self.idle_wait_min, self.idle_wait_max)
        } else {
            (self.idle_wait_max, self.idle_wait_min)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `look_ahead = 1` (strict priority order)
    /// - `starvation_threshold = 1000`
    /// - `fault_threshold = 5`
    /// - `bus_capacity = 1024`
    /// - `grace = 30s`
    /// - `idle_wait = 500ms..5s`
    fn default() -> Self {
        Self {
            look_ahead: 1,
            starvation_threshold: 1000,
            fault_threshold: 5,
            bus_capacity: 1024,
            grace: Duration::from_secs(30),
            idle_wait_min: Duration::from_millis(500),
            idle_wait_max: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_ahead_zero_clamps_to_one() {
        let cfg = Config {
            look_ahead: 0,
            ..Config::default()
        };
        assert_eq!(cfg.look_ahead_clamped(), 1);
    }

    #[test]
    fn test_idle_wait_bounds_reorder() {
        let cfg = Config {
            idle_wait_min: Duration::from_secs(5),
            idle_wait_max: Duration::from_millis(100),
            ..Config::default()
        };
        let (lo, hi) = cfg.idle_wait_bounds();
        assert!(lo <= hi);
    }
}
