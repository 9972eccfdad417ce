//! Pure reconciliation helpers (spec.md §4.4): computing a logger's
//! desired config from the snapshot, and tracking per-logger restart
//! backoff/failure-threshold state. The manager's run loop (`manager.rs`)
//! owns the mutable child-process state this advises.

use std::time::{Duration, Instant};

use crate::config::CruiseDefinition;

/// Tunable reconciliation constants (spec.md §4.4, §5; exposed as
/// configuration per spec.md §9 "restart thresholds and backoff constants
/// ... implementations should expose as configuration").
#[derive(Clone, Copy, Debug)]
pub struct ReconcileConfig {
    pub tick_interval: Duration,
    pub start_grace: Duration,
    pub stop_grace: Duration,
    pub kill_grace: Duration,
    pub min_uptime: Duration,
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub backoff_initial: Duration,
    pub backoff_cap: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            start_grace: Duration::from_secs(2),
            stop_grace: Duration::from_secs(5),
            kill_grace: Duration::from_secs(10),
            min_uptime: Duration::from_secs(2),
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            backoff_initial: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// `desired_config = overrides.get(logger) or modes[active_mode][logger]`
/// (spec.md §4.4 step 1). Returns `None` when neither names a config,
/// which the caller treats as the logger's "off" config.
pub fn desired_config<'a>(
    definition: &'a CruiseDefinition,
    active_mode: &str,
    overrides: &indexmap::IndexMap<String, String>,
    logger: &str,
) -> Option<&'a str> {
    if let Some(config) = overrides.get(logger) {
        return definition.configs.contains_key(config).then_some(config.as_str());
    }
    definition.config_for(active_mode, logger)
}

/// Per-logger restart/backoff bookkeeping (spec.md §4.4 step 3: "increment
/// `failures`; if `failures >= N` within `window`, mark FATAL"; exponential
/// backoff capped at `backoff_cap`).
#[derive(Clone, Debug, Default)]
pub struct BackoffTracker {
    failures: u32,
    window_start: Option<Instant>,
    last_failure: Option<Instant>,
}

impl BackoffTracker {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.window_start = None;
        self.last_failure = None;
    }

    /// Record a failure at `now`; returns `(failure_count, is_fatal)`.
    pub fn record_failure(&mut self, now: Instant, config: &ReconcileConfig) -> (u32, bool) {
        match self.window_start {
            Some(start) if now.duration_since(start) <= config.failure_window => {
                self.failures += 1;
            }
            _ => {
                self.window_start = Some(now);
                self.failures = 1;
            }
        }
        self.last_failure = Some(now);
        let fatal = self.failures >= config.failure_threshold;
        (self.failures, fatal)
    }

    /// The exponential backoff delay before the next restart attempt:
    /// `1s, 2s, 4s, 8s, ...` capped at `backoff_cap` (spec.md §4.4).
    pub fn next_delay(&self, config: &ReconcileConfig) -> Duration {
        if self.failures == 0 {
            return Duration::ZERO;
        }
        let exponent = self.failures.saturating_sub(1).min(16);
        let scaled = config.backoff_initial.saturating_mul(1u32 << exponent);
        scaled.min(config.backoff_cap)
    }

    /// Whether a restart attempted now would still be inside the
    /// just-computed backoff delay.
    pub fn still_backing_off(&self, now: Instant, config: &ReconcileConfig) -> bool {
        match self.last_failure {
            Some(last) => now.duration_since(last) < self.next_delay(config),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ReconcileConfig::default();
        let mut tracker = BackoffTracker::default();
        let t0 = Instant::now();
        tracker.record_failure(t0, &config);
        assert_eq!(tracker.next_delay(&config), Duration::from_secs(1));
        tracker.record_failure(t0, &config);
        assert_eq!(tracker.next_delay(&config), Duration::from_secs(2));
        tracker.record_failure(t0, &config);
        assert_eq!(tracker.next_delay(&config), Duration::from_secs(4));
        for _ in 0..10 {
            tracker.record_failure(t0, &config);
        }
        assert_eq!(tracker.next_delay(&config), config.backoff_cap);
    }

    #[test]
    fn three_failures_within_window_is_fatal() {
        let config = ReconcileConfig::default();
        let mut tracker = BackoffTracker::default();
        let t0 = Instant::now();
        let (_, fatal1) = tracker.record_failure(t0, &config);
        let (_, fatal2) = tracker.record_failure(t0, &config);
        let (_, fatal3) = tracker.record_failure(t0, &config);
        assert!(!fatal1);
        assert!(!fatal2);
        assert!(fatal3);
    }

    #[test]
    fn failures_outside_window_reset_the_count() {
        let config = ReconcileConfig {
            failure_window: Duration::from_millis(1),
            ..ReconcileConfig::default()
        };
        let mut tracker = BackoffTracker::default();
        let t0 = Instant::now();
        tracker.record_failure(t0, &config);
        let t1 = t0 + Duration::from_secs(1);
        let (count, fatal) = tracker.record_failure(t1, &config);
        assert_eq!(count, 1);
        assert!(!fatal);
    }
}
