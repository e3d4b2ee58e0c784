//! Healing statistics, flaky-selector tracking and strategy health

use crate::config::FlakinessConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Aggregate counters since start or the last reset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealingStats {
    pub total_attempts: u64,
    pub successful_heals: u64,
    pub failed_heals: u64,
    pub cache_hits: u64,
    /// Attempts whose top candidate came from each strategy
    pub strategy_usage: BTreeMap<String, u64>,
    /// Running mean of top-candidate confidence over successful heals
    pub average_confidence: f64,
}

impl HealingStats {
    /// Fraction of attempts that healed
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_heals as f64 / self.total_attempts as f64
        }
    }
}

/// Thread-safe [`HealingStats`] accumulator
#[derive(Debug, Default)]
pub struct StatsRecorder {
    stats: Mutex<HealingStats>,
}

impl StatsRecorder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished attempt
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&self, healed_by: Option<(&str, f64)>, from_cache: bool) {
        let mut stats = self.stats.lock();
        stats.total_attempts += 1;
        if from_cache {
            stats.cache_hits += 1;
        }
        match healed_by {
            Some((strategy, confidence)) => {
                stats.successful_heals += 1;
                *stats.strategy_usage.entry(strategy.to_string()).or_default() += 1;
                let n = stats.successful_heals as f64;
                stats.average_confidence += (confidence - stats.average_confidence) / n;
            }
            None => stats.failed_heals += 1,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> HealingStats {
        self.stats.lock().clone()
    }

    pub fn reset(&self) {
        *self.stats.lock() = HealingStats::default();
    }
}

/// Outcome counts for one selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorHealth {
    pub successes: u64,
    pub failures: u64,
    pub flaky: bool,
}

impl SelectorHealth {
    #[must_use]
    pub fn observations(&self) -> u64 {
        self.successes + self.failures
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        match self.observations() {
            0 => 0.0,
            n => self.failures as f64 / n as f64,
        }
    }
}

/// Flags selectors that fail intermittently
///
/// Flaky means at least `min_observations` outcomes with a failure rate
/// strictly between `lower_rate` and `upper_rate`.
#[derive(Debug)]
pub struct FlakinessTracker {
    config: FlakinessConfig,
    selectors: DashMap<String, SelectorHealth>,
}

impl FlakinessTracker {
    #[must_use]
    pub fn new(config: FlakinessConfig) -> Self {
        Self {
            config,
            selectors: DashMap::new(),
        }
    }

    /// Record an outcome; returns whether the selector just became flaky
    pub fn record(&self, selector: &str, success: bool) -> bool {
        let mut health = self.selectors.entry(selector.to_string()).or_default();
        if success {
            health.successes += 1;
        } else {
            health.failures += 1;
        }
        let rate = health.failure_rate();
        let flaky = health.observations() >= self.config.min_observations
            && rate > self.config.lower_rate
            && rate < self.config.upper_rate;
        let became_flaky = flaky && !health.flaky;
        health.flaky = flaky;
        if became_flaky {
            warn!(selector, failure_rate = rate, "selector marked as flaky");
        }
        became_flaky
    }

    #[must_use]
    pub fn is_flaky(&self, selector: &str) -> bool {
        self.selectors.get(selector).is_some_and(|h| h.flaky)
    }

    #[must_use]
    pub fn health(&self, selector: &str) -> Option<SelectorHealth> {
        self.selectors.get(selector).map(|h| *h)
    }

    /// Currently flaky selectors, sorted
    #[must_use]
    pub fn flaky_selectors(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .selectors
            .iter()
            .filter(|e| e.value().flaky)
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Forget every recorded outcome
    pub fn clear(&self) {
        self.selectors.clear();
    }
}

/// Strategies taken out of rotation after an error
///
/// A strategy that fails (not one that times out) is skipped by later
/// attempts until it is reset.
#[derive(Debug, Default)]
pub struct StrategyHealth {
    unhealthy: DashMap<String, String>,
}

impl StrategyHealth {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unhealthy(&self, strategy: &str, reason: &str) {
        if self.unhealthy.insert(strategy.to_string(), reason.to_string()).is_none() {
            warn!(strategy, reason, "strategy marked unhealthy");
        }
    }

    #[must_use]
    pub fn is_healthy(&self, strategy: &str) -> bool {
        !self.unhealthy.contains_key(strategy)
    }

    /// Unhealthy strategies with the error that took them out, sorted
    #[must_use]
    pub fn unhealthy(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .unhealthy
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort();
        out
    }

    /// Put one strategy back into rotation; returns whether it was out
    pub fn reset(&self, strategy: &str) -> bool {
        self.unhealthy.remove(strategy).is_some()
    }

    pub fn reset_all(&self) {
        self.unhealthy.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_over_successes() {
        let recorder = StatsRecorder::new();
        recorder.record(Some(("data-testid-recovery", 0.9)), false);
        recorder.record(Some(("text-content-matching", 0.7)), true);
        recorder.record(None, false);

        let stats = recorder.snapshot();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.successful_heals, 2);
        assert_eq!(stats.failed_heals, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.strategy_usage["data-testid-recovery"], 1);
        assert!((stats.average_confidence - 0.8).abs() < 1e-9);

        recorder.reset();
        assert_eq!(recorder.snapshot(), HealingStats::default());
    }

    #[test]
    fn flaky_between_rates() {
        let tracker = FlakinessTracker::new(FlakinessConfig::default());
        // 2 failures of 5: 40%
        let outcomes = [true, false, true, false];
        for success in outcomes {
            assert!(!tracker.record("#cart", success));
        }
        assert!(tracker.record("#cart", true));
        assert!(tracker.is_flaky("#cart"));
        // already flaky, no second transition
        assert!(!tracker.record("#cart", false));
        assert_eq!(tracker.flaky_selectors(), vec!["#cart".to_string()]);

        tracker.clear();
        assert!(!tracker.is_flaky("#cart"));
        assert!(tracker.health("#cart").is_none());
    }

    #[test]
    fn always_failing_is_broken_not_flaky() {
        let tracker = FlakinessTracker::new(FlakinessConfig::default());
        for _ in 0..10 {
            tracker.record(".gone", false);
        }
        assert!(!tracker.is_flaky(".gone"));
        assert_eq!(tracker.health(".gone").unwrap().failure_rate(), 1.0);
    }

    #[test]
    fn failed_strategy_stays_out_until_reset() {
        let health = StrategyHealth::new();
        assert!(health.is_healthy("text-content-matching"));

        health.mark_unhealthy("text-content-matching", "index out of range");
        health.mark_unhealthy("data-testid-recovery", "boom");
        assert!(!health.is_healthy("text-content-matching"));
        assert_eq!(
            health.unhealthy(),
            vec![
                ("data-testid-recovery".to_string(), "boom".to_string()),
                ("text-content-matching".to_string(), "index out of range".to_string()),
            ]
        );

        assert!(health.reset("text-content-matching"));
        assert!(!health.reset("text-content-matching"));
        assert!(health.is_healthy("text-content-matching"));

        health.reset_all();
        assert!(health.unhealthy().is_empty());
    }
}
