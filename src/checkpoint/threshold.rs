//! Checkpoint threshold policy
//!
//! Decides when `check_point_if_needed` actually writes a checkpoint: after
//! enough transactions have closed since the last one, or after enough time
//! has passed. Either condition alone is sufficient. Explicit requests
//! (`force_check_point`) bypass this policy entirely.

use std::time::Duration;

/// Checkpoint policy configuration.
///
/// Conservative defaults: frequent enough to bound recovery time, rare
/// enough to stay off the commit path.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Write a checkpoint once this many transactions closed since the last
    /// one.
    pub transaction_count_threshold: u64,
    /// Write a checkpoint once this much time passed since the last one,
    /// provided anything closed at all.
    pub interval: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            transaction_count_threshold: 10_000,
            interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Threshold evaluator over a [`CheckpointConfig`].
#[derive(Debug, Clone)]
pub struct CheckPointThreshold {
    config: CheckpointConfig,
}

impl CheckPointThreshold {
    pub fn new(config: CheckpointConfig) -> Self {
        Self { config }
    }

    /// True when a checkpoint should be written now.
    ///
    /// `transactions_since` is the number of transactions closed since the
    /// last checkpoint; `elapsed` the time since it. A threshold is never
    /// reached while nothing closed - checkpointing an unchanged store is
    /// pure overhead.
    pub fn is_reached(&self, transactions_since: u64, elapsed: Duration) -> bool {
        if transactions_since == 0 {
            return false;
        }
        transactions_since >= self.config.transaction_count_threshold
            || elapsed >= self.config.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(count: u64, interval_secs: u64) -> CheckPointThreshold {
        CheckPointThreshold::new(CheckpointConfig {
            transaction_count_threshold: count,
            interval: Duration::from_secs(interval_secs),
        })
    }

    #[test]
    fn test_not_reached_when_nothing_closed() {
        let t = threshold(1, 0);
        assert!(!t.is_reached(0, Duration::from_secs(3600)));
    }

    #[test]
    fn test_count_threshold() {
        let t = threshold(100, 3600);
        assert!(!t.is_reached(99, Duration::ZERO));
        assert!(t.is_reached(100, Duration::ZERO));
        assert!(t.is_reached(101, Duration::ZERO));
    }

    #[test]
    fn test_time_threshold() {
        let t = threshold(u64::MAX, 60);
        assert!(!t.is_reached(1, Duration::from_secs(59)));
        assert!(t.is_reached(1, Duration::from_secs(60)));
    }

    #[test]
    fn test_either_condition_suffices() {
        let t = threshold(10, 60);
        assert!(t.is_reached(10, Duration::ZERO));
        assert!(t.is_reached(1, Duration::from_secs(61)));
        assert!(!t.is_reached(9, Duration::from_secs(59)));
    }

    #[test]
    fn test_default_config_is_sane() {
        let config = CheckpointConfig::default();
        assert!(config.transaction_count_threshold > 0);
        assert!(config.interval > Duration::ZERO);
    }
}
