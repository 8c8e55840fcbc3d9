/// Fires when a player's trailing failure run reaches the configured count.
///
/// The run is computed by the aggregator over the config's window and ends
/// at the most recent action: any success (or neutral action) at the tail
/// resets it, so old losses never fire this after a comeback.
use super::{RuleContext, TriggerRule};
use crate::stats::WindowStats;

pub const KEY: &str = "consecutive_failures";

pub struct ConsecutiveFailures;

impl TriggerRule for ConsecutiveFailures {
    fn kind(&self) -> &'static str {
        KEY
    }

    fn evaluate(&self, stats: &WindowStats, ctx: &RuleContext) -> bool {
        u64::from(stats.consecutive_failure_run) >= ctx.config.threshold as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support;

    #[test]
    fn fires_at_threshold() {
        let cfg = test_support::config(KEY, 3.0);
        let ctx = RuleContext { config: &cfg, now_ms: 1_000 };

        let mut stats = test_support::stats();
        stats.consecutive_failure_run = 3;
        assert!(ConsecutiveFailures.evaluate(&stats, &ctx));

        stats.consecutive_failure_run = 2;
        assert!(!ConsecutiveFailures.evaluate(&stats, &ctx));
    }

    #[test]
    fn reset_run_does_not_fire() {
        // [fail, fail, success] aggregates to run 0.
        let cfg = test_support::config(KEY, 3.0);
        let ctx = RuleContext { config: &cfg, now_ms: 1_000 };
        let stats = test_support::stats();
        assert!(!ConsecutiveFailures.evaluate(&stats, &ctx));
    }
}
