/// Fires when the window's failure rate reaches the threshold AND the
/// window holds enough actions to mean something.
///
/// `min_actions` comes from `extra_params` (default 10). A window below the
/// floor — including an empty one — is insufficient data, never an error.
use super::{RuleContext, TriggerRule};
use crate::stats::WindowStats;

pub const KEY: &str = "high_failure_rate";

const DEFAULT_MIN_ACTIONS: u64 = 10;

pub struct HighFailureRate;

impl TriggerRule for HighFailureRate {
    fn kind(&self) -> &'static str {
        KEY
    }

    fn evaluate(&self, stats: &WindowStats, ctx: &RuleContext) -> bool {
        let min_actions = ctx
            .config
            .param_u64("min_actions")
            .unwrap_or(DEFAULT_MIN_ACTIONS);
        u64::from(stats.action_count) >= min_actions && stats.failure_rate >= ctx.config.threshold
    }
}
