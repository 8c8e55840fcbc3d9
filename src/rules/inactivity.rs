/// Fires when a player has been silent for at least `threshold` seconds.
///
/// The reference point is the player's most recent activity across all
/// history (the aggregator falls back to first-seen for players that have
/// never acted), so this fires even with an empty window. Players the store
/// has never heard of do not fire.
use super::{RuleContext, TriggerRule};
use crate::stats::WindowStats;

pub const KEY: &str = "inactivity";

pub struct Inactivity;

impl TriggerRule for Inactivity {
    fn kind(&self) -> &'static str {
        KEY
    }

    fn evaluate(&self, stats: &WindowStats, ctx: &RuleContext) -> bool {
        let Some(last_ms) = stats.last_action_timestamp_ms else {
            return false;
        };
        let threshold_ms = (ctx.config.threshold * 1_000.0) as u64;
        ctx.now_ms.saturating_sub(last_ms) >= threshold_ms
    }
}
