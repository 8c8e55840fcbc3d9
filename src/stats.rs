/// Rolling window statistics over a player's action history.
///
/// `WindowStats` is ephemeral: recomputed per evaluation, never persisted.
/// The aggregator is a pure function of stored data — same store contents,
/// same output.
use crate::{action::ActionRecord, error::EngineError, store::EventStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_start_ms: u64,
    pub window_end_ms:   u64,
    pub action_count:    u32,
    pub failure_count:   u32,
    /// failure_count / action_count; 0.0 when the window is empty.
    pub failure_rate:    f64,
    /// Most recent activity across ALL history (not just the window),
    /// falling back to the player's first-seen timestamp. `None` means the
    /// store has never heard of this player.
    pub last_action_timestamp_ms: Option<u64>,
    /// Trailing failures ending at the window's most recent action. Any
    /// non-failure at the tail resets the run to 0.
    pub consecutive_failure_run: u32,
}

/// How the engine obtains window stats. The production implementation is
/// `WindowAggregator`; tests substitute failing sources to exercise the
/// per-player isolation path.
pub trait StatsSource: Send + Sync {
    fn compute(
        &self,
        player_id: &str,
        now_ms: u64,
        window_seconds: u64,
    ) -> Result<WindowStats, EngineError>;
}

pub struct WindowAggregator {
    store: Arc<EventStore>,
}

impl WindowAggregator {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl StatsSource for WindowAggregator {
    fn compute(
        &self,
        player_id: &str,
        now_ms: u64,
        window_seconds: u64,
    ) -> Result<WindowStats, EngineError> {
        let window_ms = window_seconds * 1_000;
        let since = now_ms.saturating_sub(window_ms);
        let records = self.store.query(player_id, since, now_ms);

        let action_count = records.len() as u32;
        let failure_count = records.iter().filter(|r| r.is_failure()).count() as u32;
        let failure_rate = if action_count > 0 {
            f64::from(failure_count) / f64::from(action_count)
        } else {
            0.0
        };

        Ok(WindowStats {
            window_start_ms: since,
            window_end_ms:   now_ms,
            action_count,
            failure_count,
            failure_rate,
            last_action_timestamp_ms: self.store.last_activity_ms(player_id),
            consecutive_failure_run:  trailing_failure_run(&records),
        })
    }
}

/// Count failures from the most recent record backwards, stopping at the
/// first non-failure.
fn trailing_failure_run(records: &[ActionRecord]) -> u32 {
    records
        .iter()
        .rev()
        .take_while(|r| r.is_failure())
        .count() as u32
}
