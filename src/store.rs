/// Append-only per-player action log.
///
/// One `DashMap` entry per player keeps appends for different players
/// independent while serializing appends for the same player (single-writer
/// per player is all the ordering guarantee callers get, and all they need).
///
/// Records are stored in insertion order; `query` sorts by timestamp with a
/// stable sort, so equal timestamps keep their insertion order.
use crate::{action::ActionRecord, error::EngineError};
use dashmap::DashMap;

/// Appends stamped further than this into the future are rejected.
/// Covers ordinary clock skew between event producers and this process.
const CLOCK_SKEW_TOLERANCE_MS: u64 = 5_000;

#[derive(Debug, Default)]
struct PlayerLog {
    records:        Vec<ActionRecord>,
    first_seen_ms:  u64,
    last_action_ms: u64,
}

#[derive(Debug, Default)]
pub struct EventStore {
    logs: DashMap<String, PlayerLog>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player before any action is recorded. Gives the inactivity
    /// rule a first-seen reference for players that have never acted.
    pub fn note_player(&self, player_id: &str, first_seen_ms: u64) {
        let mut log = self.logs.entry(player_id.to_owned()).or_default();
        if log.first_seen_ms == 0 {
            log.first_seen_ms = first_seen_ms;
        }
    }

    /// Append a record. Rejects records with an empty player id, a missing
    /// (zero) timestamp, or a timestamp beyond the clock-skew tolerance.
    pub fn append(&self, record: ActionRecord) -> Result<(), EngineError> {
        if record.player_id.is_empty() {
            return Err(EngineError::InvalidRecord("player_id is empty".into()));
        }
        if record.timestamp_ms == 0 {
            return Err(EngineError::InvalidRecord("timestamp is missing".into()));
        }
        let now = crate::unix_ms();
        if record.timestamp_ms > now + CLOCK_SKEW_TOLERANCE_MS {
            return Err(EngineError::InvalidRecord(format!(
                "timestamp {}ms is {}ms in the future",
                record.timestamp_ms,
                record.timestamp_ms - now
            )));
        }

        let mut log = self.logs.entry(record.player_id.clone()).or_default();
        if log.first_seen_ms == 0 {
            log.first_seen_ms = record.timestamp_ms;
        }
        log.last_action_ms = log.last_action_ms.max(record.timestamp_ms);
        log.records.push(record);
        Ok(())
    }

    /// Records with `since_ms <= timestamp < until_ms`, timestamp ascending,
    /// ties broken by insertion order. Returns an owned snapshot, safe to
    /// iterate repeatedly without holding any lock.
    pub fn query(&self, player_id: &str, since_ms: u64, until_ms: u64) -> Vec<ActionRecord> {
        let Some(log) = self.logs.get(player_id) else {
            return Vec::new();
        };
        let mut out: Vec<ActionRecord> = log
            .records
            .iter()
            .filter(|r| r.timestamp_ms >= since_ms && r.timestamp_ms < until_ms)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.timestamp_ms); // stable: preserves insertion order on ties
        out
    }

    /// Timestamp of the player's most recent action across all history,
    /// falling back to the first-seen timestamp for action-less players.
    /// `None` means the store has never heard of this player.
    pub fn last_activity_ms(&self, player_id: &str) -> Option<u64> {
        let log = self.logs.get(player_id)?;
        if log.last_action_ms > 0 {
            Some(log.last_action_ms)
        } else if log.first_seen_ms > 0 {
            Some(log.first_seen_ms)
        } else {
            None
        }
    }

    /// Players with at least one action at or after `cutoff_ms`. Backs the
    /// default active-player source for the engine cycle.
    pub fn players_active_since(&self, cutoff_ms: u64) -> Vec<String> {
        self.logs
            .iter()
            .filter(|entry| entry.value().last_action_ms >= cutoff_ms)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn record_count(&self, player_id: &str) -> usize {
        self.logs.get(player_id).map(|l| l.records.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionResult;

    fn rec(player: &str, ts: u64, result: ActionResult) -> ActionRecord {
        ActionRecord::new(player, "battle", result, ts)
    }

    #[test]
    fn rejects_empty_player_id() {
        let store = EventStore::new();
        let err = store.append(rec("", 1_000, ActionResult::Failure)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn rejects_missing_timestamp() {
        let store = EventStore::new();
        let err = store.append(rec("p1", 0, ActionResult::Failure)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn rejects_far_future_timestamp() {
        let store = EventStore::new();
        let future = crate::unix_ms() + 60_000;
        let err = store.append(rec("p1", future, ActionResult::Success)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRecord(_)));
    }

    #[test]
    fn query_is_half_open_and_ordered() {
        let store = EventStore::new();
        store.append(rec("p1", 3_000, ActionResult::Success)).unwrap();
        store.append(rec("p1", 1_000, ActionResult::Failure)).unwrap();
        store.append(rec("p1", 2_000, ActionResult::Failure)).unwrap();

        let got = store.query("p1", 1_000, 3_000);
        let times: Vec<u64> = got.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(times, vec![1_000, 2_000]); // 3_000 excluded (until is exclusive)
    }

    #[test]
    fn query_ties_keep_insertion_order() {
        let store = EventStore::new();
        let a = ActionRecord::new("p1", "first", ActionResult::Other, 5_000);
        let b = ActionRecord::new("p1", "second", ActionResult::Other, 5_000);
        store.append(a).unwrap();
        store.append(b).unwrap();

        let got = store.query("p1", 0, 10_000);
        assert_eq!(got[0].action_type, "first");
        assert_eq!(got[1].action_type, "second");
    }

    #[test]
    fn last_activity_falls_back_to_first_seen() {
        let store = EventStore::new();
        assert_eq!(store.last_activity_ms("ghost"), None);

        store.note_player("lurker", 7_000);
        assert_eq!(store.last_activity_ms("lurker"), Some(7_000));

        store.append(rec("lurker", 9_000, ActionResult::Success)).unwrap();
        assert_eq!(store.last_activity_ms("lurker"), Some(9_000));
    }

    #[test]
    fn active_players_filtered_by_cutoff() {
        let store = EventStore::new();
        store.append(rec("old", 1_000, ActionResult::Success)).unwrap();
        store.append(rec("fresh", 50_000, ActionResult::Failure)).unwrap();

        let mut active = store.players_active_since(10_000);
        active.sort();
        assert_eq!(active, vec!["fresh"]);
    }
}
