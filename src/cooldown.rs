/// Per (player, trigger) cooldown state — the only state that survives
/// across evaluation cycles.
///
/// `try_fire` is the sole mutation point. The DashMap entry API holds the
/// shard lock for the key while we check and record, so concurrent calls for
/// the same (player, trigger) pair serialize: exactly one caller observes
/// eligibility. Different keys land on different shards and do not contend.
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub player_id:        String,
    pub trigger_name:     String,
    pub last_fired_at_ms: u64,
}

#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: DashMap<(String, String), u64>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-set: if `now - last_fired >= cooldown` (no prior
    /// record counts as always eligible), record `now` and return true.
    /// Otherwise leave state unchanged and return false.
    pub fn try_fire(
        &self,
        player_id: &str,
        trigger_name: &str,
        now_ms: u64,
        cooldown_ms: u64,
    ) -> bool {
        let key = (player_id.to_owned(), trigger_name.to_owned());
        match self.last_fired.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(now_ms);
                true
            }
            Entry::Occupied(mut slot) => {
                if now_ms.saturating_sub(*slot.get()) >= cooldown_ms {
                    slot.insert(now_ms);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Administrative override: the next eligible evaluation fires
    /// immediately regardless of prior history.
    pub fn reset(&self, player_id: &str, trigger_name: &str) {
        self.last_fired
            .remove(&(player_id.to_owned(), trigger_name.to_owned()));
    }

    /// Clear every trigger's cooldown for one player.
    pub fn reset_player(&self, player_id: &str) {
        self.last_fired.retain(|(p, _), _| p != player_id);
    }

    /// Drop entries older than `cutoff_ms`. Bounds memory for long-running
    /// processes with player churn.
    pub fn purge_older_than(&self, cutoff_ms: u64) {
        self.last_fired.retain(|_, fired| *fired >= cutoff_ms);
    }

    /// Snapshot of all cooldown state, for observability and persistence.
    pub fn get_status(&self) -> Vec<CooldownEntry> {
        self.last_fired
            .iter()
            .map(|e| CooldownEntry {
                player_id:        e.key().0.clone(),
                trigger_name:     e.key().1.clone(),
                last_fired_at_ms: *e.value(),
            })
            .collect()
    }

    /// Restore state saved by a previous process (see the journal). Keeps
    /// the newer timestamp when an entry already exists.
    pub fn hydrate(&self, entries: impl IntoIterator<Item = CooldownEntry>) {
        for e in entries {
            self.last_fired
                .entry((e.player_id, e.trigger_name))
                .and_modify(|cur| *cur = (*cur).max(e.last_fired_at_ms))
                .or_insert(e.last_fired_at_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
