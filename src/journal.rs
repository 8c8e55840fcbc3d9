/// SQLite journal: intervention history plus cooldown-state persistence.
///
/// Uses `rusqlite` with the `bundled` feature so SQLite is compiled in.
///
/// The writer runs on a dedicated `std::thread` (rusqlite::Connection is
/// !Send across await points) and receives commands via a bounded sync
/// channel. Callers hold a cheap `JournalWriter` handle that is
/// Clone + Send + Sync. Reads open their own short-lived read-only
/// connection so the writer thread is never blocked.
///
/// The engine core never touches this module — it plugs in as an
/// intervention handler, and cooldown state flows through
/// `save_cooldowns` / `load_cooldowns` at shutdown / startup.
use crate::{
    cooldown::CooldownEntry,
    engine::{InterventionEvent, InterventionHandler},
};
use anyhow::Result;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Commands sent to the writer thread
// ---------------------------------------------------------------------------

enum JournalCommand {
    RecordIntervention {
        event_id:     String,
        player_id:    String,
        trigger_name: String,
        trigger_type: String,
        fired_at_ms:  u64,
        context_json: String,
    },
    SaveCooldowns {
        reply:   oneshot::Sender<Result<()>>,
        entries: Vec<CooldownEntry>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// JournalWriter — cheap handle, Clone + Send + Sync
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JournalWriter {
    tx: std::sync::mpsc::SyncSender<JournalCommand>,
}

impl JournalWriter {
    /// Append an intervention row (fire-and-forget).
    pub fn record_intervention(&self, event: &InterventionEvent) {
        let context_json = serde_json::to_string(&event.context).unwrap_or_default();
        let _ = self.tx.send(JournalCommand::RecordIntervention {
            event_id:     event.event_id.clone(),
            player_id:    event.player_id.clone(),
            trigger_name: event.trigger_name.clone(),
            trigger_type: event.trigger_type.clone(),
            fired_at_ms:  event.fired_at_ms,
            context_json,
        });
    }

    /// Replace the persisted cooldown snapshot. Commands drain in order, so
    /// awaiting this also confirms all previously queued writes landed.
    pub async fn save_cooldowns(&self, entries: Vec<CooldownEntry>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(JournalCommand::SaveCooldowns { reply: reply_tx, entries })
            .map_err(|_| anyhow::anyhow!("Journal writer channel closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Journal reply channel closed"))?
    }

    /// Ask the writer thread to exit after draining queued commands.
    pub fn shutdown(&self) {
        let _ = self.tx.send(JournalCommand::Shutdown);
    }
}

/// Intervention handler that journals every fired event.
pub struct JournalHandler {
    writer: JournalWriter,
}

impl JournalHandler {
    pub fn new(writer: JournalWriter) -> Self {
        Self { writer }
    }
}

impl InterventionHandler for JournalHandler {
    fn handle(&self, event: &InterventionEvent) -> Result<()> {
        self.writer.record_intervention(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// spawn_journal_writer — initialises SQLite and starts the writer thread
// ---------------------------------------------------------------------------

pub fn spawn_journal_writer(db_path: &Path) -> Result<JournalWriter> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    apply_schema(&conn)?;

    let (tx, rx) = std::sync::mpsc::sync_channel::<JournalCommand>(512);
    std::thread::spawn(move || journal_writer_loop(rx, conn));

    tracing::info!("Journal writer started at {:?}", db_path);
    Ok(JournalWriter { tx })
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous  = NORMAL;

        CREATE TABLE IF NOT EXISTS interventions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id     TEXT    NOT NULL,
            player_id    TEXT    NOT NULL,
            trigger_name TEXT    NOT NULL,
            trigger_type TEXT    NOT NULL,
            fired_at     INTEGER NOT NULL,
            context      TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cooldowns (
            player_id     TEXT    NOT NULL,
            trigger_name  TEXT    NOT NULL,
            last_fired_at INTEGER NOT NULL,
            PRIMARY KEY (player_id, trigger_name)
        );

        CREATE INDEX IF NOT EXISTS idx_interventions_player  ON interventions(player_id);
        CREATE INDEX IF NOT EXISTS idx_interventions_trigger ON interventions(trigger_name);
    ",
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writer loop (runs on its own std::thread)
// ---------------------------------------------------------------------------

fn journal_writer_loop(rx: std::sync::mpsc::Receiver<JournalCommand>, mut conn: Connection) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            JournalCommand::RecordIntervention {
                event_id,
                player_id,
                trigger_name,
                trigger_type,
                fired_at_ms,
                context_json,
            } => {
                if let Err(e) = conn.execute(
                    "INSERT INTO interventions (event_id, player_id, trigger_name, trigger_type, fired_at, context) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![event_id, player_id, trigger_name, trigger_type, fired_at_ms, context_json],
                ) {
                    tracing::warn!("Journal record_intervention error: {}", e);
                }
            }

            JournalCommand::SaveCooldowns { reply, entries } => {
                let result = save_cooldowns_tx(&mut conn, &entries);
                let _ = reply.send(result);
            }

            JournalCommand::Shutdown => break,
        }
    }
}

fn save_cooldowns_tx(conn: &mut Connection, entries: &[CooldownEntry]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cooldowns", [])?;
    for e in entries {
        tx.execute(
            "INSERT OR REPLACE INTO cooldowns (player_id, trigger_name, last_fired_at) VALUES (?1, ?2, ?3)",
            params![e.player_id, e.trigger_name, e.last_fired_at_ms],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-side queries (own short-lived connections)
// ---------------------------------------------------------------------------

/// One journalled intervention row.
#[derive(Debug, Clone)]
pub struct InterventionRow {
    pub event_id:     String,
    pub player_id:    String,
    pub trigger_name: String,
    pub trigger_type: String,
    pub fired_at_ms:  u64,
}

/// The most recent `limit` interventions, newest first.
pub fn recent_interventions(db_path: &Path, limit: u32) -> Result<Vec<InterventionRow>> {
    let conn = open_read_only(db_path)?;
    let mut stmt = conn.prepare(
        "SELECT event_id, player_id, trigger_name, trigger_type, fired_at \
         FROM interventions ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        Ok(InterventionRow {
            event_id:     row.get(0)?,
            player_id:    row.get(1)?,
            trigger_name: row.get(2)?,
            trigger_type: row.get(3)?,
            fired_at_ms:  row.get::<_, i64>(4)? as u64,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Cooldown snapshot from a previous run, for `CooldownTracker::hydrate`.
pub fn load_cooldowns(db_path: &Path) -> Result<Vec<CooldownEntry>> {
    if !db_path.exists() {
        return Ok(Vec::new());
    }
    let conn = open_read_only(db_path)?;
    let mut stmt =
        conn.prepare("SELECT player_id, trigger_name, last_fired_at FROM cooldowns")?;
    let rows = stmt.query_map([], |row| {
        Ok(CooldownEntry {
            player_id:        row.get(0)?,
            trigger_name:     row.get(1)?,
            last_fired_at_ms: row.get::<_, i64>(2)? as u64,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

fn open_read_only(db_path: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::CooldownTracker;
    use crate::stats::WindowStats;
    use tempfile::tempdir;

    fn sample_event(player: &str, trigger: &str, fired_at_ms: u64) -> InterventionEvent {
        InterventionEvent {
            event_id:     format!("{player}_{trigger}_{fired_at_ms}"),
            player_id:    player.to_owned(),
            trigger_name: trigger.to_owned(),
            trigger_type: "consecutive_failures".to_owned(),
            fired_at_ms,
            context: WindowStats {
                window_start_ms:          0,
                window_end_ms:            fired_at_ms,
                action_count:             3,
                failure_count:            3,
                failure_rate:             1.0,
                last_action_timestamp_ms: Some(fired_at_ms),
                consecutive_failure_run:  3,
            },
        }
    }

    #[tokio::test]
    async fn journals_interventions() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("pulse.sqlite");

        let writer = spawn_journal_writer(&db).unwrap();
        let handler = JournalHandler::new(writer.clone());
        handler.handle(&sample_event("p1", "defeats", 10_000)).unwrap();
        handler.handle(&sample_event("p2", "gone_quiet", 20_000)).unwrap();

        // Awaiting a cooldown save flushes the FIFO queue.
        writer.save_cooldowns(Vec::new()).await.unwrap();

        let rows = recent_interventions(&db, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].player_id, "p2"); // newest first
        assert_eq!(rows[1].trigger_name, "defeats");
    }

    #[tokio::test]
    async fn cooldowns_survive_a_restart() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("pulse.sqlite");

        let tracker = CooldownTracker::new();
        tracker.try_fire("p1", "defeats", 50_000, 3_600_000);
        tracker.try_fire("p2", "gone_quiet", 60_000, 3_600_000);

        let writer = spawn_journal_writer(&db).unwrap();
        writer.save_cooldowns(tracker.get_status()).await.unwrap();
        writer.shutdown();

        let restored = CooldownTracker::new();
        restored.hydrate(load_cooldowns(&db).unwrap());
        assert_eq!(restored.len(), 2);
        // Still cooling down after the "restart".
        assert!(!restored.try_fire("p1", "defeats", 51_000, 3_600_000));
        assert!(restored.try_fire("p1", "defeats", 50_000 + 3_600_000, 3_600_000));
    }

    #[test]
    fn load_cooldowns_from_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let entries = load_cooldowns(&dir.path().join("absent.sqlite")).unwrap();
        assert!(entries.is_empty());
    }
}
