/// Error taxonomy for the trigger engine.
///
/// Within an evaluation cycle nothing is fatal: `DataAccess` is isolated to
/// the affected player and `Handler` failures are swallowed after reporting.
/// Only lifecycle calls (`start`) surface errors to the caller.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A malformed record was handed to `EventStore::append`. The record is
    /// rejected and not stored.
    #[error("invalid action record: {0}")]
    InvalidRecord(String),

    /// Reading or aggregating one player's history failed. The cycle
    /// continues with the remaining players.
    #[error("data access failed for player '{player_id}': {message}")]
    DataAccess { player_id: String, message: String },

    /// An intervention handler failed. The fire already counted against the
    /// cooldown; delivery is at-most-once.
    #[error("handler for trigger '{trigger}' failed: {message}")]
    Handler { trigger: String, message: String },

    /// The scheduling loop could not be started.
    #[error("failed to start engine loop: {0}")]
    Startup(String),
}
