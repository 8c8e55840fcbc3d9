//! Trigger & behavior analysis engine for player action streams.
//!
//! Pipeline: actions are appended to the [`store::EventStore`], the
//! [`engine::TriggerEngine`] periodically aggregates rolling window stats
//! per player ([`stats::WindowAggregator`]), evaluates the configured
//! trigger rules ([`rules::RuleRegistry`]), gates fires through per
//! (player, trigger) cooldowns ([`cooldown::CooldownTracker`]), and hands
//! [`engine::InterventionEvent`]s to registered handlers.
//!
//! Message generation and delivery are external concerns behind the
//! [`engine::InterventionHandler`] trait.

pub mod action;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod journal;
pub mod rules;
pub mod stats;
pub mod store;

pub use action::{ActionRecord, ActionResult};
pub use config::{EngineConfig, TriggerConfig};
pub use cooldown::{CooldownEntry, CooldownTracker};
pub use engine::{
    EngineStatus, InterventionEvent, InterventionHandler, PlayerSource, RecentActivitySource,
    TriggerEngine,
};
pub use error::EngineError;
pub use rules::{RuleContext, RuleRegistry, TriggerRule};
pub use stats::{StatsSource, WindowAggregator, WindowStats};
pub use store::EventStore;

/// Current wall-clock time as Unix epoch milliseconds.
pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call more than
/// once; later calls are no-ops. Binaries embedding the engine may prefer
/// their own subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
