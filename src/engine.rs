/// Trigger evaluation engine — the "brain" of the pipeline.
///
/// Each cycle: pull the active player set, compute window stats per enabled
/// trigger config, dispatch to the rule registry, gate fires through the
/// cooldown tracker, and hand resulting intervention events to registered
/// handlers.
///
/// `run_cycle` and `check_triggers` are synchronous and take `&self`, so
/// on-demand checks may run concurrently with the background loop; all
/// shared state is behind the cooldown tracker's atomic `try_fire`.
use crate::{
    config::EngineConfig,
    cooldown::CooldownTracker,
    error::EngineError,
    rules::{RuleContext, RuleRegistry},
    stats::{StatsSource, WindowAggregator, WindowStats},
    store::EventStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The decision output: "an intervention should happen for this player now".
/// Delivery (message text, mail transport) belongs to the handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub event_id:     String,
    pub player_id:    String,
    pub trigger_name: String,
    pub trigger_type: String,
    pub fired_at_ms:  u64,
    /// Stats snapshot that satisfied the rule, for downstream context.
    pub context:      WindowStats,
}

/// External delivery hook. Failures are reported and swallowed — the fire
/// already counted against the cooldown, so delivery is at-most-once.
pub trait InterventionHandler: Send + Sync {
    fn handle(&self, event: &InterventionEvent) -> anyhow::Result<()>;
}

/// Supplies the player ids to evaluate each cycle. The engine does not
/// discover players itself.
pub trait PlayerSource: Send + Sync {
    fn active_players(&self, now_ms: u64) -> Vec<String>;
}

/// Default source: players with at least one action inside the lookback.
pub struct RecentActivitySource {
    store:       Arc<EventStore>,
    lookback_ms: u64,
}

impl RecentActivitySource {
    pub fn new(store: Arc<EventStore>, lookback_seconds: u64) -> Self {
        Self { store, lookback_ms: lookback_seconds * 1_000 }
    }
}

impl PlayerSource for RecentActivitySource {
    fn active_players(&self, now_ms: u64) -> Vec<String> {
        self.store
            .players_active_since(now_ms.saturating_sub(self.lookback_ms))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running:               bool,
    pub enabled_trigger_count: usize,
    pub last_cycle_at_ms:      Option<u64>,
    pub total_cycles:          u64,
    pub total_fired:           u64,
    /// Per-player data access failures skipped over so far.
    pub data_errors:           u64,
}

// ---------------------------------------------------------------------------
// TriggerEngine
// ---------------------------------------------------------------------------

struct Runner {
    shutdown_tx: watch::Sender<bool>,
    task:        JoinHandle<()>,
}

pub struct TriggerEngine {
    config:    EngineConfig,
    stats:     Arc<dyn StatsSource>,
    cooldowns: Arc<CooldownTracker>,
    registry:  RuleRegistry,
    players:   Arc<dyn PlayerSource>,
    handlers:  RwLock<HashMap<String, Vec<Arc<dyn InterventionHandler>>>>,

    running:          AtomicBool,
    total_cycles:     AtomicU64,
    total_fired:      AtomicU64,
    data_errors:      AtomicU64,
    last_cycle_at_ms: AtomicU64, // 0 = never

    runner: tokio::sync::Mutex<Option<Runner>>,
}

impl TriggerEngine {
    pub fn new(
        config: EngineConfig,
        stats: Arc<dyn StatsSource>,
        cooldowns: Arc<CooldownTracker>,
        registry: RuleRegistry,
        players: Arc<dyn PlayerSource>,
    ) -> Self {
        tracing::info!(
            "Trigger engine initialised: {} configs, {} rules",
            config.triggers.len(),
            registry.len()
        );
        Self {
            config,
            stats,
            cooldowns,
            registry,
            players,
            handlers:         RwLock::new(HashMap::new()),
            running:          AtomicBool::new(false),
            total_cycles:     AtomicU64::new(0),
            total_fired:      AtomicU64::new(0),
            data_errors:      AtomicU64::new(0),
            last_cycle_at_ms: AtomicU64::new(0),
            runner:           tokio::sync::Mutex::new(None),
        }
    }

    /// Wire the standard pipeline around an `EventStore`: window aggregator
    /// for stats, recent-activity player source, built-in rule set.
    pub fn with_store(
        config: EngineConfig,
        store: Arc<EventStore>,
        cooldowns: Arc<CooldownTracker>,
    ) -> Self {
        let lookback = config.activity_lookback_seconds;
        Self::new(
            config,
            Arc::new(WindowAggregator::new(Arc::clone(&store))),
            cooldowns,
            RuleRegistry::with_builtins(),
            Arc::new(RecentActivitySource::new(store, lookback)),
        )
    }

    pub fn register_handler(&self, trigger_type: &str, handler: Arc<dyn InterventionHandler>) {
        // Registration only ever appends, so a poisoned map is still whole.
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(trigger_type.to_owned()).or_default().push(handler);
        tracing::debug!("Handler registered for trigger type '{}'", trigger_type);
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate every enabled trigger for every active player. A data
    /// problem for one player is logged and skipped; the cycle continues.
    pub fn run_cycle(&self, now_ms: u64) -> Vec<InterventionEvent> {
        let players = self.players.active_players(now_ms);
        tracing::debug!("Cycle start: {} active players", players.len());

        let mut fired = Vec::new();
        for player_id in &players {
            fired.extend(self.check_triggers(player_id, now_ms));
        }

        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at_ms.store(now_ms, Ordering::Relaxed);
        if !fired.is_empty() {
            tracing::info!("Cycle fired {} intervention(s)", fired.len());
        }
        fired
    }

    /// Targeted single-player variant for on-demand checks. Same cooldown
    /// gating and handler dispatch as the background cycle.
    pub fn check_triggers(&self, player_id: &str, now_ms: u64) -> Vec<InterventionEvent> {
        let mut fired = Vec::new();

        for cfg in self.config.triggers.iter().filter(|c| c.enabled) {
            let Some(rule) = self.registry.get(&cfg.trigger_type) else {
                tracing::warn!(
                    "No rule registered for trigger type '{}' (config '{}')",
                    cfg.trigger_type,
                    cfg.name
                );
                continue;
            };

            let stats = match self.stats.compute(player_id, now_ms, cfg.time_window_seconds) {
                Ok(stats) => stats,
                Err(e) => {
                    self.data_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Skipping '{}' for player {}: {}", cfg.name, player_id, e);
                    continue;
                }
            };

            let ctx = RuleContext { config: cfg, now_ms };
            if !rule.evaluate(&stats, &ctx) {
                continue;
            }

            // Sole mutation point for cooldown state: exactly one concurrent
            // caller per (player, trigger) key gets through.
            if !self.cooldowns.try_fire(player_id, &cfg.name, now_ms, cfg.cooldown_ms()) {
                tracing::debug!("'{}' suppressed by cooldown for {}", cfg.name, player_id);
                continue;
            }

            let event = InterventionEvent {
                event_id:     format!("{}_{}_{}", player_id, cfg.name, now_ms),
                player_id:    player_id.to_owned(),
                trigger_name: cfg.name.clone(),
                trigger_type: cfg.trigger_type.clone(),
                fired_at_ms:  now_ms,
                context:      stats,
            };

            tracing::info!(
                "Intervention: player={} trigger={} type={}",
                player_id,
                cfg.name,
                cfg.trigger_type
            );
            self.dispatch(&event);
            self.total_fired.fetch_add(1, Ordering::Relaxed);
            fired.push(event);
        }

        fired
    }

    /// At-most-once delivery: a handler failure is logged and never retried,
    /// and never rolls back the cooldown fire.
    fn dispatch(&self, event: &InterventionEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let Some(list) = handlers.get(&event.trigger_type) else {
            return;
        };
        for handler in list {
            if let Err(e) = handler.handle(event) {
                let err = EngineError::Handler {
                    trigger: event.trigger_name.clone(),
                    message: e.to_string(),
                };
                tracing::error!("{}", err);
            }
        }
    }

    pub fn get_status(&self) -> EngineStatus {
        let last = self.last_cycle_at_ms.load(Ordering::Relaxed);
        EngineStatus {
            running:               self.running.load(Ordering::Relaxed),
            enabled_trigger_count: self.config.triggers.iter().filter(|c| c.enabled).count(),
            last_cycle_at_ms:      (last > 0).then_some(last),
            total_cycles:          self.total_cycles.load(Ordering::Relaxed),
            total_fired:           self.total_fired.load(Ordering::Relaxed),
            data_errors:           self.data_errors.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Background scheduling loop
    // -----------------------------------------------------------------------

    /// Start the recurring evaluation loop. Calling while already running is
    /// a warn-and-return no-op. Must be called from within a tokio runtime.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            tracing::warn!("Trigger engine already running");
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let interval = Duration::from_secs(self.config.check_interval_seconds.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!("Engine loop started, interval {:?}", interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // The cycle body has no await points, so once a tick
                        // lands the cycle always runs to completion even
                        // across an abort.
                        engine.run_cycle(crate::unix_ms());
                    }
                }
            }
            tracing::info!("Engine loop stopped");
        });

        *runner = Some(Runner { shutdown_tx, task });
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Signal the loop to stop and wait up to the configured grace period
    /// for an in-flight cycle. Returns true for a clean shutdown, false if
    /// the grace period expired and the loop task was cancelled.
    pub async fn stop(&self) -> bool {
        let Some(runner) = self.runner.lock().await.take() else {
            return true; // not running
        };
        let _ = runner.shutdown_tx.send(true);

        let grace = Duration::from_secs(self.config.shutdown_grace_seconds.max(1));
        let mut task = runner.task;
        let clean = match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                task.abort();
                tracing::warn!("Engine loop did not stop within {:?} — cycle cancelled, reported incomplete", grace);
                false
            }
        };
        self.running.store(false, Ordering::Relaxed);
        clean
    }
}
