/// Engine and trigger configuration — persisted as TOML.
///
/// A config file looks like:
///
/// ```toml
/// check_interval_seconds = 30
/// shutdown_grace_seconds = 5
///
/// [[triggers]]
/// name                = "repeated_defeats"
/// trigger_type        = "consecutive_failures"
/// threshold           = 3.0
/// time_window_seconds = 1800
/// cooldown_seconds    = 3600
/// enabled             = true
/// ```
///
/// Loaded once at startup; the engine treats the trigger set as read-only
/// for the process lifetime.
use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Unique trigger name — the cooldown key alongside the player id.
    pub name: String,
    /// Rule variant to dispatch through the registry, e.g. "inactivity".
    pub trigger_type: String,
    /// Meaning depends on the variant: a count for consecutive_failures,
    /// seconds for inactivity, a 0..=1 rate for high_failure_rate.
    pub threshold: f64,
    #[serde(default = "default_window_seconds")]
    pub time_window_seconds: u64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Variant-specific numeric knobs, e.g. min_actions for high_failure_rate.
    #[serde(default)]
    pub extra_params: HashMap<String, f64>,
}

fn default_window_seconds() -> u64 { 3_600 }
fn default_cooldown_seconds() -> u64 { 3_600 }
fn default_enabled() -> bool { true }

impl TriggerConfig {
    pub fn time_window_ms(&self) -> u64 {
        self.time_window_seconds * 1_000
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_seconds * 1_000
    }

    /// Read an extra param as an integer count, e.g. `min_actions`.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.extra_params.get(key).map(|v| *v as u64)
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between background evaluation cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// How long `stop()` waits for an in-flight cycle before cancelling it.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    /// Players with activity inside this lookback count as active for a cycle.
    #[serde(default = "default_activity_lookback")]
    pub activity_lookback_seconds: u64,

    #[serde(default = "default_triggers")]
    pub triggers: Vec<TriggerConfig>,
}

fn default_check_interval() -> u64 { 30 }
fn default_shutdown_grace() -> u64 { 5 }
fn default_activity_lookback() -> u64 { 3_600 }
fn default_triggers() -> Vec<TriggerConfig> {
    DEFAULT_TRIGGERS.clone()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds:    default_check_interval(),
            shutdown_grace_seconds:    default_shutdown_grace(),
            activity_lookback_seconds: default_activity_lookback(),
            triggers:                  default_triggers(),
        }
    }
}

/// Built-in trigger set, mirroring the deployed defaults.
pub static DEFAULT_TRIGGERS: Lazy<Vec<TriggerConfig>> = Lazy::new(|| {
    vec![
        TriggerConfig {
            name:                "repeated_defeats".to_owned(),
            trigger_type:        crate::rules::consecutive_failures::KEY.to_owned(),
            threshold:           3.0,
            time_window_seconds: 1_800,
            cooldown_seconds:    3_600,
            enabled:             true,
            extra_params:        HashMap::new(),
        },
        TriggerConfig {
            name:                "gone_quiet".to_owned(),
            trigger_type:        crate::rules::inactivity::KEY.to_owned(),
            threshold:           1_800.0,
            time_window_seconds: 3_600,
            cooldown_seconds:    21_600,
            enabled:             true,
            extra_params:        HashMap::new(),
        },
        TriggerConfig {
            name:                "losing_streak_rate".to_owned(),
            trigger_type:        crate::rules::high_failure_rate::KEY.to_owned(),
            threshold:           0.8,
            time_window_seconds: 3_600,
            cooldown_seconds:    7_200,
            enabled:             true,
            extra_params:        HashMap::from([("min_actions".to_owned(), 10.0)]),
        },
    ]
});

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(path: &Path) -> Result<EngineConfig> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(EngineConfig::default())
    }
}

pub fn save(config: &EngineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(path, raw)?;
    Ok(())
}
