pub mod consecutive_failures;
pub mod high_failure_rate;
pub mod inactivity;

use crate::{config::TriggerConfig, stats::WindowStats};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only context passed to every rule evaluation.
pub struct RuleContext<'a> {
    pub config: &'a TriggerConfig,
    pub now_ms: u64,
}

/// A trigger rule: a pure predicate over window stats plus config.
/// Stateless per evaluation, no side effects. New variants plug into the
/// registry without touching the engine.
pub trait TriggerRule: Send + Sync {
    /// The `trigger_type` string this rule is dispatched under.
    fn kind(&self) -> &'static str;

    fn evaluate(&self, stats: &WindowStats, ctx: &RuleContext) -> bool;
}

/// Rule lookup keyed by `trigger_type`. The engine consults this once per
/// (player, config) evaluation.
#[derive(Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn TriggerRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the three built-in variants.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(consecutive_failures::ConsecutiveFailures));
        reg.register(Arc::new(inactivity::Inactivity));
        reg.register(Arc::new(high_failure_rate::HighFailureRate));
        reg
    }

    /// Later registrations under the same kind replace earlier ones.
    pub fn register(&mut self, rule: Arc<dyn TriggerRule>) {
        let kind = rule.kind().to_owned();
        if self.rules.insert(kind.clone(), rule).is_some() {
            tracing::debug!("Rule '{}' replaced in registry", kind);
        }
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn TriggerRule>> {
        self.rules.get(kind)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::TriggerConfig;
    use crate::stats::WindowStats;
    use std::collections::HashMap;

    pub fn config(trigger_type: &str, threshold: f64) -> TriggerConfig {
        TriggerConfig {
            name:                format!("test_{trigger_type}"),
            trigger_type:        trigger_type.to_owned(),
            threshold,
            time_window_seconds: 3_600,
            cooldown_seconds:    3_600,
            enabled:             true,
            extra_params:        HashMap::new(),
        }
    }

    pub fn stats() -> WindowStats {
        WindowStats {
            window_start_ms:          0,
            window_end_ms:            3_600_000,
            action_count:             0,
            failure_count:            0,
            failure_rate:             0.0,
            last_action_timestamp_ms: None,
            consecutive_failure_run:  0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let reg = RuleRegistry::with_builtins();
        assert_eq!(reg.len(), 3);
        assert!(reg.get(consecutive_failures::KEY).is_some());
        assert!(reg.get(inactivity::KEY).is_some());
        assert!(reg.get(high_failure_rate::KEY).is_some());
        assert!(reg.get("unknown_kind").is_none());
    }

    #[test]
    fn custom_rule_can_be_registered() {
        struct AlwaysFires;
        impl TriggerRule for AlwaysFires {
            fn kind(&self) -> &'static str {
                "always"
            }
            fn evaluate(&self, _: &crate::stats::WindowStats, _: &RuleContext) -> bool {
                true
            }
        }

        let mut reg = RuleRegistry::with_builtins();
        reg.register(Arc::new(AlwaysFires));
        assert_eq!(reg.len(), 4);

        let cfg = test_support::config("always", 0.0);
        let ctx = RuleContext { config: &cfg, now_ms: 1_000 };
        assert!(reg.get("always").unwrap().evaluate(&test_support::stats(), &ctx));
    }
}
