/// Typed player action records — the input side of the pipeline.
///
/// An `ActionRecord` is immutable once appended to the `EventStore`.
/// `attributes` carries game-specific detail (target, location, amounts)
/// that the core never interprets; rules see only aggregated stats.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failure,
    /// Neutral outcomes (chat, login, menu navigation). Breaks a failure run
    /// without counting as a success.
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub player_id:    String,
    /// Free-form action kind, e.g. "attack_city", "battle_lose", "chat_world".
    pub action_type:  String,
    pub result:       ActionResult,
    /// Unix epoch milliseconds. Zero means "not set" and is rejected on append.
    pub timestamp_ms: u64,
    #[serde(default)]
    pub attributes:   HashMap<String, serde_json::Value>,
}

impl ActionRecord {
    pub fn new(
        player_id: impl Into<String>,
        action_type: impl Into<String>,
        result: ActionResult,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            player_id:   player_id.into(),
            action_type: action_type.into(),
            result,
            timestamp_ms,
            attributes:  HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.result == ActionResult::Failure
    }
}
