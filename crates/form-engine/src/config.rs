use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tunables for a resolution cycle. Every field has a default so an empty
/// config (`{}` or `""`) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Quiet window, in milliseconds, before the scheduler re-checks stage
    /// completion after a burst of hook activity.
    pub debounce_ms: u64,
    /// Value used when a `hidden` expression fails to evaluate.
    pub hidden_default: bool,
    /// Value used when a `required` expression fails to evaluate.
    pub required_default: bool,
    /// Value used when a `readOnly` expression fails to evaluate.
    pub read_only_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 4,
            hidden_default: false,
            required_default: false,
            read_only_default: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(config_json: &str) -> Result<Self, EngineError> {
        if config_json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(config_json).map_err(EngineError::Config)
    }
}
