//! Cache key types

use serde::{Deserialize, Serialize};

/// One cache key as observed at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default = "default_type")]
    pub key_type: String,
    /// Remaining time to live in seconds. On writes, 0 means no expiry.
    #[serde(default)]
    pub ttl: i64,
    /// Master address the key was read from (cluster mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

fn default_type() -> String {
    "string".to_string()
}

impl RedisEntry {
    pub fn tagged(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// Query string for `GET /redis/keys`
#[derive(Debug, Clone, Deserialize)]
pub struct KeyPattern {
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for KeyPattern {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

fn default_pattern() -> String {
    "*".to_string()
}
