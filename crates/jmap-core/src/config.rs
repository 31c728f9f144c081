//! Engine configuration
//!
//! Supports loading from (in order of priority):
//! 1. Runtime environment variables
//! 2. JSON file in the shared Cosmos config directory

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "jmap-engine.json";

/// Tunables for the store-facing side of the engine. `table_name` is the
/// one required value; everything else has a spec-mandated default.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Name of the backing DynamoDB-style table (external collaborator,
    /// spec §1). This engine never opens the table itself — the value is
    /// passed through to whatever `Store` implementation the caller wires
    /// up — but it is still engine configuration, since retry and
    /// transaction-sizing logs are keyed off of it.
    pub table_name: String,

    #[serde(default = "default_retention_days")]
    pub change_log_retention_days: u32,

    #[serde(default = "default_thread_get_concurrency")]
    pub thread_get_concurrency: usize,

    #[serde(default = "default_keyword_retry_limit")]
    pub keyword_retry_limit: u32,

    #[serde(default = "default_destroy_retry_limit")]
    pub destroy_retry_limit: u32,

    /// Queue the blob store drains to actually delete orphaned blobs after
    /// an `Email/set destroy` (external collaborator, spec §1). `None`
    /// means the caller handles blob cleanup out of band.
    #[serde(default)]
    pub blob_delete_queue_url: Option<String>,
}

fn default_retention_days() -> u32 {
    7
}

fn default_thread_get_concurrency() -> usize {
    5
}

fn default_keyword_retry_limit() -> u32 {
    3
}

fn default_destroy_retry_limit() -> u32 {
    3
}

impl EngineConfig {
    /// Load configuration, preferring environment variables and falling
    /// back to `~/.config/cosmos/jmap-engine.json`.
    pub fn load() -> Result<Self> {
        if let Ok(table_name) = std::env::var("JMAP_TABLE_NAME") {
            return Ok(Self {
                table_name,
                change_log_retention_days: env_or_default(
                    "JMAP_CHANGE_LOG_RETENTION_DAYS",
                    default_retention_days(),
                ),
                thread_get_concurrency: env_or_default(
                    "JMAP_THREAD_GET_CONCURRENCY",
                    default_thread_get_concurrency(),
                ),
                keyword_retry_limit: env_or_default(
                    "JMAP_KEYWORD_RETRY_LIMIT",
                    default_keyword_retry_limit(),
                ),
                destroy_retry_limit: env_or_default(
                    "JMAP_DESTROY_RETRY_LIMIT",
                    default_destroy_retry_limit(),
                ),
                blob_delete_queue_url: std::env::var("JMAP_BLOB_DELETE_QUEUE_URL").ok(),
            });
        }

        config::load_json(CONFIG_FILE).context("no JMAP_TABLE_NAME set and no config file found")
    }
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_when_json_omits_them() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"table_name": "jmap-prod"}"#).unwrap();
        assert_eq!(cfg.table_name, "jmap-prod");
        assert_eq!(cfg.change_log_retention_days, 7);
        assert_eq!(cfg.thread_get_concurrency, 5);
        assert_eq!(cfg.keyword_retry_limit, 3);
        assert_eq!(cfg.destroy_retry_limit, 3);
        assert_eq!(cfg.blob_delete_queue_url, None);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"table_name": "t", "change_log_retention_days": 30, "thread_get_concurrency": 8}"#,
        )
        .unwrap();
        assert_eq!(cfg.change_log_retention_days, 30);
        assert_eq!(cfg.thread_get_concurrency, 8);
    }
}
