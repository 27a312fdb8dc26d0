//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global config
//!
//! User-wide defaults, loaded from `~/.tasktree/config.toml` (or
//! `$XDG_CONFIG_HOME/tasktree/config.toml`, or `$TASKTREE_CONFIG`).
//!
//! # Store config
//!
//! Per-store overrides, loaded from `<store_root>/.tasktree/config.toml`.
//! Any field left unset falls back to the global config, then to a
//! built-in default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid retention_days: {0} (must be >= 1)")]
    InvalidRetention(u32),

    #[error("invalid sync provider '{0}', expected one of: {1:?}")]
    InvalidSyncProvider(String, &'static [&'static str]),
}

pub const VALID_SYNC_PROVIDERS: &[&str] = &["none", "webhook", "mock"];

/// User-wide defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Require `expected_target_id` whenever multiple roots are active,
    /// even for intents that would otherwise infer a single target.
    pub auto_strict_writes: Option<bool>,
    /// Days a soft-deleted file survives in `.trash/` before `auto-clean`
    /// removes it permanently.
    pub retention_days: Option<u32>,
    /// Default domain new roots are created under when the caller does
    /// not specify one.
    pub default_domain: Option<String>,
    /// Which [`crate::sync::SyncService`] implementation to dispatch
    /// lifecycle notifications to.
    pub sync_provider: Option<String>,
    pub interactive: Option<bool>,
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if let Some(days) = self.retention_days {
            if days == 0 {
                return Err(SchemaError::InvalidRetention(days));
            }
        }
        if let Some(provider) = &self.sync_provider {
            if !VALID_SYNC_PROVIDERS.contains(&provider.as_str()) {
                return Err(SchemaError::InvalidSyncProvider(provider.clone(), VALID_SYNC_PROVIDERS));
            }
        }
        Ok(())
    }
}

/// Per-store overrides of the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub auto_strict_writes: Option<bool>,
    pub retention_days: Option<u32>,
    pub default_domain: Option<String>,
    pub sync_provider: Option<String>,
    /// Maximum number of `.history.json` entries retained for undo.
    pub history_capacity: Option<usize>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if let Some(days) = self.retention_days {
            if days == 0 {
                return Err(SchemaError::InvalidRetention(days));
            }
        }
        if let Some(provider) = &self.sync_provider {
            if !VALID_SYNC_PROVIDERS.contains(&provider.as_str()) {
                return Err(SchemaError::InvalidSyncProvider(provider.clone(), VALID_SYNC_PROVIDERS));
            }
        }
        Ok(())
    }
}
