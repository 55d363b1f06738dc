//! Configuration for the module registry
//!
//! Handles registry tuning, persistence wiring, and logging configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Module registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path for the JSON state snapshot (None = in-memory only unless a
    /// store is supplied explicitly)
    #[serde(default)]
    pub state_path: Option<String>,

    /// Fail lifecycle operations when the state store rejects a save.
    /// When false, save failures are logged and the in-memory state stays
    /// authoritative.
    #[serde(default)]
    pub require_persistence: bool,

    /// Run the auto-install/auto-enable walk during startup
    #[serde(default = "default_true")]
    pub autostart: bool,

    /// Maximum recursion depth for dependency tree reports
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,

    /// Per-module configuration overrides, merged over manifest defaults
    /// at install time
    #[serde(default)]
    pub module_configs: HashMap<String, HashMap<String, serde_json::Value>>,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_true() -> bool {
    true
}

fn default_max_tree_depth() -> usize {
    10
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            require_persistence: false,
            autostart: true,
            max_tree_depth: 10,
            module_configs: HashMap::new(),
            logging: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g., "info", "modkit=debug")
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON-formatted logs (requires the json-logging feature)
    #[serde(default)]
    pub json_format: bool,
}

impl RegistryConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RegistryConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_tree_depth == 0 {
            return Err(anyhow::anyhow!("max_tree_depth must be greater than 0"));
        }

        Ok(())
    }
}
