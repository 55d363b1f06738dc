//! Module lifecycle states and live instances

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manifest::ModuleManifest;

/// Lifecycle state of a module instance
///
/// Transient states (`installing`, `enabling`, ...) mark an in-flight
/// transition; a failure mid-transition parks the instance in `error`
/// with `last_error` set rather than reverting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Uninstalled,
    Installing,
    Installed,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
    Uninstalling,
    Upgrading,
    Error,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Installing => "installing",
            ModuleState::Installed => "installed",
            ModuleState::Enabling => "enabling",
            ModuleState::Enabled => "enabled",
            ModuleState::Disabling => "disabling",
            ModuleState::Disabled => "disabled",
            ModuleState::Uninstalling => "uninstalling",
            ModuleState::Upgrading => "upgrading",
            ModuleState::Error => "error",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live module instance tracked by the registry
///
/// At most one instance exists per module id. `installed_version` is the
/// version actually installed, which trails `manifest.version` after the
/// manifest is re-registered and leads it after an upgrade.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub manifest: Arc<ModuleManifest>,
    pub state: ModuleState,
    pub installed_version: Option<Version>,
    /// Unix timestamp of installation, in seconds
    pub installed_at: Option<u64>,
    /// Unix timestamp of the last enable, in seconds
    pub enabled_at: Option<u64>,
    /// Per-module configuration, seeded from the manifest at install
    pub config: HashMap<String, Value>,
    /// Value returned by the module's registered loader
    pub exports: Option<Value>,
    /// Message of the failure that parked this instance in `error`
    pub last_error: Option<String>,
}

impl ModuleInstance {
    /// Transient instance created when a transition begins before any
    /// install has completed
    pub(crate) fn transient(manifest: Arc<ModuleManifest>, state: ModuleState) -> Self {
        Self {
            manifest,
            state,
            installed_version: None,
            installed_at: None,
            enabled_at: None,
            config: HashMap::new(),
            exports: None,
            last_error: None,
        }
    }
}
