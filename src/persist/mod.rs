//! Instance state persistence
//!
//! After every lifecycle mutation the registry writes a snapshot of its
//! instances through a [`StateStore`]. The in-memory map stays
//! authoritative: by default a failed save is logged and the transition
//! still succeeds, while `require_persistence` in the registry config
//! turns save failures into hard errors. At startup the snapshot is
//! joined against registered entries; snapshots for ids with no entry
//! are dropped with a warning since no manifest exists to rebuild them.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;

use crate::registry::ModuleState;
use crate::utils::current_timestamp;

/// Persisted form of one module instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub state: ModuleState,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub installed_version: Option<Version>,
    #[serde(default)]
    pub installed_at: Option<u64>,
    #[serde(default)]
    pub enabled_at: Option<u64>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub exports: Option<Value>,
}

/// Snapshot of the whole registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub instances: Vec<InstanceSnapshot>,
    /// Unix timestamp in seconds
    pub saved_at: u64,
}

impl RegistrySnapshot {
    pub fn new(instances: Vec<InstanceSnapshot>) -> Self {
        Self {
            instances,
            saved_at: current_timestamp(),
        }
    }
}

/// Storage backend for registry snapshots
///
/// Any key-value or document store satisfies this; the registry treats
/// the snapshot as opaque.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved snapshot, or `None` if nothing was saved yet
    async fn load_state(&self) -> anyhow::Result<Option<RegistrySnapshot>>;

    /// Replace the saved snapshot
    async fn save_state(&self, snapshot: &RegistrySnapshot) -> anyhow::Result<()>;
}

/// In-memory store, mainly for tests and ephemeral registries
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: TokioMutex<Option<RegistrySnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_state(&self) -> anyhow::Result<Option<RegistrySnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save_state(&self, snapshot: &RegistrySnapshot) -> anyhow::Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

/// Pretty-printed JSON file store
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_state(&self) -> anyhow::Result<Option<RegistrySnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_state(&self, snapshot: &RegistrySnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
