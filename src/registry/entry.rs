//! Registered catalog entries

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manifest::{HookError, ModuleManifest};
use crate::utils::current_timestamp;

/// Future returned by an exports loader
pub type ExportsFuture = Pin<Box<dyn Future<Output = Result<Value, HookError>> + Send>>;

/// Callback that fetches and executes a module's payload, yielding its
/// exports. Supplied at registration; installing without one yields an
/// empty exports object.
pub type ExportsLoader = Arc<dyn Fn() -> ExportsFuture + Send + Sync>;

/// Wrap an async closure into an [`ExportsLoader`]
pub fn exports_loader<F, Fut>(f: F) -> ExportsLoader
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HookError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Where a registered module came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSource {
    #[default]
    Local,
    Marketplace,
    Custom,
}

/// One registered module: the manifest plus how to load its payload
#[derive(Clone)]
pub struct RegistryEntry {
    pub manifest: Arc<ModuleManifest>,
    pub loader: Option<ExportsLoader>,
    pub source: ModuleSource,
    /// Unix timestamp of registration, in seconds
    pub registered_at: u64,
}

impl RegistryEntry {
    pub fn new(manifest: ModuleManifest, loader: Option<ExportsLoader>) -> Self {
        Self {
            manifest: Arc::new(manifest),
            loader,
            source: ModuleSource::Local,
            registered_at: current_timestamp(),
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.manifest.id)
            .field("version", &self.manifest.version)
            .field("has_loader", &self.loader.is_some())
            .field("source", &self.source)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
