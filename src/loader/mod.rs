//! Asset loading and unloading
//!
//! The loader drives a module's static assets through an injected
//! [`AssetFetcher`] and runs the `on_load`/`on_unload` hooks around them.
//! How an asset is physically fetched is the fetcher's business; the
//! loader only enforces ordering and bookkeeping:
//!
//! - styles start first and load concurrently,
//! - scripts load strictly sequentially, since later scripts commonly
//!   depend on earlier ones having executed,
//! - fonts start only after all scripts, concurrently.
//!
//! Styles and scripts are tracked under `module_id:url` keys so repeated
//! loads skip work already done and unloading removes exactly what one
//! module contributed. Fonts are fire-and-forget: fetched on every load
//! and never tracked or removed.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::manifest::hooks::{run_hook, HookPhase};
use crate::manifest::{ModuleAssets, ModuleManifest};

/// What kind of asset is being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Style,
    Script,
    Font,
}

/// Performs the physical fetch and removal of assets
///
/// Implementations might inject `<link>`/`<script>` tags, download files
/// to a cache directory, or do nothing at all in tests.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch one asset; an error aborts the module load
    async fn fetch(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()>;

    /// Remove a previously fetched asset
    async fn remove(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()>;
}

/// Fetcher that accepts everything without doing any work
#[derive(Debug, Default)]
pub struct NoopFetcher;

#[async_trait]
impl AssetFetcher for NoopFetcher {
    async fn fetch(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()> {
        debug!("Fetching {:?} asset for {}: {}", kind, module_id, url);
        Ok(())
    }

    async fn remove(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()> {
        debug!("Removing {:?} asset for {}: {}", kind, module_id, url);
        Ok(())
    }
}

/// Loads and unloads module assets with ordering guarantees
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
    loaded_styles: Arc<TokioMutex<HashSet<String>>>,
    loaded_scripts: Arc<TokioMutex<HashSet<String>>>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            loaded_styles: Arc::new(TokioMutex::new(HashSet::new())),
            loaded_scripts: Arc::new(TokioMutex::new(HashSet::new())),
        }
    }

    /// Load a module: fetch its assets, then run the `on_load` hook
    pub async fn load(&self, manifest: &ModuleManifest) -> Result<(), RegistryError> {
        if !manifest.assets.is_empty() {
            self.load_assets(&manifest.id, &manifest.assets).await?;
        }

        run_hook(&manifest.id, HookPhase::OnLoad, manifest.hooks.on_load.as_ref()).await?;

        debug!("Module loaded: {}", manifest.id);
        Ok(())
    }

    /// Unload a module: run the `on_unload` hook, then remove its assets
    pub async fn unload(&self, manifest: &ModuleManifest) -> Result<(), RegistryError> {
        run_hook(
            &manifest.id,
            HookPhase::OnUnload,
            manifest.hooks.on_unload.as_ref(),
        )
        .await?;

        self.unload_assets(&manifest.id).await;

        debug!("Module unloaded: {}", manifest.id);
        Ok(())
    }

    /// Remove and refetch a module's assets without running `on_unload`,
    /// then run `on_load` again. Used for live-development reloads; the
    /// lifecycle state machine is not involved.
    pub async fn hot_reload(&self, manifest: &ModuleManifest) -> Result<(), RegistryError> {
        debug!("Hot reloading module: {}", manifest.id);

        self.unload_assets(&manifest.id).await;
        self.load(manifest).await
    }

    /// Tracked `module_id:url` keys of live styles and scripts, sorted
    pub async fn tracked_assets(&self) -> Vec<String> {
        let styles = self.loaded_styles.lock().await;
        let scripts = self.loaded_scripts.lock().await;

        let mut keys: Vec<String> = styles.iter().chain(scripts.iter()).cloned().collect();
        keys.sort();
        keys
    }

    async fn load_assets(
        &self,
        module_id: &str,
        assets: &ModuleAssets,
    ) -> Result<(), RegistryError> {
        let mut in_flight: Vec<JoinHandle<Result<(), RegistryError>>> = Vec::new();

        for url in &assets.styles {
            let key = asset_key(module_id, url);
            if self.loaded_styles.lock().await.contains(&key) {
                continue;
            }
            in_flight.push(self.spawn_style(module_id.to_string(), url.clone()));
        }

        for url in &assets.scripts {
            let key = asset_key(module_id, url);
            if self.loaded_scripts.lock().await.contains(&key) {
                continue;
            }

            self.fetcher
                .fetch(module_id, AssetKind::Script, url)
                .await
                .map_err(|e| RegistryError::Loader {
                    module: module_id.to_string(),
                    message: format!("Failed to load script: {}: {}", url, e),
                })?;

            self.loaded_scripts.lock().await.insert(key);
        }

        for url in &assets.fonts {
            in_flight.push(self.spawn_font(module_id.to_string(), url.clone()));
        }

        for handle in in_flight {
            handle.await.map_err(|e| RegistryError::Loader {
                module: module_id.to_string(),
                message: format!("Asset task failed: {}", e),
            })??;
        }

        Ok(())
    }

    fn spawn_style(&self, module_id: String, url: String) -> JoinHandle<Result<(), RegistryError>> {
        let fetcher = Arc::clone(&self.fetcher);
        let tracked = Arc::clone(&self.loaded_styles);

        tokio::spawn(async move {
            fetcher
                .fetch(&module_id, AssetKind::Style, &url)
                .await
                .map_err(|e| RegistryError::Loader {
                    module: module_id.clone(),
                    message: format!("Failed to load stylesheet: {}: {}", url, e),
                })?;

            tracked.lock().await.insert(asset_key(&module_id, &url));
            Ok(())
        })
    }

    fn spawn_font(&self, module_id: String, url: String) -> JoinHandle<Result<(), RegistryError>> {
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
            fetcher
                .fetch(&module_id, AssetKind::Font, &url)
                .await
                .map_err(|e| RegistryError::Loader {
                    module: module_id.clone(),
                    message: format!("Failed to load font: {}: {}", url, e),
                })
        })
    }

    /// Remove every tracked asset belonging to one module
    ///
    /// Removal is best effort: a fetcher failure is logged and the key is
    /// dropped anyway, so a broken fetcher cannot wedge an unload.
    async fn unload_assets(&self, module_id: &str) {
        let prefix = format!("{}:", module_id);

        let script_keys = drain_prefixed(&mut *self.loaded_scripts.lock().await, &prefix);
        for url in &script_keys {
            if let Err(e) = self.fetcher.remove(module_id, AssetKind::Script, url).await {
                warn!("Failed to remove script for {}: {}: {}", module_id, url, e);
            }
        }

        let style_keys = drain_prefixed(&mut *self.loaded_styles.lock().await, &prefix);
        for url in &style_keys {
            if let Err(e) = self.fetcher.remove(module_id, AssetKind::Style, url).await {
                warn!("Failed to remove style for {}: {}: {}", module_id, url, e);
            }
        }
    }
}

fn asset_key(module_id: &str, url: &str) -> String {
    format!("{}:{}", module_id, url)
}

/// Remove keys with the given prefix from the set, returning their urls
fn drain_prefixed(tracked: &mut HashSet<String>, prefix: &str) -> Vec<String> {
    let urls: Vec<String> = tracked
        .iter()
        .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
        .collect();

    tracked.retain(|key| !key.starts_with(prefix));
    urls
}
