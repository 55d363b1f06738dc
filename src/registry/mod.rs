//! Module registry: the lifecycle orchestrator
//!
//! Owns the catalog of registered manifests and the live instance map,
//! and drives every lifecycle transition (install, enable, disable,
//! uninstall, upgrade) through its hook, loader, persistence, and event
//! steps. At most one transition runs at a time per module id;
//! independent ids proceed concurrently.
//!
//! Precondition failures (unknown id, illegal re-entry, dependency in
//! use) are rejected before any state changes. A failure inside a
//! transition parks the instance in the error state with `last_error`
//! set and is returned to the caller; the instance is left inspectable
//! rather than rolled back.

pub mod entry;
pub mod extensions;
pub mod filter;
pub mod instance;

pub use entry::{exports_loader, ExportsFuture, ExportsLoader, ModuleSource, RegistryEntry};
pub use extensions::{MenuExtension, ModelExtension, ViewExtension};
pub use filter::ModuleFilter;
pub use instance::{ModuleInstance, ModuleState};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use semver::Version;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::events::{EventBus, EventPayload, ModuleEvent, SubscriptionId};
use crate::loader::{AssetFetcher, AssetLoader, NoopFetcher};
use crate::manifest::hooks::{run_hook, run_upgrade_hook};
use crate::manifest::{HookError, HookPhase, ManifestValidator, ModuleManifest};
use crate::persist::{InstanceSnapshot, JsonFileStore, RegistrySnapshot, StateStore};
use crate::resolver::{DependencyReport, DependencyResolver, DependencyTree, RegistryView};
use crate::utils::current_timestamp;

use extensions::ExtensionStore;

/// Future returned by a named hook handler
pub type NamedHookFuture = Pin<Box<dyn Future<Output = Result<Value, HookError>> + Send>>;

/// Handler registered under a hook point name via
/// [`ModuleRegistry::register_hook`]
pub type NamedHook = Arc<dyn Fn(Value) -> NamedHookFuture + Send + Sync>;

/// Everything the registry knows, behind one lock
#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    instances: HashMap<String, ModuleInstance>,
    extensions: ExtensionStore,
    named_hooks: HashMap<String, Vec<NamedHook>>,
}

impl RegistryState {
    fn is_installed(&self, id: &str) -> bool {
        self.instances
            .get(id)
            .map(|i| i.state != ModuleState::Uninstalled)
            .unwrap_or(false)
    }

    fn is_enabled(&self, id: &str) -> bool {
        self.instances
            .get(id)
            .map(|i| i.state == ModuleState::Enabled)
            .unwrap_or(false)
    }

    /// Ids of instances matching `pred` that list `id` as a required
    /// dependency, sorted for stable error messages
    fn dependents_matching<F>(&self, id: &str, pred: F) -> Vec<String>
    where
        F: Fn(ModuleState) -> bool,
    {
        let mut dependents: Vec<String> = self
            .instances
            .values()
            .filter(|inst| pred(inst.state))
            .filter(|inst| {
                inst.manifest
                    .dependencies
                    .iter()
                    .any(|dep| dep.required && dep.id == id)
            })
            .map(|inst| inst.manifest.id.clone())
            .collect();
        dependents.sort();
        dependents
    }

    fn installed_dependents(&self, id: &str) -> Vec<String> {
        self.dependents_matching(id, |state| state != ModuleState::Uninstalled)
    }

    fn enabled_dependents(&self, id: &str) -> Vec<String> {
        self.dependents_matching(id, |state| state == ModuleState::Enabled)
    }
}

impl RegistryView for RegistryState {
    fn entry_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>> {
        self.entries.get(id).map(|e| Arc::clone(&e.manifest))
    }

    fn instance_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>> {
        self.instances
            .get(id)
            .filter(|i| i.state != ModuleState::Uninstalled)
            .map(|i| Arc::clone(&i.manifest))
    }

    fn installed_version(&self, id: &str) -> Option<Version> {
        self.instances
            .get(id)
            .filter(|i| i.state != ModuleState::Uninstalled)
            .and_then(|i| i.installed_version.clone())
    }

    fn enabled_modules(&self) -> Vec<(String, i64)> {
        self.instances
            .values()
            .filter(|i| i.state == ModuleState::Enabled)
            .map(|i| (i.manifest.id.clone(), i.manifest.priority))
            .collect()
    }
}

/// Builder for [`ModuleRegistry`]
///
/// Lets callers swap in a custom state store or asset fetcher; anything
/// not supplied is derived from the config.
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    store: Option<Arc<dyn StateStore>>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> ModuleRegistry {
        let store = self.store.or_else(|| {
            self.config
                .state_path
                .as_ref()
                .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn StateStore>)
        });
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(NoopFetcher) as Arc<dyn AssetFetcher>);

        ModuleRegistry {
            state: Arc::new(RwLock::new(RegistryState::default())),
            events: EventBus::new(),
            loader: AssetLoader::new(fetcher),
            store,
            config: self.config,
            transition_locks: TokioMutex::new(HashMap::new()),
        }
    }
}

/// The module registry
///
/// Construct one per process, register manifests, then call
/// [`startup`](Self::startup) to restore persisted instances and run the
/// auto-install/auto-enable walk.
pub struct ModuleRegistry {
    state: Arc<RwLock<RegistryState>>,
    events: EventBus,
    loader: AssetLoader,
    store: Option<Arc<dyn StateStore>>,
    config: RegistryConfig,
    /// One mutex per module id, taken for the duration of a transition
    transition_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl ModuleRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        RegistryBuilder::new().with_config(config).build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The event bus carrying lifecycle events
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn transition_lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.transition_locks.lock().await;
            Arc::clone(
                locks
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::new(TokioMutex::new(()))),
            )
        };
        slot.lock_owned().await
    }

    // ---- Registration -------------------------------------------------

    /// Register a manifest and its optional exports loader
    ///
    /// The manifest must pass validation and must not declare a conflict
    /// with any installed module. Re-registering an id replaces the
    /// previous entry; live instances keep the manifest they were
    /// installed with.
    pub async fn register(
        &self,
        manifest: ModuleManifest,
        loader: Option<ExportsLoader>,
    ) -> Result<(), RegistryError> {
        self.register_with_source(manifest, loader, ModuleSource::Local)
            .await
    }

    /// [`register`](Self::register) with explicit provenance
    pub async fn register_with_source(
        &self,
        manifest: ModuleManifest,
        loader: Option<ExportsLoader>,
        source: ModuleSource,
    ) -> Result<(), RegistryError> {
        let report = ManifestValidator::validate(&manifest);
        if !report.is_valid() {
            return Err(RegistryError::Validation {
                errors: report.errors,
            });
        }
        for warning in &report.warnings {
            warn!("Manifest {}: {}", manifest.id, warning);
        }

        let conflicts: Vec<String> = {
            let st = self.state.read().await;
            manifest
                .conflicts
                .iter()
                .filter(|conflict_id| st.is_installed(conflict_id))
                .cloned()
                .collect()
        };
        if !conflicts.is_empty() {
            return Err(RegistryError::Conflict {
                module: manifest.id.clone(),
                installed: conflicts,
            });
        }

        let id = manifest.id.clone();
        let version = manifest.version.clone();
        {
            let mut st = self.state.write().await;
            let mut entry = RegistryEntry::new(manifest, loader);
            entry.source = source;
            if st.entries.insert(id.clone(), entry).is_some() {
                debug!("Replacing registered manifest for {}", id);
            }
        }

        info!("Module registered: {} v{}", id, version);
        Ok(())
    }

    /// Remove a module entirely: disable if enabled, uninstall if
    /// installed, then drop the entry. Unknown ids are a no-op.
    pub async fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;

        if self.is_enabled(id).await {
            self.disable_inner(id).await?;
        }
        if self.is_installed(id).await {
            self.uninstall_inner(id).await?;
        }

        {
            let mut st = self.state.write().await;
            st.entries.remove(id);
            st.instances.remove(id);
        }

        info!("Module unregistered: {}", id);
        Ok(())
    }

    // ---- Lifecycle ----------------------------------------------------

    /// Install a registered module and every uninstalled dependency
    ///
    /// Dependencies install first, in resolver order. On failure the
    /// instance is parked in the error state and the error is returned;
    /// dependencies already installed stay installed.
    pub async fn install(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;
        self.install_inner(id).await
    }

    fn install_inner<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            let (manifest, loader) = {
                let st = self.state.read().await;
                let Some(entry) = st.entries.get(id) else {
                    return Err(RegistryError::NotFound(id.to_string()));
                };
                if let Some(instance) = st.instances.get(id) {
                    if instance.state != ModuleState::Uninstalled {
                        return Err(RegistryError::AlreadyInstalled(id.to_string()));
                    }
                }
                (Arc::clone(&entry.manifest), entry.loader.clone())
            };

            if let Err(e) = self.run_install(id, &manifest, loader).await {
                self.fail_transition(id, &e).await;
                return Err(e);
            }
            Ok(())
        })
    }

    async fn run_install(
        &self,
        id: &str,
        manifest: &Arc<ModuleManifest>,
        loader: Option<ExportsLoader>,
    ) -> Result<(), RegistryError> {
        self.update_state(id, ModuleState::Installing, None).await;

        let resolved = {
            let st = self.state.read().await;
            DependencyResolver::resolve(&*st, manifest)?
        };

        for dep_id in &resolved {
            if dep_id == id {
                continue;
            }
            if !self.is_installed(dep_id).await {
                self.install(dep_id).await?;
            }
        }

        run_hook(
            id,
            HookPhase::BeforeInstall,
            manifest.hooks.before_install.as_ref(),
        )
        .await?;

        let exports = match loader {
            Some(load) => load().await.map_err(|e| RegistryError::Loader {
                module: id.to_string(),
                message: e.to_string(),
            })?,
            None => Value::Object(Default::default()),
        };

        let installed_version = crate::manifest::parse_version(&manifest.version)?;

        {
            let mut st = self.state.write().await;
            let mut config = manifest.config.clone();
            if let Some(overrides) = self.config.module_configs.get(id) {
                config.extend(overrides.clone());
            }
            st.instances.insert(
                id.to_string(),
                ModuleInstance {
                    manifest: Arc::clone(manifest),
                    state: ModuleState::Installed,
                    installed_version: Some(installed_version),
                    installed_at: Some(current_timestamp()),
                    enabled_at: None,
                    config,
                    exports: Some(exports),
                    last_error: None,
                },
            );
        }

        run_hook(id, HookPhase::OnInstall, manifest.hooks.on_install.as_ref()).await?;
        run_hook(
            id,
            HookPhase::AfterInstall,
            manifest.hooks.after_install.as_ref(),
        )
        .await?;

        self.persist().await?;
        self.events
            .emit(EventPayload::new(id, ModuleEvent::Installed))
            .await;
        info!("Module installed: {}", id);
        Ok(())
    }

    /// Uninstall a module, disabling it first if enabled
    ///
    /// Refused while any installed module lists it as a required
    /// dependency; the refusal leaves all states untouched.
    pub async fn uninstall(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;
        self.uninstall_inner(id).await
    }

    async fn uninstall_inner(&self, id: &str) -> Result<(), RegistryError> {
        let (manifest, enabled, dependents) = {
            let st = self.state.read().await;
            let Some(instance) = st
                .instances
                .get(id)
                .filter(|i| i.state != ModuleState::Uninstalled)
            else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            (
                Arc::clone(&instance.manifest),
                instance.state == ModuleState::Enabled,
                st.installed_dependents(id),
            )
        };

        if !dependents.is_empty() {
            return Err(RegistryError::DependencyInUse {
                module: id.to_string(),
                dependents,
            });
        }

        if enabled {
            self.disable_inner(id).await?;
        }

        if let Err(e) = self.run_uninstall(id, &manifest).await {
            self.fail_transition(id, &e).await;
            return Err(e);
        }
        Ok(())
    }

    async fn run_uninstall(
        &self,
        id: &str,
        manifest: &Arc<ModuleManifest>,
    ) -> Result<(), RegistryError> {
        self.update_state(id, ModuleState::Uninstalling, None).await;

        run_hook(
            id,
            HookPhase::BeforeUninstall,
            manifest.hooks.before_uninstall.as_ref(),
        )
        .await?;
        run_hook(
            id,
            HookPhase::OnUninstall,
            manifest.hooks.on_uninstall.as_ref(),
        )
        .await?;
        run_hook(
            id,
            HookPhase::AfterUninstall,
            manifest.hooks.after_uninstall.as_ref(),
        )
        .await?;

        {
            let mut st = self.state.write().await;
            st.instances.remove(id);
        }

        self.persist().await?;
        self.events
            .emit(EventPayload::new(id, ModuleEvent::Uninstalled))
            .await;
        info!("Module uninstalled: {}", id);
        Ok(())
    }

    /// Enable an installed module, enabling required dependencies first
    ///
    /// Already-enabled modules are a silent no-op.
    pub async fn enable(&self, id: &str) -> Result<(), RegistryError> {
        let mut chain = Vec::new();
        self.enable_chain(id, &mut chain).await
    }

    /// `chain` holds the ids this call stack is already enabling; meeting
    /// one again means the instance graph has a cycle the resolver never
    /// saw (restored from a stale snapshot), and erroring out here beats
    /// deadlocking on our own transition lock.
    fn enable_chain<'a>(
        &'a self,
        id: &'a str,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            if chain.iter().any(|seen| seen == id) {
                return Err(RegistryError::CircularDependency(id.to_string()));
            }
            chain.push(id.to_string());

            let _guard = self.transition_lock(id).await;

            let (manifest, state) = {
                let st = self.state.read().await;
                let Some(instance) = st
                    .instances
                    .get(id)
                    .filter(|i| i.state != ModuleState::Uninstalled)
                else {
                    return Err(RegistryError::NotInstalled(id.to_string()));
                };
                (Arc::clone(&instance.manifest), instance.state)
            };

            if state == ModuleState::Enabled {
                return Ok(());
            }

            if let Err(e) = self.run_enable(id, &manifest, chain).await {
                self.fail_transition(id, &e).await;
                return Err(e);
            }
            Ok(())
        })
    }

    async fn run_enable(
        &self,
        id: &str,
        manifest: &Arc<ModuleManifest>,
        chain: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        self.update_state(id, ModuleState::Enabling, None).await;

        for dep in &manifest.dependencies {
            if dep.required && !self.is_enabled(&dep.id).await {
                self.enable_chain(&dep.id, chain).await?;
            }
        }

        run_hook(
            id,
            HookPhase::BeforeEnable,
            manifest.hooks.before_enable.as_ref(),
        )
        .await?;
        run_hook(id, HookPhase::OnEnable, manifest.hooks.on_enable.as_ref()).await?;

        self.loader.load(manifest).await?;

        run_hook(
            id,
            HookPhase::AfterEnable,
            manifest.hooks.after_enable.as_ref(),
        )
        .await?;

        {
            let mut st = self.state.write().await;
            if let Some(instance) = st.instances.get_mut(id) {
                instance.state = ModuleState::Enabled;
                instance.enabled_at = Some(current_timestamp());
            }
        }

        self.persist().await?;
        self.events
            .emit(EventPayload::new(id, ModuleEvent::Enabled))
            .await;
        info!("Module enabled: {}", id);
        Ok(())
    }

    /// Disable an enabled module
    ///
    /// Not-enabled modules are a silent no-op. Refused while any enabled
    /// module lists it as a required dependency; the refusal leaves all
    /// states untouched.
    pub async fn disable(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;
        self.disable_inner(id).await
    }

    async fn disable_inner(&self, id: &str) -> Result<(), RegistryError> {
        let (manifest, state, dependents) = {
            let st = self.state.read().await;
            let Some(instance) = st
                .instances
                .get(id)
                .filter(|i| i.state != ModuleState::Uninstalled)
            else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            (
                Arc::clone(&instance.manifest),
                instance.state,
                st.enabled_dependents(id),
            )
        };

        if state != ModuleState::Enabled {
            return Ok(());
        }

        if !dependents.is_empty() {
            return Err(RegistryError::DependencyInUse {
                module: id.to_string(),
                dependents,
            });
        }

        if let Err(e) = self.run_disable(id, &manifest).await {
            self.fail_transition(id, &e).await;
            return Err(e);
        }
        Ok(())
    }

    async fn run_disable(
        &self,
        id: &str,
        manifest: &Arc<ModuleManifest>,
    ) -> Result<(), RegistryError> {
        self.update_state(id, ModuleState::Disabling, None).await;

        run_hook(
            id,
            HookPhase::BeforeDisable,
            manifest.hooks.before_disable.as_ref(),
        )
        .await?;
        run_hook(id, HookPhase::OnDisable, manifest.hooks.on_disable.as_ref()).await?;

        self.loader.unload(manifest).await?;

        run_hook(
            id,
            HookPhase::AfterDisable,
            manifest.hooks.after_disable.as_ref(),
        )
        .await?;

        {
            let mut st = self.state.write().await;
            if let Some(instance) = st.instances.get_mut(id) {
                instance.state = ModuleState::Disabled;
            }
        }

        self.persist().await?;
        self.events
            .emit(EventPayload::new(id, ModuleEvent::Disabled))
            .await;
        info!("Module disabled: {}", id);
        Ok(())
    }

    /// Upgrade an installed module to a new version
    ///
    /// Runs the upgrade hooks with the (from, to) version pair, updates
    /// `installed_version`, and restores the activation state the module
    /// had before the upgrade began.
    pub async fn upgrade(&self, id: &str, new_version: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;

        let to = crate::manifest::parse_version(new_version)?;

        let (manifest, from, was_enabled) = {
            let st = self.state.read().await;
            let Some(instance) = st
                .instances
                .get(id)
                .filter(|i| i.state != ModuleState::Uninstalled)
            else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            (
                Arc::clone(&instance.manifest),
                instance
                    .installed_version
                    .clone()
                    .unwrap_or_else(|| Version::new(0, 0, 0)),
                instance.state == ModuleState::Enabled,
            )
        };

        if let Err(e) = self.run_upgrade(id, &manifest, &from, &to, was_enabled).await {
            self.fail_transition(id, &e).await;
            return Err(e);
        }
        Ok(())
    }

    async fn run_upgrade(
        &self,
        id: &str,
        manifest: &Arc<ModuleManifest>,
        from: &Version,
        to: &Version,
        was_enabled: bool,
    ) -> Result<(), RegistryError> {
        self.update_state(id, ModuleState::Upgrading, None).await;

        run_upgrade_hook(
            id,
            HookPhase::BeforeUpgrade,
            manifest.hooks.before_upgrade.as_ref(),
            from,
            to,
        )
        .await?;
        run_upgrade_hook(
            id,
            HookPhase::OnUpgrade,
            manifest.hooks.on_upgrade.as_ref(),
            from,
            to,
        )
        .await?;

        {
            let mut st = self.state.write().await;
            if let Some(instance) = st.instances.get_mut(id) {
                instance.installed_version = Some(to.clone());
            }
        }

        run_upgrade_hook(
            id,
            HookPhase::AfterUpgrade,
            manifest.hooks.after_upgrade.as_ref(),
            from,
            to,
        )
        .await?;

        let restored = if was_enabled {
            ModuleState::Enabled
        } else {
            ModuleState::Installed
        };
        self.update_state(id, restored, None).await;

        self.persist().await?;
        self.events
            .emit(
                EventPayload::new(id, ModuleEvent::Upgraded).with_data(json!({
                    "from_version": from.to_string(),
                    "to_version": to.to_string(),
                })),
            )
            .await;
        info!("Module upgraded: {} ({} -> {})", id, from, to);
        Ok(())
    }

    /// Reload an installed module's assets without a state transition
    pub async fn hot_reload(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;

        let manifest = {
            let st = self.state.read().await;
            let Some(instance) = st
                .instances
                .get(id)
                .filter(|i| i.state != ModuleState::Uninstalled)
            else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            Arc::clone(&instance.manifest)
        };

        self.loader.hot_reload(&manifest).await
    }

    // ---- Startup ------------------------------------------------------

    /// Restore persisted instances, then auto-install and auto-enable
    /// flagged modules
    ///
    /// Call after registering manifests: snapshots are joined against
    /// registered entries, and snapshots for unregistered ids are
    /// dropped with a warning. Individual auto-install or auto-enable
    /// failures are logged and do not block other modules.
    pub async fn startup(&self) -> Result<(), RegistryError> {
        self.restore().await?;

        if self.config.autostart {
            self.autostart().await;
        }

        Ok(())
    }

    async fn restore(&self) -> Result<(), RegistryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let snapshot = match store.load_state().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(()),
            Err(e) if self.config.require_persistence => {
                return Err(RegistryError::Persistence(e.to_string()));
            }
            Err(e) => {
                warn!("Failed to load registry state: {}", e);
                return Ok(());
            }
        };

        let mut restored = 0usize;
        {
            let mut st = self.state.write().await;
            for snap in snapshot.instances {
                let Some(manifest) = st.entries.get(&snap.id).map(|e| Arc::clone(&e.manifest))
                else {
                    warn!("Dropping persisted state for unregistered module: {}", snap.id);
                    continue;
                };
                st.instances.insert(
                    snap.id.clone(),
                    ModuleInstance {
                        manifest,
                        state: snap.state,
                        installed_version: snap.installed_version,
                        installed_at: snap.installed_at,
                        enabled_at: snap.enabled_at,
                        config: snap.config,
                        exports: snap.exports,
                        last_error: snap.last_error,
                    },
                );
                restored += 1;
            }
        }

        info!("Restored {} module instances from state store", restored);
        Ok(())
    }

    async fn autostart(&self) {
        for id in self.registered_ids().await {
            let Some(manifest) = self.manifest(&id).await else {
                continue;
            };

            if manifest.auto_install && !self.is_installed(&id).await {
                if let Err(e) = self.install(&id).await {
                    error!("Failed to auto-install module {}: {}", id, e);
                }
            }

            if manifest.auto_enable && self.is_installed(&id).await && !self.is_enabled(&id).await
            {
                if let Err(e) = self.enable(&id).await {
                    error!("Failed to auto-enable module {}: {}", id, e);
                }
            }
        }
    }

    // ---- Queries ------------------------------------------------------

    /// Live instance for an id, if any
    pub async fn module(&self, id: &str) -> Option<ModuleInstance> {
        let st = self.state.read().await;
        st.instances.get(id).cloned()
    }

    /// Registered manifest for an id, if any
    pub async fn manifest(&self, id: &str) -> Option<Arc<ModuleManifest>> {
        let st = self.state.read().await;
        st.entries.get(id).map(|e| Arc::clone(&e.manifest))
    }

    /// Every registered id, sorted
    pub async fn registered_ids(&self) -> Vec<String> {
        let st = self.state.read().await;
        sorted_keys(&st.entries)
    }

    /// Instances matching a filter, sorted by id
    pub async fn modules(&self, filter: Option<&ModuleFilter>) -> Vec<ModuleInstance> {
        let st = self.state.read().await;
        let mut out: Vec<ModuleInstance> = st
            .instances
            .values()
            .filter(|inst| filter.map_or(true, |f| f.matches(inst)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
        out
    }

    pub async fn is_installed(&self, id: &str) -> bool {
        let st = self.state.read().await;
        st.is_installed(id)
    }

    pub async fn is_enabled(&self, id: &str) -> bool {
        let st = self.state.read().await;
        st.is_enabled(id)
    }

    // ---- Configuration ------------------------------------------------

    /// A module's full runtime configuration
    pub async fn module_config(&self, id: &str) -> Option<HashMap<String, Value>> {
        let st = self.state.read().await;
        st.instances.get(id).map(|i| i.config.clone())
    }

    /// One configuration value
    pub async fn config_value(&self, id: &str, key: &str) -> Option<Value> {
        let st = self.state.read().await;
        st.instances.get(id).and_then(|i| i.config.get(key).cloned())
    }

    /// Set one configuration value, validating it against the manifest's
    /// setting declaration when one exists
    pub async fn set_config(
        &self,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), RegistryError> {
        let _guard = self.transition_lock(id).await;

        let setting = {
            let st = self.state.read().await;
            let Some(instance) = st
                .instances
                .get(id)
                .filter(|i| i.state != ModuleState::Uninstalled)
            else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            instance
                .manifest
                .settings
                .iter()
                .find(|s| s.key == key)
                .cloned()
        };

        if let Some(setting) = &setting {
            ManifestValidator::validate_config_value(setting, &value)
                .map_err(|e| RegistryError::Validation { errors: vec![e] })?;
        }

        {
            let mut st = self.state.write().await;
            let Some(instance) = st.instances.get_mut(id) else {
                return Err(RegistryError::NotInstalled(id.to_string()));
            };
            instance.config.insert(key.to_string(), value.clone());
        }

        self.persist().await?;
        self.events
            .emit(
                EventPayload::new(id, ModuleEvent::ConfigChanged)
                    .with_data(json!({ "key": key, "value": value })),
            )
            .await;
        Ok(())
    }

    // ---- Dependencies -------------------------------------------------

    /// Install order for a manifest: dependencies first, own id last
    pub async fn resolve_dependencies(
        &self,
        manifest: &ModuleManifest,
    ) -> Result<Vec<String>, RegistryError> {
        let st = self.state.read().await;
        DependencyResolver::resolve(&*st, manifest)
    }

    /// Non-failing dependency health check for pre-flight UIs
    pub async fn check_dependencies(&self, manifest: &ModuleManifest) -> DependencyReport {
        let st = self.state.read().await;
        DependencyResolver::check_dependencies(&*st, manifest)
    }

    /// Diagnostic dependency tree rooted at an installed module
    pub async fn dependency_tree(&self, id: &str) -> DependencyTree {
        let st = self.state.read().await;
        DependencyResolver::dependency_tree(&*st, id, self.config.max_tree_depth)
    }

    /// Priority- and dependency-ordered activation sequence for enabled
    /// modules
    pub async fn load_order(&self) -> Vec<String> {
        let st = self.state.read().await;
        DependencyResolver::load_order(&*st)
    }

    // ---- Events -------------------------------------------------------

    pub async fn subscribe<F>(&self, event: ModuleEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler).await
    }

    pub async fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.events.subscribe_all(handler).await
    }

    pub async fn subscribe_once<F>(&self, event: ModuleEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.events.subscribe_once(event, handler).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id).await
    }

    /// Drop subscriptions for one event kind, or every subscription
    pub async fn remove_all_listeners(&self, event: Option<ModuleEvent>) {
        self.events.remove_all(event).await
    }

    // ---- Extension points ----------------------------------------------

    pub async fn extend_model(&self, model: impl Into<String>, extension: ModelExtension) {
        let mut st = self.state.write().await;
        st.extensions.extend_model(model, extension);
    }

    pub async fn extend_view(&self, view: impl Into<String>, extension: ViewExtension) {
        let mut st = self.state.write().await;
        st.extensions.extend_view(view, extension);
    }

    pub async fn extend_menu(&self, menu: impl Into<String>, extension: MenuExtension) {
        let mut st = self.state.write().await;
        st.extensions.extend_menu(menu, extension);
    }

    /// Patches recorded against a model, in registration order
    pub async fn model_extensions(&self, model: &str) -> Vec<ModelExtension> {
        let st = self.state.read().await;
        st.extensions.models.get(model).cloned().unwrap_or_default()
    }

    pub async fn view_extensions(&self, view: &str) -> Vec<ViewExtension> {
        let st = self.state.read().await;
        st.extensions.views.get(view).cloned().unwrap_or_default()
    }

    pub async fn menu_extensions(&self, menu: &str) -> Vec<MenuExtension> {
        let st = self.state.read().await;
        st.extensions.menus.get(menu).cloned().unwrap_or_default()
    }

    // ---- Named hooks ---------------------------------------------------

    /// Register a handler under a named hook point
    pub async fn register_hook<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HookError>> + Send + 'static,
    {
        let handler: NamedHook = Arc::new(move |args| Box::pin(handler(args)));
        let mut st = self.state.write().await;
        st.named_hooks.entry(name.into()).or_default().push(handler);
    }

    /// Run every handler registered under a name, collecting results
    ///
    /// Handlers run sequentially in registration order. A failing
    /// handler is logged and skipped; it never blocks the others.
    pub async fn execute_hook(&self, name: &str, args: Value) -> Vec<Value> {
        let handlers = {
            let st = self.state.read().await;
            st.named_hooks.get(name).cloned().unwrap_or_default()
        };

        let mut results = Vec::with_capacity(handlers.len());
        for handler in handlers {
            match handler(args.clone()).await {
                Ok(value) => results.push(value),
                Err(e) => warn!("Hook execution failed: {}: {}", name, e),
            }
        }
        results
    }

    // ---- Introspection --------------------------------------------------

    /// Debugging snapshot of everything the registry tracks
    pub async fn report(&self) -> RegistryReport {
        let (registered, instances, extensions, hooks) = {
            let st = self.state.read().await;

            let mut registered: Vec<RegisteredSummary> = st
                .entries
                .values()
                .map(|e| RegisteredSummary {
                    id: e.manifest.id.clone(),
                    version: e.manifest.version.clone(),
                    source: e.source,
                })
                .collect();
            registered.sort_by(|a, b| a.id.cmp(&b.id));

            let mut instances: Vec<InstanceSummary> = st
                .instances
                .values()
                .map(|i| InstanceSummary {
                    id: i.manifest.id.clone(),
                    state: i.state,
                    version: i.installed_version.clone(),
                })
                .collect();
            instances.sort_by(|a, b| a.id.cmp(&b.id));

            let extensions = ExtensionSummary {
                models: sorted_keys(&st.extensions.models),
                views: sorted_keys(&st.extensions.views),
                menus: sorted_keys(&st.extensions.menus),
            };

            (registered, instances, extensions, sorted_keys(&st.named_hooks))
        };

        RegistryReport {
            registered,
            instances,
            extensions,
            hooks,
            loaded_assets: self.loader.tracked_assets().await,
        }
    }

    // ---- Internals ------------------------------------------------------

    /// Record a state change on an instance, creating a transient
    /// instance from the registered manifest when none exists yet
    ///
    /// With an error message this also sets `last_error`, emits the
    /// error event, and runs the module's `on_error` hook; hook failures
    /// here are logged, never propagated.
    async fn update_state(&self, id: &str, state: ModuleState, error: Option<String>) {
        let on_error = {
            let mut st = self.state.write().await;

            if !st.instances.contains_key(id) {
                let Some(manifest) = st.entries.get(id).map(|e| Arc::clone(&e.manifest)) else {
                    return;
                };
                st.instances
                    .insert(id.to_string(), ModuleInstance::transient(manifest, state));
            }

            let Some(instance) = st.instances.get_mut(id) else {
                return;
            };
            instance.state = state;
            debug!("Module {} state: {}", id, state);

            if let Some(message) = &error {
                instance.last_error = Some(message.clone());
            }
            instance.manifest.hooks.on_error.clone()
        };

        let Some(message) = error else {
            return;
        };

        self.events
            .emit(
                EventPayload::new(id, ModuleEvent::Error)
                    .with_data(json!({ "error": message.clone() })),
            )
            .await;

        if let Some(hook) = on_error {
            if let Err(e) = hook(message).await {
                error!("Module hook failed: {}.on_error: {}", id, e);
            }
        }
    }

    async fn fail_transition(&self, id: &str, err: &RegistryError) {
        self.update_state(id, ModuleState::Error, Some(err.to_string()))
            .await;
    }

    /// Snapshot all instances through the state store
    ///
    /// The in-memory map stays authoritative: a failed save is logged
    /// and swallowed unless `require_persistence` is set.
    async fn persist(&self) -> Result<(), RegistryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let snapshot = {
            let st = self.state.read().await;
            let mut instances: Vec<InstanceSnapshot> = st
                .instances
                .values()
                .map(|inst| InstanceSnapshot {
                    id: inst.manifest.id.clone(),
                    state: inst.state,
                    config: inst.config.clone(),
                    installed_version: inst.installed_version.clone(),
                    installed_at: inst.installed_at,
                    enabled_at: inst.enabled_at,
                    last_error: inst.last_error.clone(),
                    exports: inst.exports.clone(),
                })
                .collect();
            instances.sort_by(|a, b| a.id.cmp(&b.id));
            RegistrySnapshot::new(instances)
        };

        match store.save_state(&snapshot).await {
            Ok(()) => Ok(()),
            Err(e) if self.config.require_persistence => {
                Err(RegistryError::Persistence(e.to_string()))
            }
            Err(e) => {
                warn!("Failed to persist registry state: {}", e);
                Ok(())
            }
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

/// Snapshot returned by [`ModuleRegistry::report`]
#[derive(Debug, Clone, Serialize)]
pub struct RegistryReport {
    pub registered: Vec<RegisteredSummary>,
    pub instances: Vec<InstanceSummary>,
    pub extensions: ExtensionSummary,
    pub hooks: Vec<String>,
    pub loaded_assets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredSummary {
    pub id: String,
    pub version: String,
    pub source: ModuleSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub state: ModuleState,
    pub version: Option<Version>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionSummary {
    pub models: Vec<String>,
    pub views: Vec<String>,
    pub menus: Vec<String>,
}
