//! Modkit - Embeddable module lifecycle and dependency management core
//!
//! This crate provides the machinery an application needs to host pluggable
//! modules: a registry of declarative manifests, dependency resolution with
//! cycle and version-conflict detection, an install/enable/disable/uninstall/
//! upgrade state machine with user-supplied hooks at every phase, asset
//! loading with script-order guarantees, and a pub/sub bus for lifecycle
//! events. It deliberately stops short of rendering, networking, and module
//! sandboxing; those stay in the host application.
//!
//! ## Architecture
//!
//! 1. [`ModuleManifest`] (declarative description) feeds
//! 2. [`ModuleRegistry`] (the lifecycle orchestrator), which drives
//! 3. [`resolver`] (stateless graph traversals) and [`loader`] (assets +
//!    load hooks), and publishes to
//! 4. [`events`] (pub/sub fan-out), persisting through [`persist`].
//!
//! ## Usage
//!
//! ```no_run
//! use modkit::{ModuleManifest, ModuleRegistry, RegistryConfig};
//!
//! # async fn demo() -> Result<(), modkit::RegistryError> {
//! let registry = ModuleRegistry::new(RegistryConfig::default());
//!
//! let manifest = ModuleManifest::from_toml_file("modules/crm.toml")?;
//! registry.register(manifest, None).await?;
//!
//! // Restore persisted state, then auto-install/auto-enable flagged modules
//! registry.startup().await?;
//!
//! registry.install("crm").await?;
//! registry.enable("crm").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod manifest;
pub mod persist;
pub mod registry;
pub mod resolver;
pub mod utils;

// Re-export the types most hosts touch
pub use config::{LoggingConfig, RegistryConfig};
pub use error::RegistryError;
pub use events::{EventBus, EventPayload, ModuleEvent, SubscriptionId};
pub use loader::{AssetFetcher, AssetKind, AssetLoader, NoopFetcher};
pub use manifest::{
    error_hook, hook, upgrade_hook, HookError, HookPhase, LifecycleHooks, ManifestValidator,
    ModuleDependency, ModuleManifest, ValidationReport,
};
pub use persist::{InstanceSnapshot, JsonFileStore, MemoryStateStore, RegistrySnapshot, StateStore};
pub use registry::{
    exports_loader, ExportsLoader, ModuleFilter, ModuleInstance, ModuleRegistry, ModuleSource,
    ModuleState, RegistryBuilder, RegistryReport,
};
pub use resolver::{DependencyReport, DependencyResolver, DependencyTree, RegistryView};
