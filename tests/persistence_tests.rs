//! State persistence and startup restoration

mod common;
use common::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use modkit::{
    InstanceSnapshot, MemoryStateStore, ModuleRegistry, ModuleState, RegistryConfig,
    RegistryError, RegistrySnapshot, StateStore,
};

fn file_config(dir: &tempfile::TempDir) -> RegistryConfig {
    RegistryConfig {
        state_path: Some(dir.path().join("state.json").to_string_lossy().into_owned()),
        ..RegistryConfig::default()
    }
}

#[tokio::test]
async fn state_survives_a_registry_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let reg = ModuleRegistry::new(file_config(&dir));
        reg.register(manifest("crm", "1.2.0"), None).await.unwrap();
        reg.install("crm").await.unwrap();
        reg.enable("crm").await.unwrap();
        reg.set_config("crm", "limit", json!(25)).await.unwrap();
    }

    let reg = ModuleRegistry::new(file_config(&dir));
    reg.register(manifest("crm", "1.2.0"), None).await.unwrap();
    assert!(reg.module("crm").await.is_none());

    reg.startup().await.unwrap();

    let module = reg.module("crm").await.unwrap();
    assert_eq!(module.state, ModuleState::Enabled);
    assert_eq!(module.installed_version, Some(semver::Version::new(1, 2, 0)));
    assert_eq!(module.config["limit"], json!(25));
}

#[tokio::test]
async fn snapshots_for_unregistered_ids_are_dropped() {
    let store = Arc::new(MemoryStateStore::new());

    {
        let reg = ModuleRegistry::builder()
            .with_store(Arc::clone(&store) as _)
            .build();
        reg.register(manifest("crm", "1.0.0"), None).await.unwrap();
        reg.install("crm").await.unwrap();
    }

    let reg = ModuleRegistry::builder()
        .with_store(Arc::clone(&store) as _)
        .build();
    reg.register(manifest("hr", "1.0.0"), None).await.unwrap();
    reg.startup().await.unwrap();

    assert!(reg.module("crm").await.is_none());
    assert!(reg.module("hr").await.is_none());
}

#[tokio::test]
async fn failing_store_is_fatal_only_when_required() {
    let strict = ModuleRegistry::builder()
        .with_config(RegistryConfig {
            require_persistence: true,
            ..RegistryConfig::default()
        })
        .with_store(Arc::new(FailingStore) as _)
        .build();
    strict.register(manifest("crm", "1.0.0"), None).await.unwrap();

    assert!(matches!(
        strict.install("crm").await,
        Err(RegistryError::Persistence(_))
    ));

    let lenient = ModuleRegistry::builder()
        .with_store(Arc::new(FailingStore) as _)
        .build();
    lenient.register(manifest("crm", "1.0.0"), None).await.unwrap();

    lenient.install("crm").await.unwrap();
    assert_eq!(
        lenient.module("crm").await.unwrap().state,
        ModuleState::Installed
    );
}

#[tokio::test]
async fn autostart_walks_flagged_modules_and_skips_failures() {
    let reg = registry();

    // Sorts first and fails to install; must not block the others
    let mut broken = manifest_with_deps("alpha", "1.0.0", &[("ghost", None)]);
    broken.auto_install = true;

    let mut install_only = manifest("beta", "1.0.0");
    install_only.auto_install = true;

    let mut full = manifest("gamma", "1.0.0");
    full.auto_install = true;
    full.auto_enable = true;

    let manual = manifest("delta", "1.0.0");

    for m in [broken, install_only, full, manual] {
        reg.register(m, None).await.unwrap();
    }

    reg.startup().await.unwrap();

    assert_eq!(reg.module("alpha").await.unwrap().state, ModuleState::Error);
    assert_eq!(reg.module("beta").await.unwrap().state, ModuleState::Installed);
    assert_eq!(reg.module("gamma").await.unwrap().state, ModuleState::Enabled);
    assert!(reg.module("delta").await.is_none());
}

#[tokio::test]
async fn restored_cycle_fails_enable_instead_of_hanging() {
    fn installed(id: &str) -> InstanceSnapshot {
        InstanceSnapshot {
            id: id.to_string(),
            state: ModuleState::Installed,
            config: HashMap::new(),
            installed_version: Some(semver::Version::new(1, 0, 0)),
            installed_at: Some(1_700_000_000),
            enabled_at: None,
            last_error: None,
            exports: None,
        }
    }

    // A snapshot can hold a dependency cycle the resolver never approved
    let store = Arc::new(MemoryStateStore::new());
    store
        .save_state(&RegistrySnapshot::new(vec![installed("a"), installed("b")]))
        .await
        .unwrap();

    let reg = ModuleRegistry::builder()
        .with_config(RegistryConfig {
            autostart: false,
            ..RegistryConfig::default()
        })
        .with_store(Arc::clone(&store) as _)
        .build();
    reg.register(manifest_with_deps("a", "1.0.0", &[("b", None)]), None)
        .await
        .unwrap();
    reg.register(manifest_with_deps("b", "1.0.0", &[("a", None)]), None)
        .await
        .unwrap();
    reg.startup().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), reg.enable("a"))
        .await
        .expect("enable must terminate on a cyclic snapshot");
    assert!(matches!(result, Err(RegistryError::CircularDependency(_))));
}

#[tokio::test]
async fn set_config_writes_through_to_the_store() {
    let store = Arc::new(MemoryStateStore::new());
    let reg = ModuleRegistry::builder()
        .with_store(Arc::clone(&store) as _)
        .build();

    reg.register(manifest("crm", "1.0.0"), None).await.unwrap();
    reg.install("crm").await.unwrap();
    reg.set_config("crm", "page_size", json!(50)).await.unwrap();

    let snapshot = store.load_state().await.unwrap().unwrap();
    let crm = snapshot.instances.iter().find(|i| i.id == "crm").unwrap();
    assert_eq!(crm.state, ModuleState::Installed);
    assert_eq!(crm.config["page_size"], json!(50));
}
