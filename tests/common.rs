//! Shared fixtures and builders for registry integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use modkit::manifest::hooks::{ErrorHookFn, HookFn, UpgradeHookFn};
use modkit::{
    error_hook, exports_loader, hook, upgrade_hook, AssetFetcher, AssetKind, ExportsLoader,
    HookError, ModuleDependency, ModuleManifest, ModuleRegistry, RegistrySnapshot, StateStore,
};

/// Minimal manifest: uppercase name, no dependencies, no hooks
pub fn manifest(id: &str, version: &str) -> ModuleManifest {
    ModuleManifest::new(id, id.to_uppercase(), version)
}

/// Manifest with required dependencies, each optionally range-constrained
pub fn manifest_with_deps(
    id: &str,
    version: &str,
    deps: &[(&str, Option<&str>)],
) -> ModuleManifest {
    let mut m = manifest(id, version);
    m.dependencies = deps
        .iter()
        .map(|(dep, range)| {
            let mut d = ModuleDependency::required(*dep);
            if let Some(range) = range {
                d = d.with_range(*range);
            }
            d
        })
        .collect();
    m
}

/// Registry with no store and the no-op fetcher
pub fn registry() -> ModuleRegistry {
    ModuleRegistry::default()
}

/// Exports loader producing a fixed value
pub fn static_exports(value: Value) -> ExportsLoader {
    exports_loader(move || {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// Chronological log shared between hooks and assertions
pub type TraceLog = Arc<Mutex<Vec<String>>>;

pub fn trace_log() -> TraceLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &TraceLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Hook that appends one entry to the log
pub fn tracer(log: &TraceLog, entry: &str) -> HookFn {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    hook(move || {
        let log = Arc::clone(&log);
        let entry = entry.clone();
        async move {
            log.lock().unwrap().push(entry);
            Ok(())
        }
    })
}

/// Upgrade hook that appends "<entry> <from> -> <to>"
pub fn upgrade_tracer(log: &TraceLog, entry: &str) -> UpgradeHookFn {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    upgrade_hook(move |from, to| {
        let log = Arc::clone(&log);
        let entry = entry.clone();
        async move {
            log.lock()
                .unwrap()
                .push(format!("{} {} -> {}", entry, from, to));
            Ok(())
        }
    })
}

/// Error hook that appends "<entry>: <message>"
pub fn error_tracer(log: &TraceLog, entry: &str) -> ErrorHookFn {
    let log = Arc::clone(log);
    let entry = entry.to_string();
    error_hook(move |message| {
        let log = Arc::clone(&log);
        let entry = entry.clone();
        async move {
            log.lock().unwrap().push(format!("{}: {}", entry, message));
            Ok(())
        }
    })
}

/// Hook that always fails with the given message
pub fn failing_hook(message: &'static str) -> HookFn {
    hook(move || async move { Err::<(), HookError>(message.into()) })
}

/// Attach tracing hooks for every install/enable/disable/uninstall phase,
/// logged as "<id>:<phase>"
pub fn with_tracing_hooks(mut m: ModuleManifest, log: &TraceLog) -> ModuleManifest {
    let id = m.id.clone();
    let t = |phase: &str| tracer(log, &format!("{}:{}", id, phase));

    m.hooks.before_install = Some(t("before_install"));
    m.hooks.on_install = Some(t("on_install"));
    m.hooks.after_install = Some(t("after_install"));
    m.hooks.before_enable = Some(t("before_enable"));
    m.hooks.on_enable = Some(t("on_enable"));
    m.hooks.after_enable = Some(t("after_enable"));
    m.hooks.before_disable = Some(t("before_disable"));
    m.hooks.on_disable = Some(t("on_disable"));
    m.hooks.after_disable = Some(t("after_disable"));
    m.hooks.before_uninstall = Some(t("before_uninstall"));
    m.hooks.on_uninstall = Some(t("on_uninstall"));
    m.hooks.after_uninstall = Some(t("after_uninstall"));
    m
}

/// Fetcher recording every call as "fetch|remove <kind> <module>:<url>";
/// urls listed in `fail` reject the fetch
#[derive(Default)]
pub struct RecordingFetcher {
    log: Mutex<Vec<String>>,
    fail: HashSet<String>,
}

impl RecordingFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            fail: urls.iter().map(|u| u.to_string()).collect(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetFetcher for RecordingFetcher {
    async fn fetch(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()> {
        if self.fail.contains(url) {
            anyhow::bail!("fetch rejected");
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("fetch {:?} {}:{}", kind, module_id, url));
        Ok(())
    }

    async fn remove(&self, module_id: &str, kind: AssetKind, url: &str) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("remove {:?} {}:{}", kind, module_id, url));
        Ok(())
    }
}

/// Store that loads nothing and rejects every save
pub struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn load_state(&self) -> anyhow::Result<Option<RegistrySnapshot>> {
        Ok(None)
    }

    async fn save_state(&self, _snapshot: &RegistrySnapshot) -> anyhow::Result<()> {
        anyhow::bail!("store unavailable")
    }
}
