//! Lifecycle hook callbacks
//!
//! Hooks form a closed set of optional async callbacks keyed by lifecycle
//! phase. They are supplied programmatically when a manifest is built and
//! are never serialized; manifests loaded from files simply carry none.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use semver::Version;

/// Error type returned by hook callbacks
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by hook callbacks
pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send>>;

/// Plain lifecycle hook callback
pub type HookFn = Arc<dyn Fn() -> HookFuture + Send + Sync>;

/// Upgrade hook callback, receiving (from, to) versions
pub type UpgradeHookFn = Arc<dyn Fn(Version, Version) -> HookFuture + Send + Sync>;

/// Error hook callback, receiving the failure message
pub type ErrorHookFn = Arc<dyn Fn(String) -> HookFuture + Send + Sync>;

/// Wrap an async closure into a [`HookFn`]
pub fn hook<F, Fut>(f: F) -> HookFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Wrap an async closure into an [`UpgradeHookFn`]
pub fn upgrade_hook<F, Fut>(f: F) -> UpgradeHookFn
where
    F: Fn(Version, Version) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    Arc::new(move |from, to| Box::pin(f(from, to)))
}

/// Wrap an async closure into an [`ErrorHookFn`]
pub fn error_hook<F, Fut>(f: F) -> ErrorHookFn
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// Lifecycle phase identifier, used in hook failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeInstall,
    OnInstall,
    AfterInstall,
    BeforeEnable,
    OnEnable,
    AfterEnable,
    BeforeDisable,
    OnDisable,
    AfterDisable,
    BeforeUninstall,
    OnUninstall,
    AfterUninstall,
    BeforeUpgrade,
    OnUpgrade,
    AfterUpgrade,
    OnLoad,
    OnUnload,
    OnError,
}

impl HookPhase {
    /// Phase name as it appears in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::BeforeInstall => "before_install",
            HookPhase::OnInstall => "on_install",
            HookPhase::AfterInstall => "after_install",
            HookPhase::BeforeEnable => "before_enable",
            HookPhase::OnEnable => "on_enable",
            HookPhase::AfterEnable => "after_enable",
            HookPhase::BeforeDisable => "before_disable",
            HookPhase::OnDisable => "on_disable",
            HookPhase::AfterDisable => "after_disable",
            HookPhase::BeforeUninstall => "before_uninstall",
            HookPhase::OnUninstall => "on_uninstall",
            HookPhase::AfterUninstall => "after_uninstall",
            HookPhase::BeforeUpgrade => "before_upgrade",
            HookPhase::OnUpgrade => "on_upgrade",
            HookPhase::AfterUpgrade => "after_upgrade",
            HookPhase::OnLoad => "on_load",
            HookPhase::OnUnload => "on_unload",
            HookPhase::OnError => "on_error",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional lifecycle callbacks for one module
///
/// All fields default to `None`; a manifest without hooks passes through
/// every transition silently.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub before_install: Option<HookFn>,
    pub on_install: Option<HookFn>,
    pub after_install: Option<HookFn>,

    pub before_enable: Option<HookFn>,
    pub on_enable: Option<HookFn>,
    pub after_enable: Option<HookFn>,

    pub before_disable: Option<HookFn>,
    pub on_disable: Option<HookFn>,
    pub after_disable: Option<HookFn>,

    pub before_uninstall: Option<HookFn>,
    pub on_uninstall: Option<HookFn>,
    pub after_uninstall: Option<HookFn>,

    pub before_upgrade: Option<UpgradeHookFn>,
    pub on_upgrade: Option<UpgradeHookFn>,
    pub after_upgrade: Option<UpgradeHookFn>,

    pub on_load: Option<HookFn>,
    pub on_unload: Option<HookFn>,
    pub on_error: Option<ErrorHookFn>,
}

impl LifecycleHooks {
    /// Phases that have a callback attached
    pub fn phases(&self) -> Vec<HookPhase> {
        let mut set = Vec::new();
        let mut push = |present: bool, phase: HookPhase| {
            if present {
                set.push(phase);
            }
        };

        push(self.before_install.is_some(), HookPhase::BeforeInstall);
        push(self.on_install.is_some(), HookPhase::OnInstall);
        push(self.after_install.is_some(), HookPhase::AfterInstall);
        push(self.before_enable.is_some(), HookPhase::BeforeEnable);
        push(self.on_enable.is_some(), HookPhase::OnEnable);
        push(self.after_enable.is_some(), HookPhase::AfterEnable);
        push(self.before_disable.is_some(), HookPhase::BeforeDisable);
        push(self.on_disable.is_some(), HookPhase::OnDisable);
        push(self.after_disable.is_some(), HookPhase::AfterDisable);
        push(self.before_uninstall.is_some(), HookPhase::BeforeUninstall);
        push(self.on_uninstall.is_some(), HookPhase::OnUninstall);
        push(self.after_uninstall.is_some(), HookPhase::AfterUninstall);
        push(self.before_upgrade.is_some(), HookPhase::BeforeUpgrade);
        push(self.on_upgrade.is_some(), HookPhase::OnUpgrade);
        push(self.after_upgrade.is_some(), HookPhase::AfterUpgrade);
        push(self.on_load.is_some(), HookPhase::OnLoad);
        push(self.on_unload.is_some(), HookPhase::OnUnload);
        push(self.on_error.is_some(), HookPhase::OnError);

        set
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("phases", &self.phases())
            .finish()
    }
}

/// Run an optional lifecycle hook, mapping failure into a hook error
///
/// Absent hooks succeed silently. A failing hook is logged and surfaced
/// as [`RegistryError::Hook`] carrying the module id and phase.
pub async fn run_hook(
    module: &str,
    phase: HookPhase,
    hook: Option<&HookFn>,
) -> Result<(), crate::error::RegistryError> {
    let Some(hook) = hook else {
        return Ok(());
    };

    if let Err(e) = hook().await {
        tracing::error!("Module hook failed: {}.{}: {}", module, phase, e);
        return Err(crate::error::RegistryError::Hook {
            module: module.to_string(),
            phase,
            message: e.to_string(),
        });
    }

    Ok(())
}

/// Run an optional upgrade hook with the (from, to) version pair
pub async fn run_upgrade_hook(
    module: &str,
    phase: HookPhase,
    hook: Option<&UpgradeHookFn>,
    from: &Version,
    to: &Version,
) -> Result<(), crate::error::RegistryError> {
    let Some(hook) = hook else {
        return Ok(());
    };

    if let Err(e) = hook(from.clone(), to.clone()).await {
        tracing::error!("Module hook failed: {}.{}: {}", module, phase, e);
        return Err(crate::error::RegistryError::Hook {
            module: module.to_string(),
            phase,
            message: e.to_string(),
        });
    }

    Ok(())
}
