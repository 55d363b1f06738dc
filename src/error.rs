//! Error types for the module registry
//!
//! Every fallible registry, resolver, and loader operation returns
//! [`RegistryError`]. Precondition failures (unknown id, illegal re-entry)
//! are raised before any state mutation; failures that occur mid-transition
//! additionally park the affected instance in the error state with
//! `last_error` set.

use thiserror::Error;

use crate::manifest::HookPhase;

/// Module registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Manifest file could not be read or parsed
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Manifest failed structural validation
    #[error("Invalid module manifest: {}", errors.join(", "))]
    Validation { errors: Vec<String> },

    /// Manifest declares a conflict with a currently installed module
    #[error("Module {module} conflicts with installed: {}", installed.join(", "))]
    Conflict {
        module: String,
        installed: Vec<String>,
    },

    /// No entry registered under this id
    #[error("Module not found: {0}")]
    NotFound(String),

    /// No instance exists for this id
    #[error("Module not installed: {0}")]
    NotInstalled(String),

    /// Instance already exists in a non-uninstalled state
    #[error("Module already installed: {0}")]
    AlreadyInstalled(String),

    /// Dependency walk re-entered a module still being visited
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Required dependency is neither registered nor installed
    #[error("Required dependency not found: {module} (required by {required_by})")]
    MissingDependency { module: String, required_by: String },

    /// Installed dependency version falls outside the declared range
    #[error("Version mismatch: {module} requires {required}, but {installed} is installed")]
    VersionMismatch {
        module: String,
        required: String,
        installed: String,
    },

    /// Version or range string failed to parse
    #[error("Invalid version {value:?}: {reason}")]
    InvalidVersion { value: String, reason: String },

    /// Operation refused because other modules require this one
    #[error("Module {module} is required by: {}", dependents.join(", "))]
    DependencyInUse {
        module: String,
        dependents: Vec<String>,
    },

    /// A lifecycle hook returned an error
    #[error("Module hook failed: {module}.{phase}: {message}")]
    Hook {
        module: String,
        phase: HookPhase,
        message: String,
    },

    /// Asset fetch or module payload loading failed
    #[error("Failed to load module {module}: {message}")]
    Loader { module: String, message: String },

    /// State store rejected a snapshot save or load
    #[error("State persistence failed: {0}")]
    Persistence(String),
}

impl From<anyhow::Error> for RegistryError {
    fn from(e: anyhow::Error) -> Self {
        RegistryError::Persistence(e.to_string())
    }
}
