//! Module manifests and declared surfaces
//!
//! A manifest describes everything the registry needs to know about a
//! module before any code runs: identity, version, dependencies and
//! conflicts, the UI/data surfaces it contributes (routes, menus, models,
//! views, settings, permissions), static assets, and default configuration.
//! Manifests are plain data and load from TOML or JSON files; lifecycle
//! hooks are attached programmatically and never serialized.

pub mod hooks;
pub mod validator;
pub mod version;

pub use hooks::{
    error_hook, hook, upgrade_hook, ErrorHookFn, HookError, HookFn, HookFuture, HookPhase,
    LifecycleHooks, UpgradeHookFn,
};
pub use validator::{ManifestValidator, ValidationReport};
pub use version::{parse_range, parse_version, range_matches};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryError;

/// Module manifest
///
/// The complete declaration of one module. All collection fields default
/// to empty so file manifests only spell out what they use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module id (lowercase letters, digits, `-`, `_`)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Declared version (strict semver)
    pub version: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Module author
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Coarse grouping used by catalog filters
    #[serde(default)]
    pub category: ModuleCategory,
    /// Free-form tags used by catalog filters
    #[serde(default)]
    pub tags: Vec<String>,
    /// Modules this one depends on
    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
    /// Module ids that must not be installed alongside this one
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Load-order priority; higher loads first
    #[serde(default)]
    pub priority: i64,
    /// Install automatically at registry startup
    #[serde(default)]
    pub auto_install: bool,
    /// Enable automatically at registry startup once installed
    #[serde(default)]
    pub auto_enable: bool,
    #[serde(default)]
    pub routes: Vec<ModuleRoute>,
    #[serde(default)]
    pub menus: Vec<ModuleMenu>,
    #[serde(default)]
    pub models: Vec<ModuleModel>,
    #[serde(default)]
    pub views: Vec<ModuleView>,
    #[serde(default)]
    pub settings: Vec<ModuleSetting>,
    #[serde(default)]
    pub permissions: Vec<ModulePermission>,
    /// Static assets fetched when the module is enabled
    #[serde(default)]
    pub assets: ModuleAssets,
    /// Default configuration applied at install time
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Module whose surfaces this one patches in place
    #[serde(default)]
    pub extends: Option<String>,
    /// Modules whose surfaces this one inherits copies of
    #[serde(default)]
    pub inherits: Vec<String>,
    /// Lifecycle callbacks; never serialized
    #[serde(skip)]
    pub hooks: LifecycleHooks,
}

impl ModuleManifest {
    /// Build a minimal manifest with everything else defaulted
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Load a manifest from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RegistryError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            RegistryError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })
    }

    /// Load a manifest from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RegistryError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            RegistryError::InvalidManifest(format!("Failed to parse manifest JSON: {}", e))
        })
    }
}

/// Coarse module grouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Academic,
    Administrative,
    Communication,
    Finance,
    Hr,
    Reporting,
    System,
    Integration,
    #[default]
    Custom,
}

/// Declared dependency on another module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDependency {
    /// Id of the module depended on
    pub id: String,
    /// Acceptable version range; `None` accepts any installed version
    #[serde(default)]
    pub version_range: Option<String>,
    /// Required dependencies are installed and enabled transitively;
    /// optional ones are only version-checked when present
    #[serde(default = "default_required")]
    pub required: bool,
    /// Free-form note on why the dependency exists
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_required() -> bool {
    true
}

impl ModuleDependency {
    /// Required dependency with no version constraint
    pub fn required(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_range: None,
            required: true,
            reason: None,
        }
    }

    /// Optional dependency with no version constraint
    pub fn optional(id: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(id)
        }
    }

    /// Attach a version range
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }
}

/// Static assets a module ships
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleAssets {
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub fonts: Vec<String>,
    #[serde(default)]
    pub images: HashMap<String, String>,
    #[serde(default)]
    pub icons: HashMap<String, String>,
}

impl ModuleAssets {
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
            && self.scripts.is_empty()
            && self.fonts.is_empty()
            && self.images.is_empty()
            && self.icons.is_empty()
    }
}

/// Route contributed by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRoute {
    /// Route path; must start with `/`
    pub path: String,
    /// Name of the component rendered at this path
    pub component: String,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub layout: Option<String>,
    /// Route requires an authenticated session
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub meta: Option<RouteMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Menu entry contributed by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleMenu {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Parent menu id for nesting across modules
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub children: Vec<ModuleMenu>,
}

/// Data model contributed by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleModel {
    pub name: String,
    #[serde(default)]
    pub table_name: Option<String>,
    pub fields: Vec<ModelField>,
    #[serde(default)]
    pub relations: Vec<ModelRelation>,
    /// Model whose fields this one inherits a copy of
    #[serde(default)]
    pub inherits: Option<String>,
    /// Model this one extends in place
    #[serde(default)]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub sortable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Json,
    Relation,
    File,
    Computed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRelation {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Target model name
    pub model: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Join model for many-to-many relations
    #[serde(default)]
    pub through: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// View contributed by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleView {
    pub id: String,
    pub name: String,
    /// Model the view presents
    pub model: String,
    #[serde(rename = "type")]
    pub kind: ViewKind,
    #[serde(default)]
    pub template: Option<String>,
    /// Field names shown, in order
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<ViewFilter>,
    /// View whose definition this one inherits a copy of
    #[serde(default)]
    pub inherits: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    List,
    Form,
    Kanban,
    Calendar,
    Graph,
    Pivot,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFilter {
    pub id: String,
    pub name: String,
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<Value>,
    /// Applied by default when the view opens
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
    Between,
}

/// User-tunable setting declared by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSetting {
    /// Config key the setting writes to
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: SettingKind,
    #[serde(default)]
    pub default: Option<Value>,
    /// Choices for select and multi-select settings
    #[serde(default)]
    pub options: Vec<SettingOption>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub required: bool,
    /// Extra validation beyond the type check; never serialized
    #[serde(skip)]
    pub validation: Option<SettingValidator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingKind {
    String,
    Number,
    Boolean,
    Select,
    MultiSelect,
    Json,
    Color,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingOption {
    pub label: String,
    pub value: Value,
}

/// Custom validation callback for one setting
#[derive(Clone)]
pub struct SettingValidator(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl SettingValidator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for SettingValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SettingValidator(..)")
    }
}

/// Permission declared by a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulePermission {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Granted to all users unless revoked
    #[serde(default)]
    pub default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_manifest_parses_with_defaults() {
        let toml = r#"
            id = "crm"
            name = "CRM"
            version = "1.0.0"
        "#;

        let manifest: ModuleManifest = toml::from_str(toml).unwrap();
        assert_eq!(manifest.id, "crm");
        assert_eq!(manifest.category, ModuleCategory::Custom);
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.conflicts.is_empty());
        assert!(!manifest.auto_install);
        assert!(manifest.hooks.phases().is_empty());
    }

    #[test]
    fn dependency_required_defaults_to_true() {
        let toml = r#"
            id = "crm"
            name = "CRM"
            version = "1.0.0"

            [[dependencies]]
            id = "base"
            version_range = "^1.0.0"
        "#;

        let manifest: ModuleManifest = toml::from_str(toml).unwrap();
        assert!(manifest.dependencies[0].required);
        assert_eq!(
            manifest.dependencies[0].version_range.as_deref(),
            Some("^1.0.0")
        );
    }

    #[test]
    fn surface_types_parse_from_json() {
        let json = r#"{
            "id": "inventory",
            "name": "Inventory",
            "version": "2.1.0",
            "models": [{
                "name": "item",
                "fields": [
                    { "name": "sku", "type": "string", "required": true, "unique": true },
                    { "name": "count", "type": "number" }
                ],
                "relations": [
                    { "type": "many-to-one", "model": "warehouse" }
                ]
            }],
            "views": [{
                "id": "item-list",
                "name": "Items",
                "model": "item",
                "type": "list",
                "filters": [
                    { "id": "low", "name": "Low stock", "field": "count", "operator": "lt", "value": 10 }
                ]
            }],
            "settings": [{
                "key": "threshold",
                "name": "Low stock threshold",
                "type": "number",
                "default": 10
            }]
        }"#;

        let manifest: ModuleManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.models[0].fields[0].kind, FieldKind::String);
        assert_eq!(manifest.models[0].relations[0].kind, RelationKind::ManyToOne);
        assert_eq!(manifest.views[0].kind, ViewKind::List);
        assert_eq!(manifest.views[0].filters[0].operator, FilterOperator::Lt);
        assert_eq!(manifest.settings[0].kind, SettingKind::Number);
    }

    #[test]
    fn multi_select_kind_uses_kebab_case() {
        let json = r#"{ "key": "k", "name": "n", "type": "multi-select" }"#;
        let setting: ModuleSetting = serde_json::from_str(json).unwrap();
        assert_eq!(setting.kind, SettingKind::MultiSelect);
    }
}
