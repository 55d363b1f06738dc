//! Cross-module surface extensions
//!
//! Modules can graft fields onto another module's models, filters onto its
//! views, and children onto its menus without touching the owning manifest.
//! Extensions are additive patches accumulated per target name and replayed
//! by whoever renders the surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::manifest::{ModelField, ModelRelation, ModuleMenu, ViewFilter};

/// Additive patch against a named model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelExtension {
    #[serde(default)]
    pub fields: Vec<ModelField>,
    #[serde(default)]
    pub relations: Vec<ModelRelation>,
}

/// Additive patch against a named view
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewExtension {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<ViewFilter>,
}

/// Additive patch against a named menu
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuExtension {
    #[serde(default)]
    pub children: Vec<ModuleMenu>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

/// Accumulated extensions, keyed by target name
#[derive(Debug, Clone, Default)]
pub(crate) struct ExtensionStore {
    pub models: HashMap<String, Vec<ModelExtension>>,
    pub views: HashMap<String, Vec<ViewExtension>>,
    pub menus: HashMap<String, Vec<MenuExtension>>,
}

impl ExtensionStore {
    pub fn extend_model(&mut self, name: impl Into<String>, extension: ModelExtension) {
        self.models.entry(name.into()).or_default().push(extension);
    }

    pub fn extend_view(&mut self, name: impl Into<String>, extension: ViewExtension) {
        self.views.entry(name.into()).or_default().push(extension);
    }

    pub fn extend_menu(&mut self, name: impl Into<String>, extension: MenuExtension) {
        self.menus.entry(name.into()).or_default().push(extension);
    }
}
