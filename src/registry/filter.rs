//! Instance filtering for catalog queries

use serde::{Deserialize, Serialize};

use super::instance::{ModuleInstance, ModuleState};
use crate::manifest::ModuleCategory;

/// Filter for [`ModuleRegistry::modules`](super::ModuleRegistry::modules)
///
/// Empty collections and `None` fields are unset; set fields are ANDed
/// together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleFilter {
    /// Match any of these lifecycle states
    #[serde(default)]
    pub state: Vec<ModuleState>,
    /// Match any of these categories
    #[serde(default)]
    pub category: Vec<ModuleCategory>,
    /// Match instances sharing at least one tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring over id, name, and description
    #[serde(default)]
    pub search: Option<String>,
    /// `true` keeps only enabled instances, `false` only non-enabled
    #[serde(default)]
    pub enabled: Option<bool>,
    /// `true` keeps only installed instances, `false` only uninstalled
    #[serde(default)]
    pub installed: Option<bool>,
}

impl ModuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: ModuleState) -> Self {
        self.state.push(state);
        self
    }

    pub fn with_category(mut self, category: ModuleCategory) -> Self {
        self.category.push(category);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn installed(mut self, installed: bool) -> Self {
        self.installed = Some(installed);
        self
    }

    pub(crate) fn matches(&self, instance: &ModuleInstance) -> bool {
        if !self.state.is_empty() && !self.state.contains(&instance.state) {
            return false;
        }

        if !self.category.is_empty() && !self.category.contains(&instance.manifest.category) {
            return false;
        }

        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|tag| instance.manifest.tags.contains(tag))
        {
            return false;
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let manifest = &instance.manifest;
            let hit = manifest.name.to_lowercase().contains(&needle)
                || manifest.description.to_lowercase().contains(&needle)
                || manifest.id.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }

        if let Some(enabled) = self.enabled {
            if enabled != (instance.state == ModuleState::Enabled) {
                return false;
            }
        }

        if let Some(installed) = self.installed {
            if installed != (instance.state != ModuleState::Uninstalled) {
                return false;
            }
        }

        true
    }
}
