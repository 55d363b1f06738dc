//! Manifest validation
//!
//! Structural checks applied before a manifest is accepted into the
//! registry, plus per-setting validation of configuration values. Errors
//! block registration; warnings are advisory and carried alongside.

use std::collections::HashSet;

use serde_json::Value;

use super::{version, ModuleManifest, ModuleSetting, SettingKind};

/// Outcome of validating a manifest
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural manifest and config-value validation
pub struct ManifestValidator;

impl ManifestValidator {
    /// Validate a manifest, collecting every error and warning
    pub fn validate(manifest: &ModuleManifest) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if manifest.id.is_empty() {
            errors.push("Module ID is required".to_string());
        } else if !is_valid_id(&manifest.id) {
            errors.push(
                "Module ID must contain only lowercase letters, numbers, hyphens, and underscores"
                    .to_string(),
            );
        }

        if manifest.name.is_empty() {
            errors.push("Module name is required".to_string());
        }

        if manifest.version.is_empty() {
            errors.push("Module version is required".to_string());
        } else if version::parse_version(&manifest.version).is_err() {
            errors.push("Module version must follow semver format (e.g., 1.0.0)".to_string());
        }

        if manifest.description.is_empty() {
            warnings.push("Module description is recommended".to_string());
        }

        if manifest.author.is_empty() {
            warnings.push("Module author is recommended".to_string());
        }

        for dep in &manifest.dependencies {
            if dep.id.is_empty() {
                errors.push("Dependency ID is required".to_string());
            }

            if let Some(range) = &dep.version_range {
                if version::parse_range(range).is_err() {
                    errors.push(format!("Invalid version format for dependency: {}", dep.id));
                }
            }
        }

        if manifest.dependencies.iter().any(|d| d.id == manifest.id) {
            errors.push("Module cannot depend on itself".to_string());
        }

        for route in &manifest.routes {
            if route.path.is_empty() {
                errors.push("Route path is required".to_string());
            } else if !route.path.starts_with('/') {
                errors.push(format!("Route path must start with /: {}", route.path));
            }

            if route.component.is_empty() {
                errors.push(format!(
                    "Route component is required for path: {}",
                    route.path
                ));
            }
        }

        let mut menu_ids = HashSet::new();
        for menu in &manifest.menus {
            if menu.id.is_empty() {
                errors.push("Menu ID is required".to_string());
            } else if !menu_ids.insert(menu.id.as_str()) {
                errors.push(format!("Duplicate menu ID: {}", menu.id));
            }

            if menu.name.is_empty() {
                errors.push(format!("Menu name is required for ID: {}", menu.id));
            }
        }

        for model in &manifest.models {
            if model.name.is_empty() {
                errors.push("Model name is required".to_string());
            }

            if model.fields.is_empty() {
                errors.push(format!("Model must have at least one field: {}", model.name));
            }

            let mut field_names = HashSet::new();
            for field in &model.fields {
                if field.name.is_empty() {
                    errors.push(format!("Field name is required in model: {}", model.name));
                } else if !field_names.insert(field.name.as_str()) {
                    errors.push(format!(
                        "Duplicate field name in model {}: {}",
                        model.name, field.name
                    ));
                }
            }
        }

        for view in &manifest.views {
            if view.id.is_empty() {
                errors.push("View ID is required".to_string());
            }

            if view.name.is_empty() {
                errors.push(format!("View name is required for ID: {}", view.id));
            }

            if view.model.is_empty() {
                errors.push(format!("View model is required for ID: {}", view.id));
            }
        }

        let mut setting_keys = HashSet::new();
        for setting in &manifest.settings {
            if setting.key.is_empty() {
                errors.push("Setting key is required".to_string());
            } else if !setting_keys.insert(setting.key.as_str()) {
                errors.push(format!("Duplicate setting key: {}", setting.key));
            }

            if setting.name.is_empty() {
                errors.push(format!("Setting name is required for key: {}", setting.key));
            }
        }

        let mut permission_ids = HashSet::new();
        for permission in &manifest.permissions {
            if permission.id.is_empty() {
                errors.push("Permission ID is required".to_string());
            } else if !permission_ids.insert(permission.id.as_str()) {
                errors.push(format!("Duplicate permission ID: {}", permission.id));
            }

            if permission.name.is_empty() {
                errors.push(format!("Permission name is required for ID: {}", permission.id));
            }

            if permission.category.as_deref().unwrap_or("").is_empty() {
                warnings.push(format!(
                    "Permission category is recommended for ID: {}",
                    permission.id
                ));
            }
        }

        if manifest.extends.is_some() && !manifest.inherits.is_empty() {
            errors.push("Module cannot both extend and inherit. Choose one.".to_string());
        }

        ValidationReport { errors, warnings }
    }

    /// Validate one configuration value against its setting declaration
    ///
    /// Checks run in order: type shape, the setting's custom validator,
    /// then the required constraint.
    pub fn validate_config_value(setting: &ModuleSetting, value: &Value) -> Result<(), String> {
        match setting.kind {
            SettingKind::String => {
                if !value.is_string() {
                    return Err("Value must be a string".to_string());
                }
            }
            SettingKind::Number => {
                // serde_json numbers are always finite, so no NaN check
                if !value.is_number() {
                    return Err("Value must be a number".to_string());
                }
            }
            SettingKind::Boolean => {
                if !value.is_boolean() {
                    return Err("Value must be a boolean".to_string());
                }
            }
            SettingKind::Select | SettingKind::MultiSelect => {
                if setting.options.is_empty() {
                    return Err("Options not defined for select field".to_string());
                }

                let allowed: Vec<&Value> = setting.options.iter().map(|o| &o.value).collect();
                if setting.kind == SettingKind::MultiSelect {
                    let items = value
                        .as_array()
                        .ok_or_else(|| "Value must be an array".to_string())?;
                    for item in items {
                        if !allowed.contains(&item) {
                            return Err(format!("Invalid value: {item}"));
                        }
                    }
                } else if !allowed.contains(&value) {
                    return Err("Invalid value".to_string());
                }
            }
            // Any JSON value is acceptable for these kinds
            SettingKind::Json | SettingKind::Color | SettingKind::File => {}
        }

        if let Some(validator) = &setting.validation {
            validator.check(value)?;
        }

        if setting.required && (value.is_null() || value.as_str() == Some("")) {
            return Err("Value is required".to_string());
        }

        Ok(())
    }
}

fn is_valid_id(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
