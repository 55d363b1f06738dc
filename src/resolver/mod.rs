//! Dependency resolution and ordering
//!
//! Stateless traversals over the dependency graph: install-order
//! resolution with cycle and version checking, enabled-module load
//! ordering, dependency health reports, and a bounded dependency tree
//! for diagnostics. The resolver reads registry state through the
//! [`RegistryView`] trait and never mutates anything.
//!
//! All unbounded walks are iterative with explicit stacks, so pathological
//! dependency chains exhaust neither the call stack nor the traversal
//! (each module is entered at most once).

use std::collections::HashSet;
use std::sync::Arc;

use semver::Version;
use serde::Serialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::manifest::{version, ModuleDependency, ModuleManifest};

/// Read-only view of registry state used during resolution
pub trait RegistryView: Send + Sync {
    /// Manifest registered under this id, if any
    fn entry_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>>;

    /// Manifest of the live instance under this id, if one exists
    fn instance_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>>;

    /// Version recorded when the instance was installed
    fn installed_version(&self, id: &str) -> Option<Version>;

    /// Ids and manifest priorities of currently enabled modules
    fn enabled_modules(&self) -> Vec<(String, i64)>;
}

/// Dependency health report for one manifest
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub satisfied: bool,
    /// Required dependencies with no live instance
    pub missing: Vec<String>,
    /// Dependencies whose installed version falls outside the range
    pub incompatible: Vec<IncompatibleDependency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncompatibleDependency {
    pub id: String,
    pub required: String,
    pub installed: Version,
}

/// Dependency tree node for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DependencyTree {
    Node {
        id: String,
        version: Option<Version>,
        dependencies: Vec<DependencyTree>,
    },
    Error {
        error: String,
    },
}

enum Step {
    Descend(ModuleDependency, String),
    Finish,
}

/// Stateless dependency graph traversals
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve the install order for a manifest
    ///
    /// Returns ids in post-order: dependencies before dependents, the
    /// manifest's own id last. Required dependencies are looked up by
    /// live instance first, then by registered entry; version ranges are
    /// checked against the installed version when an instance exists.
    /// Optional dependencies never affect ordering but are still
    /// version-checked when installed.
    pub fn resolve(
        view: &dyn RegistryView,
        manifest: &ModuleManifest,
    ) -> Result<Vec<String>, RegistryError> {
        debug!("Resolving dependencies for {}", manifest.id);

        let mut resolved: Vec<String> = Vec::new();
        let mut visiting: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();

        // (id, manifest, index of the next dependency to examine)
        let mut stack: Vec<(String, Arc<ModuleManifest>, usize)> = Vec::new();

        visiting.insert(manifest.id.clone());
        stack.push((manifest.id.clone(), Arc::new(manifest.clone()), 0));

        loop {
            let step = {
                let Some((id, node, next)) = stack.last_mut() else {
                    break;
                };
                if *next < node.dependencies.len() {
                    let dep = node.dependencies[*next].clone();
                    *next += 1;
                    Step::Descend(dep, id.clone())
                } else {
                    Step::Finish
                }
            };

            match step {
                Step::Descend(dep, parent_id) => {
                    if !dep.required {
                        Self::check_optional(view, &dep)?;
                        continue;
                    }

                    let dep_manifest = match view.instance_manifest(&dep.id) {
                        Some(m) => {
                            if let Some(range) = &dep.version_range {
                                let installed = view
                                    .installed_version(&dep.id)
                                    .unwrap_or_else(|| Version::new(0, 0, 0));
                                if !version::range_matches(&installed, range)? {
                                    return Err(RegistryError::VersionMismatch {
                                        module: dep.id.clone(),
                                        required: range.clone(),
                                        installed: installed.to_string(),
                                    });
                                }
                            }
                            m
                        }
                        None => view.entry_manifest(&dep.id).ok_or_else(|| {
                            RegistryError::MissingDependency {
                                module: dep.id.clone(),
                                required_by: parent_id,
                            }
                        })?,
                    };

                    if visiting.contains(&dep.id) {
                        return Err(RegistryError::CircularDependency(dep.id.clone()));
                    }
                    if visited.contains(&dep.id) {
                        continue;
                    }

                    visiting.insert(dep.id.clone());
                    stack.push((dep.id.clone(), dep_manifest, 0));
                }
                Step::Finish => {
                    if let Some((id, _, _)) = stack.pop() {
                        visiting.remove(&id);
                        visited.insert(id.clone());
                        resolved.push(id);
                    }
                }
            }
        }

        Ok(resolved)
    }

    fn check_optional(view: &dyn RegistryView, dep: &ModuleDependency) -> Result<(), RegistryError> {
        let (Some(_), Some(range)) = (view.instance_manifest(&dep.id), &dep.version_range) else {
            return Ok(());
        };

        let installed = view
            .installed_version(&dep.id)
            .unwrap_or_else(|| Version::new(0, 0, 0));
        if !version::range_matches(&installed, range)? {
            return Err(RegistryError::VersionMismatch {
                module: dep.id.clone(),
                required: range.clone(),
                installed: installed.to_string(),
            });
        }
        Ok(())
    }

    /// Startup activation order for enabled modules
    ///
    /// Roots are the enabled modules sorted by descending priority (id
    /// ascending as tiebreak), then placed in dependency order. Only
    /// enabled modules appear in the result; cycles terminate the walk
    /// rather than error, since enabled state implies they were resolved
    /// at install time.
    pub fn load_order(view: &dyn RegistryView) -> Vec<String> {
        let mut roots = view.enabled_modules();
        roots.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        debug!("Computing load order for {} enabled modules", roots.len());

        let enabled: HashSet<String> = roots.iter().map(|(id, _)| id.clone()).collect();

        enum Walk {
            Enter(String),
            Exit(String),
        }

        let mut ordered: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        for (root, _) in roots {
            let mut stack = vec![Walk::Enter(root)];
            while let Some(step) = stack.pop() {
                match step {
                    Walk::Enter(id) => {
                        if !enabled.contains(&id) || !visited.insert(id.clone()) {
                            continue;
                        }
                        let Some(manifest) = view.instance_manifest(&id) else {
                            continue;
                        };
                        stack.push(Walk::Exit(id));
                        for dep in manifest.dependencies.iter().rev() {
                            stack.push(Walk::Enter(dep.id.clone()));
                        }
                    }
                    Walk::Exit(id) => ordered.push(id),
                }
            }
        }

        ordered
    }

    /// Report which of a manifest's dependencies are missing or
    /// incompatible, without failing on the first problem
    pub fn check_dependencies(
        view: &dyn RegistryView,
        manifest: &ModuleManifest,
    ) -> DependencyReport {
        let mut missing = Vec::new();
        let mut incompatible = Vec::new();

        for dep in &manifest.dependencies {
            if view.instance_manifest(&dep.id).is_none() {
                if dep.required {
                    missing.push(dep.id.clone());
                }
                continue;
            }

            if let Some(range) = &dep.version_range {
                let installed = view
                    .installed_version(&dep.id)
                    .unwrap_or_else(|| Version::new(0, 0, 0));
                if !version::range_matches(&installed, range).unwrap_or(false) {
                    incompatible.push(IncompatibleDependency {
                        id: dep.id.clone(),
                        required: range.clone(),
                        installed,
                    });
                }
            }
        }

        DependencyReport {
            satisfied: missing.is_empty() && incompatible.is_empty(),
            missing,
            incompatible,
        }
    }

    /// Dependency tree rooted at an installed module
    ///
    /// Recursion is bounded by `max_depth`; deeper nodes and unknown ids
    /// appear as error leaves instead of failing the whole tree.
    pub fn dependency_tree(view: &dyn RegistryView, id: &str, max_depth: usize) -> DependencyTree {
        Self::tree_at(view, id, 0, max_depth)
    }

    fn tree_at(view: &dyn RegistryView, id: &str, depth: usize, max_depth: usize) -> DependencyTree {
        if depth > max_depth {
            return DependencyTree::Error {
                error: "Max depth exceeded".to_string(),
            };
        }

        let Some(manifest) = view.instance_manifest(id) else {
            return DependencyTree::Error {
                error: "Module not found".to_string(),
            };
        };

        DependencyTree::Node {
            id: id.to_string(),
            version: view.installed_version(id),
            dependencies: manifest
                .dependencies
                .iter()
                .map(|dep| Self::tree_at(view, &dep.id, depth + 1, max_depth))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ModuleDependency;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubView {
        entries: HashMap<String, Arc<ModuleManifest>>,
        instances: HashMap<String, Arc<ModuleManifest>>,
        versions: HashMap<String, Version>,
        enabled: Vec<(String, i64)>,
    }

    impl StubView {
        fn register(&mut self, manifest: ModuleManifest) {
            self.entries
                .insert(manifest.id.clone(), Arc::new(manifest));
        }

        fn install(&mut self, manifest: ModuleManifest) {
            let version = Version::parse(&manifest.version).unwrap();
            self.versions.insert(manifest.id.clone(), version);
            self.instances
                .insert(manifest.id.clone(), Arc::new(manifest));
        }

        fn enable(&mut self, id: &str) {
            let priority = self.instances[id].priority;
            self.enabled.push((id.to_string(), priority));
        }
    }

    impl RegistryView for StubView {
        fn entry_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>> {
            self.entries.get(id).cloned()
        }

        fn instance_manifest(&self, id: &str) -> Option<Arc<ModuleManifest>> {
            self.instances.get(id).cloned()
        }

        fn installed_version(&self, id: &str) -> Option<Version> {
            self.versions.get(id).cloned()
        }

        fn enabled_modules(&self) -> Vec<(String, i64)> {
            self.enabled.clone()
        }
    }

    fn manifest(id: &str, deps: &[ModuleDependency]) -> ModuleManifest {
        let mut m = ModuleManifest::new(id, id.to_uppercase(), "1.0.0");
        m.dependencies = deps.to_vec();
        m
    }

    #[test]
    fn no_dependencies_resolves_to_self() {
        let view = StubView::default();
        let m = manifest("solo", &[]);
        assert_eq!(
            DependencyResolver::resolve(&view, &m).unwrap(),
            vec!["solo"]
        );
    }

    #[test]
    fn chain_resolves_dependencies_first() {
        let mut view = StubView::default();
        view.install(manifest("base", &[]));
        view.install(manifest("mid", &[ModuleDependency::required("base")]));
        let top = manifest("top", &[ModuleDependency::required("mid")]);

        assert_eq!(
            DependencyResolver::resolve(&view, &top).unwrap(),
            vec!["base", "mid", "top"]
        );
    }

    #[test]
    fn diamond_resolves_shared_dependency_once() {
        let mut view = StubView::default();
        view.install(manifest("shared", &[]));
        view.install(manifest("left", &[ModuleDependency::required("shared")]));
        view.install(manifest("right", &[ModuleDependency::required("shared")]));
        let top = manifest(
            "top",
            &[
                ModuleDependency::required("left"),
                ModuleDependency::required("right"),
            ],
        );

        assert_eq!(
            DependencyResolver::resolve(&view, &top).unwrap(),
            vec!["shared", "left", "right", "top"]
        );
    }

    #[test]
    fn registered_but_uninstalled_dependency_resolves_via_entry() {
        let mut view = StubView::default();
        view.register(manifest("base", &[]));
        let top = manifest("top", &[ModuleDependency::required("base")]);

        assert_eq!(
            DependencyResolver::resolve(&view, &top).unwrap(),
            vec!["base", "top"]
        );
    }

    #[test]
    fn cycle_is_detected() {
        let mut view = StubView::default();
        view.install(manifest("a", &[ModuleDependency::required("b")]));
        view.install(manifest("b", &[ModuleDependency::required("a")]));
        let m = view.instance_manifest("a").unwrap();

        match DependencyResolver::resolve(&view, &m) {
            Err(RegistryError::CircularDependency(id)) => {
                assert!(id == "a" || id == "b", "unexpected cycle node {id}");
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_dependency_names_the_dependent() {
        let view = StubView::default();
        let m = manifest("top", &[ModuleDependency::required("ghost")]);

        match DependencyResolver::resolve(&view, &m) {
            Err(RegistryError::MissingDependency {
                module,
                required_by,
            }) => {
                assert_eq!(module, "ghost");
                assert_eq!(required_by, "top");
            }
            other => panic!("expected missing dependency, got {other:?}"),
        }
    }

    #[test]
    fn installed_version_outside_range_is_rejected() {
        let mut view = StubView::default();
        view.install(manifest("base", &[]));
        let m = manifest(
            "top",
            &[ModuleDependency::required("base").with_range("^2.0.0")],
        );

        match DependencyResolver::resolve(&view, &m) {
            Err(RegistryError::VersionMismatch {
                module,
                required,
                installed,
            }) => {
                assert_eq!(module, "base");
                assert_eq!(required, "^2.0.0");
                assert_eq!(installed, "1.0.0");
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_optional_dependency_is_ignored() {
        let view = StubView::default();
        let m = manifest("top", &[ModuleDependency::optional("extra")]);

        assert_eq!(DependencyResolver::resolve(&view, &m).unwrap(), vec!["top"]);
    }

    #[test]
    fn installed_optional_dependency_is_version_checked() {
        let mut view = StubView::default();
        view.install(manifest("extra", &[]));
        let m = manifest(
            "top",
            &[ModuleDependency::optional("extra").with_range(">=2.0.0")],
        );

        assert!(matches!(
            DependencyResolver::resolve(&view, &m),
            Err(RegistryError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn very_deep_chain_does_not_overflow() {
        let mut view = StubView::default();
        view.install(manifest("m0", &[]));
        for i in 1..5000 {
            view.install(manifest(
                &format!("m{i}"),
                &[ModuleDependency::required(&format!("m{}", i - 1))],
            ));
        }
        let top = view.instance_manifest("m4999").unwrap();

        let order = DependencyResolver::resolve(&view, &top).unwrap();
        assert_eq!(order.len(), 5000);
        assert_eq!(order.first().map(String::as_str), Some("m0"));
        assert_eq!(order.last().map(String::as_str), Some("m4999"));
    }

    #[test]
    fn load_order_sorts_roots_by_priority() {
        let mut view = StubView::default();
        let mut low = manifest("low", &[]);
        low.priority = 1;
        let mut high = manifest("high", &[]);
        high.priority = 10;
        view.install(low);
        view.install(high);
        view.enable("low");
        view.enable("high");

        assert_eq!(DependencyResolver::load_order(&view), vec!["high", "low"]);
    }

    #[test]
    fn load_order_places_dependencies_first() {
        let mut view = StubView::default();
        view.install(manifest("base", &[]));
        view.install(manifest("app", &[ModuleDependency::required("base")]));
        view.enable("base");
        view.enable("app");

        let order = DependencyResolver::load_order(&view);
        let base_pos = order.iter().position(|id| id == "base").unwrap();
        let app_pos = order.iter().position(|id| id == "app").unwrap();
        assert!(base_pos < app_pos);
    }

    #[test]
    fn load_order_excludes_modules_that_are_not_enabled() {
        let mut view = StubView::default();
        view.install(manifest("base", &[]));
        view.install(manifest("app", &[ModuleDependency::required("base")]));
        view.enable("app");

        // base is installed but not enabled, so it has no startup slot
        assert_eq!(DependencyResolver::load_order(&view), vec!["app"]);
    }

    #[test]
    fn load_order_terminates_on_cycles() {
        let mut view = StubView::default();
        view.install(manifest("a", &[ModuleDependency::required("b")]));
        view.install(manifest("b", &[ModuleDependency::required("a")]));
        view.enable("a");
        view.enable("b");

        let order = DependencyResolver::load_order(&view);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn check_dependencies_reports_missing_and_incompatible() {
        let mut view = StubView::default();
        view.install(manifest("old", &[]));
        let m = manifest(
            "top",
            &[
                ModuleDependency::required("ghost"),
                ModuleDependency::required("old").with_range("^3.0.0"),
                ModuleDependency::optional("also-ghost"),
            ],
        );

        let report = DependencyResolver::check_dependencies(&view, &m);
        assert!(!report.satisfied);
        assert_eq!(report.missing, vec!["ghost"]);
        assert_eq!(report.incompatible.len(), 1);
        assert_eq!(report.incompatible[0].id, "old");
        assert_eq!(report.incompatible[0].installed, Version::new(1, 0, 0));
    }

    #[test]
    fn dependency_tree_marks_depth_overflow_and_unknowns() {
        let mut view = StubView::default();
        view.install(manifest("a", &[ModuleDependency::required("b")]));
        view.install(manifest("b", &[ModuleDependency::required("missing")]));

        let tree = DependencyResolver::dependency_tree(&view, "a", 1);
        match tree {
            DependencyTree::Node { id, dependencies, .. } => {
                assert_eq!(id, "a");
                match &dependencies[0] {
                    DependencyTree::Node { id, dependencies, .. } => {
                        assert_eq!(id, "b");
                        assert!(matches!(
                            &dependencies[0],
                            DependencyTree::Error { error } if error == "Max depth exceeded"
                        ));
                    }
                    other => panic!("expected node, got {other:?}"),
                }
            }
            other => panic!("expected node, got {other:?}"),
        }

        assert!(matches!(
            DependencyResolver::dependency_tree(&view, "nope", 5),
            DependencyTree::Error { error } if error == "Module not found"
        ));
    }
}
