//! Property-based tests for dependency resolution and version ranges

use proptest::prelude::*;
use semver::Version;

use modkit::manifest::version::range_matches;
use modkit::{ModuleDependency, ModuleManifest, ModuleRegistry};

mod common;
use common::*;

/// Random acyclic graph: node i may only depend on lower-indexed nodes
fn graph_manifests(
    node_count: usize,
    edge_seed: &[Vec<prop::sample::Index>],
) -> (Vec<ModuleManifest>, Vec<(String, String)>) {
    let mut manifests = Vec::new();
    let mut edges = Vec::new();

    for i in 0..node_count {
        let id = format!("m{i}");
        let mut deps: Vec<String> = Vec::new();
        if i > 0 {
            for pick in &edge_seed[i] {
                let target = format!("m{}", pick.index(i));
                if !deps.contains(&target) {
                    deps.push(target);
                }
            }
        }

        let mut m = manifest(&id, "1.0.0");
        m.dependencies = deps.iter().map(|d| ModuleDependency::required(d)).collect();
        for dep in deps {
            edges.push((id.clone(), dep));
        }
        manifests.push(m);
    }

    (manifests, edges)
}

/// Property: install order lists dependencies before dependents, each once
proptest! {
    #[test]
    fn prop_resolution_respects_edges(
        node_count in 2usize..8,
        edge_seed in prop::collection::vec(
            prop::collection::vec(any::<prop::sample::Index>(), 0..3),
            8,
        ),
    ) {
        let (manifests, edges) = graph_manifests(node_count, &edge_seed);
        let root = manifests.last().unwrap().clone();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let order = rt
            .block_on(async {
                let reg = ModuleRegistry::default();
                for m in &manifests {
                    reg.register(m.clone(), None).await.unwrap();
                }
                reg.resolve_dependencies(&root).await
            })
            .unwrap();

        prop_assert_eq!(order.last().map(String::as_str), Some(root.id.as_str()));

        let unique: std::collections::HashSet<&String> = order.iter().collect();
        prop_assert_eq!(unique.len(), order.len());

        for (node, dep) in &edges {
            if let Some(node_pos) = order.iter().position(|id| id == node) {
                let dep_pos = order.iter().position(|id| id == dep);
                prop_assert!(dep_pos.is_some(), "{} resolved without its dependency {}", node, dep);
                prop_assert!(dep_pos.unwrap() < node_pos, "{} ordered before its dependency {}", node, dep);
            }
        }
    }
}

/// Property: the startup order covers every enabled module and keeps edges
proptest! {
    #[test]
    fn prop_load_order_covers_enabled_graph(
        node_count in 2usize..8,
        edge_seed in prop::collection::vec(
            prop::collection::vec(any::<prop::sample::Index>(), 0..3),
            8,
        ),
    ) {
        let (manifests, edges) = graph_manifests(node_count, &edge_seed);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let order = rt.block_on(async {
            let reg = ModuleRegistry::default();
            for m in &manifests {
                reg.register(m.clone(), None).await.unwrap();
            }
            for m in &manifests {
                if !reg.is_installed(&m.id).await {
                    reg.install(&m.id).await.unwrap();
                }
                reg.enable(&m.id).await.unwrap();
            }
            reg.load_order().await
        });

        prop_assert_eq!(order.len(), node_count);
        for (node, dep) in &edges {
            let node_pos = order.iter().position(|id| id == node).unwrap();
            let dep_pos = order.iter().position(|id| id == dep).unwrap();
            prop_assert!(dep_pos < node_pos, "{} ordered before its dependency {}", node, dep);
        }
    }
}

/// Property: a bare range pins exactly one version
proptest! {
    #[test]
    fn prop_bare_range_is_exact(
        major in 0u64..20,
        minor in 0u64..20,
        patch in 0u64..20,
    ) {
        let range = format!("{major}.{minor}.{patch}");

        prop_assert!(range_matches(&Version::new(major, minor, patch), &range).unwrap());
        prop_assert!(!range_matches(&Version::new(major, minor, patch + 1), &range).unwrap());
        prop_assert!(!range_matches(&Version::new(major + 1, minor, patch), &range).unwrap());
    }
}

/// Property: caret ranges accept compatible bumps and stop at the next major
proptest! {
    #[test]
    fn prop_caret_range_tracks_the_major(
        major in 1u64..20,
        minor in 0u64..20,
        patch in 0u64..20,
        bump in 1u64..5,
    ) {
        let range = format!("^{major}.{minor}.{patch}");

        prop_assert!(range_matches(&Version::new(major, minor, patch), &range).unwrap());
        prop_assert!(range_matches(&Version::new(major, minor, patch + bump), &range).unwrap());
        prop_assert!(range_matches(&Version::new(major, minor + bump, patch), &range).unwrap());
        prop_assert!(!range_matches(&Version::new(major + bump, 0, 0), &range).unwrap());
        if patch > 0 {
            prop_assert!(!range_matches(&Version::new(major, minor, patch - 1), &range).unwrap());
        }
    }
}
