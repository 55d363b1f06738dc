//! Validate module manifest files
//!
//! Checks one or more TOML or JSON manifests against the registry's
//! validation rules and prints every error and warning found.
//!
//! Usage:
//!   validate-manifest <manifest.toml> [more-manifests ...]
//!   validate-manifest --strict module.json

use std::path::{Path, PathBuf};

use clap::Parser;

use modkit::{ManifestValidator, ModuleManifest};

#[derive(Parser, Debug)]
#[command(about = "Validate module manifest files")]
struct Args {
    /// Manifest files to check (.toml or .json)
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,
}

fn load_manifest(path: &Path) -> Result<ModuleManifest, String> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let loaded = if is_json {
        ModuleManifest::from_json_file(path)
    } else {
        ModuleManifest::from_toml_file(path)
    };
    loaded.map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();
    let mut failures = 0usize;

    for path in &args.manifests {
        let manifest = match load_manifest(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                eprintln!("✗ {}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        };

        let report = ManifestValidator::validate(&manifest);
        let ok = report.is_valid() && !(args.strict && !report.warnings.is_empty());

        if ok {
            println!("✓ {}: {} v{}", path.display(), manifest.id, manifest.version);
        } else {
            println!(
                "✗ {}: {} error(s), {} warning(s)",
                path.display(),
                report.errors.len(),
                report.warnings.len()
            );
            failures += 1;
        }

        for error in &report.errors {
            println!("  error: {}", error);
        }
        for warning in &report.warnings {
            println!("  warning: {}", warning);
        }
    }

    if failures > 0 {
        eprintln!();
        eprintln!("{} of {} manifests failed validation", failures, args.manifests.len());
        std::process::exit(1);
    }
}
