//! Version parsing and range matching
//!
//! Versions are strict semver. Ranges accept the common operator prefixes
//! (`^`, `~`, `>=`, `>`, `<=`, `<`, `=`); a bare version such as `1.2.3`
//! means exact equality, not "anything compatible".

use semver::{Version, VersionReq};

use crate::error::RegistryError;

/// Parse a strict semver version string
pub fn parse_version(value: &str) -> Result<Version, RegistryError> {
    Version::parse(value.trim()).map_err(|e| RegistryError::InvalidVersion {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a version range string
///
/// Bare versions are rewritten to exact requirements before parsing, so
/// `"1.2.3"` only matches 1.2.3 itself.
pub fn parse_range(range: &str) -> Result<VersionReq, RegistryError> {
    let trimmed = range.trim();
    let parsed = if trimmed.starts_with(['^', '~', '>', '<', '=']) {
        VersionReq::parse(trimmed)
    } else {
        VersionReq::parse(&format!("={trimmed}"))
    };

    parsed.map_err(|e| RegistryError::InvalidVersion {
        value: range.to_string(),
        reason: e.to_string(),
    })
}

/// Check whether an installed version satisfies a range
pub fn range_matches(installed: &Version, range: &str) -> Result<bool, RegistryError> {
    Ok(parse_range(range)?.matches(installed))
}
