//! Version normalization and comparison
//!
//! Descriptors carry loosely formatted versions ("2.3", "v1.0.4", "1.2.0-beta").
//! Everything the core stores or compares goes through [`normalize_version`] first.

use crate::{PackageError, Result};
use std::cmp::Ordering;

pub use semver::Version as SemverVersion;

/// Version assumed when a descriptor does not declare one
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Normalize a version string to its three component form
///
/// Missing components are filled with `0`, components beyond the third are dropped
/// and an empty string yields [`DEFAULT_VERSION`]. A leading `v` is kept out of the result.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return DEFAULT_VERSION.to_string();
    }

    let (core, suffix) = split_suffix(trimmed);
    let mut parts: Vec<&str> = core.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    let parts: Vec<&str> = parts
        .into_iter()
        .map(|p| if p.is_empty() { "0" } else { p })
        .collect();

    format!("{}{}", parts.join("."), suffix)
}

/// Parse a version string after normalization
pub fn parse_version(version: &str) -> Result<SemverVersion> {
    let normalized = normalize_version(version);
    SemverVersion::parse(&normalized).map_err(|_| PackageError::InvalidVersion {
        version: version.to_string(),
    })
}

/// Compare two version strings
///
/// Both sides are normalized and compared as semantic versions. Strings that
/// still do not parse fall back to a numeric, component-wise comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => compare_components(&normalize_version(a), &normalize_version(b)),
    }
}

/// Check if `installed` is older than the declared `minimum`
pub fn is_below(installed: &str, minimum: &str) -> bool {
    compare_versions(installed, minimum) == Ordering::Less
}

fn split_suffix(version: &str) -> (&str, &str) {
    match version.find(|c| c == '-' || c == '+') {
        Some(pos) => (&version[..pos], &version[pos..]),
        None => (version, ""),
    }
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split(|c| c == '.' || c == '-').collect();
    let right: Vec<&str> = b.split(|c| c == '.' || c == '-').collect();

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2.3"), "2.3.0");
        assert_eq!(normalize_version("2"), "2.0.0");
        assert_eq!(normalize_version("1.2.3.4"), "1.2.3");
        assert_eq!(normalize_version("v1.4"), "1.4.0");
        assert_eq!(normalize_version("1.2-beta"), "1.2.0-beta");
        assert_eq!(normalize_version(""), DEFAULT_VERSION);
    }

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare_versions("1.0.0", "1.5.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.3", "2.3.0"), Ordering::Equal);
        assert_eq!(compare_versions("v2.0.1", "2.0.0"), Ordering::Greater);
        assert!(is_below("1.0.0", "1.5.0"));
        assert!(!is_below("1.5.0", "1.5"));
    }

    #[test]
    fn test_unparsable_versions_compare_by_components() {
        assert_eq!(compare_versions("1.x.2", "1.x.3"), Ordering::Less);
        assert!(parse_version("dev-master").is_err());
    }
}
