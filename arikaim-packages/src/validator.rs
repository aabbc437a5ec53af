//! Dependency validation for declared `require` lists
//!
//! Validation is advisory: it reports what is present and flags versions below the
//! declared minimum, but never installs, removes or blocks anything.

use crate::composer::Composer;
use crate::descriptor::{PackageProperties, Requirements};
use crate::factory::PackageLocator;
use crate::version::is_below;
use crate::PackageType;
use serde::Serialize;
use std::sync::Arc;

/// One parsed `name[:version[:optional]]` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyToken {
    pub name: String,
    pub version: Option<String>,
    pub optional: bool,
}

impl DependencyToken {
    /// Parse a dependency token
    ///
    /// The second segment is the minimum version unless it is the literal `optional`,
    /// which marks the dependency optional without a version.
    pub fn parse(token: &str) -> Self {
        let mut parts = token.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let version = parts.next().map(str::trim).filter(|v| !v.is_empty());
        let flag = parts.next().map(str::trim);

        let optional = flag.or(version) == Some("optional");
        let version = version.filter(|v| *v != "optional").map(str::to_string);

        Self {
            name,
            version,
            optional,
        }
    }
}

/// Validation record for one declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyCheck {
    pub name: String,
    /// Declared minimum version
    pub version: Option<String>,
    /// Version found on disk
    pub package_version: Option<String>,
    pub optional: bool,
    /// The dependency is present
    pub valid: bool,
    /// Present but below the declared minimum
    pub warning: bool,
}

impl DependencyCheck {
    fn new(token: DependencyToken, installed: Option<Option<String>>) -> Self {
        let valid = installed.is_some();
        let package_version = installed.flatten();
        let warning = match (&token.version, &package_version) {
            (Some(minimum), Some(found)) => is_below(found, minimum),
            (Some(_), None) => valid,
            _ => false,
        };

        Self {
            name: token.name,
            version: token.version,
            package_version,
            optional: token.optional,
            valid,
            warning,
        }
    }

    /// Missing and not optional
    pub fn is_blocking(&self) -> bool {
        !self.valid && !self.optional
    }
}

/// Result of validating every requirement category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub library: Vec<DependencyCheck>,
    pub extensions: Vec<DependencyCheck>,
    pub modules: Vec<DependencyCheck>,
    pub themes: Vec<DependencyCheck>,
    pub composer: Vec<DependencyCheck>,
    /// Number of checked dependencies across all categories
    pub count: usize,
}

impl ValidationReport {
    /// Every record, category by category
    pub fn checks(&self) -> impl Iterator<Item = &DependencyCheck> {
        self.library
            .iter()
            .chain(&self.extensions)
            .chain(&self.modules)
            .chain(&self.themes)
            .chain(&self.composer)
    }

    pub fn has_warnings(&self) -> bool {
        self.checks().any(|c| c.warning)
    }

    /// Required (non optional) dependencies that are missing
    pub fn missing(&self) -> Vec<&DependencyCheck> {
        self.checks().filter(|c| c.is_blocking()).collect()
    }
}

/// Checks a `require` map against installed packages
pub struct PackageValidator {
    requires: Requirements,
    locator: PackageLocator,
    composer: Arc<Composer>,
}

impl PackageValidator {
    pub fn new(requires: Requirements, locator: PackageLocator, composer: Arc<Composer>) -> Self {
        Self {
            requires,
            locator,
            composer,
        }
    }

    /// Validate all filesystem categories plus composer
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport {
            library: self.validate_items(PackageType::Library, "library"),
            extensions: self.validate_items(PackageType::Extension, "extensions"),
            modules: self.validate_items(PackageType::Module, "modules"),
            themes: self.validate_items(PackageType::Template, "themes"),
            composer: self.validate_composer_packages(),
            count: 0,
        };
        report.count = report.checks().count();
        report
    }

    /// Validate one category against package descriptors on disk
    pub fn validate_items(&self, package_type: PackageType, category: &str) -> Vec<DependencyCheck> {
        self.requires
            .category(category)
            .iter()
            .map(|item| {
                let token = DependencyToken::parse(item);
                let installed = self
                    .locator
                    .descriptor_path(package_type, &token.name)
                    .filter(|path| path.exists())
                    .map(|path| {
                        PackageProperties::from_file(&path)
                            .ok()
                            .map(|properties| properties.version)
                    });
                DependencyCheck::new(token, installed)
            })
            .collect()
    }

    /// Validate composer requirements in a single manifest read
    pub fn validate_composer_packages(&self) -> Vec<DependencyCheck> {
        let items = self.requires.category("composer");
        if items.is_empty() {
            return Vec::new();
        }

        let tokens: Vec<DependencyToken> = items.iter().map(|i| DependencyToken::parse(i)).collect();
        let names: Vec<String> = tokens.iter().map(|t| t.name.clone()).collect();
        let installed_info = self.composer.local_packages_info(&names);

        tokens
            .into_iter()
            .map(|token| {
                let installed = match installed_info.get(&token.name) {
                    Some(Some(version)) => Some(Some(version.clone())),
                    _ => None,
                };
                DependencyCheck::new(token, installed)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parsing() {
        assert_eq!(
            DependencyToken::parse("foo:1.2:optional"),
            DependencyToken {
                name: "foo".to_string(),
                version: Some("1.2".to_string()),
                optional: true
            }
        );
        assert_eq!(
            DependencyToken::parse("foo:optional"),
            DependencyToken {
                name: "foo".to_string(),
                version: None,
                optional: true
            }
        );
        assert_eq!(
            DependencyToken::parse("foo"),
            DependencyToken {
                name: "foo".to_string(),
                version: None,
                optional: false
            }
        );
        assert_eq!(
            DependencyToken::parse("foo:2.0"),
            DependencyToken {
                name: "foo".to_string(),
                version: Some("2.0".to_string()),
                optional: false
            }
        );
    }

    #[test]
    fn test_check_warning_rules() {
        let below = DependencyCheck::new(DependencyToken::parse("a:1.5.0"), Some(Some("1.0.0".into())));
        assert!(below.valid);
        assert!(below.warning);

        let missing = DependencyCheck::new(DependencyToken::parse("a:1.5.0"), None);
        assert!(!missing.valid);
        assert!(!missing.warning);
        assert!(missing.is_blocking());

        let optional = DependencyCheck::new(DependencyToken::parse("a:optional"), None);
        assert!(!optional.is_blocking());

        let unversioned = DependencyCheck::new(DependencyToken::parse("a"), Some(Some("0.1.0".into())));
        assert!(!unversioned.warning);
    }
}
