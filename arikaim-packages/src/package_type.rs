//! Package type tags

use crate::PackageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of pluggable unit managed by a package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Extension,
    Template,
    Module,
    Library,
    Composer,
    ComponentsLibrary,
    Service,
    HtmlComponent,
}

impl PackageType {
    /// Every package type, in registration order
    pub const ALL: [PackageType; 8] = [
        PackageType::Extension,
        PackageType::Template,
        PackageType::Module,
        PackageType::Library,
        PackageType::Composer,
        PackageType::ComponentsLibrary,
        PackageType::Service,
        PackageType::HtmlComponent,
    ];

    /// Canonical tag used in cache keys, archive names and descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Extension => "extension",
            PackageType::Template => "template",
            PackageType::Module => "module",
            PackageType::Library => "library",
            PackageType::Composer => "composer",
            PackageType::ComponentsLibrary => "components-library",
            PackageType::Service => "service",
            PackageType::HtmlComponent => "html-component",
        }
    }

    /// Resolve a type tag or one of its category aliases ("themes", "extensions", ...)
    pub fn from_alias(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let package_type = match name.as_str() {
            "extension" | "extensions" => PackageType::Extension,
            "template" | "templates" | "theme" | "themes" => PackageType::Template,
            "module" | "modules" => PackageType::Module,
            "library" | "libraries" => PackageType::Library,
            "composer" => PackageType::Composer,
            "components-library" | "components" => PackageType::ComponentsLibrary,
            "service" | "services" => PackageType::Service,
            "html-component" | "component" => PackageType::HtmlComponent,
            _ => return None,
        };
        Some(package_type)
    }

    /// Whether installed packages of this type are recorded in a registry
    pub fn has_registry(&self) -> bool {
        matches!(
            self,
            PackageType::Extension | PackageType::Module | PackageType::Service
        )
    }

    /// Whether packages of this type live in a directory tree (everything but composer)
    pub fn is_filesystem_backed(&self) -> bool {
        !matches!(self, PackageType::Composer)
    }

    /// Directory of a package named `name` under `root`
    ///
    /// Html component names are dotted paths (`forms.login`) that map onto nested folders.
    pub fn package_dir(&self, root: &Path, name: &str) -> PathBuf {
        match self {
            PackageType::HtmlComponent => name.split('.').fold(root.to_path_buf(), |p, s| p.join(s)),
            _ => root.join(name),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageType::from_alias(s).ok_or_else(|| PackageError::UnknownPackageType {
            name: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_before_lookup() {
        assert_eq!("themes".parse::<PackageType>().unwrap(), PackageType::Template);
        assert_eq!("Extensions".parse::<PackageType>().unwrap(), PackageType::Extension);
        assert_eq!("components".parse::<PackageType>().unwrap(), PackageType::ComponentsLibrary);
        assert!("widgets".parse::<PackageType>().is_err());
    }

    #[test]
    fn test_tags_round_trip() {
        for package_type in PackageType::ALL {
            assert_eq!(PackageType::from_alias(package_type.as_str()), Some(package_type));
        }
    }

    #[test]
    fn test_html_component_dir() {
        let root = Path::new("/app/components");
        assert_eq!(
            PackageType::HtmlComponent.package_dir(root, "forms.login"),
            root.join("forms").join("login")
        );
        assert_eq!(PackageType::Module.package_dir(root, "forms.login"), root.join("forms.login"));
    }
}
