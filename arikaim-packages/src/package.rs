//! Package entity

use crate::behavior::PackageBehavior;
use crate::descriptor::{PackageProperties, Requirements, DESCRIPTOR_FILE};
use crate::registry::PackageRegistry;
use crate::{PackageType, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One discoverable package of a given type
///
/// Packages are built per manager operation and never persisted. What survives an
/// install lives in the [`PackageRegistry`].
pub struct Package {
    name: String,
    package_type: PackageType,
    root: PathBuf,
    properties: PackageProperties,
    registry: Option<Arc<dyn PackageRegistry>>,
    behavior: Arc<dyn PackageBehavior>,
}

impl Package {
    /// Create a package with empty properties
    pub fn new(
        name: &str,
        package_type: PackageType,
        root: PathBuf,
        behavior: Arc<dyn PackageBehavior>,
        registry: Option<Arc<dyn PackageRegistry>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            package_type,
            root,
            properties: PackageProperties::named(name),
            registry,
            behavior,
        }
    }

    /// Load properties through the type behavior (descriptor file for most types)
    pub fn load_properties(&mut self) -> Result<()> {
        let properties = self.behavior.read_properties(self)?;
        self.set_properties(properties);
        Ok(())
    }

    /// Replace the properties, keeping the package name when the descriptor has none
    pub fn set_properties(&mut self, mut properties: PackageProperties) {
        if properties.name.is_empty() {
            properties.name = self.name.clone();
        }
        self.properties = properties;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    /// Root directory shared by every package of this type
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of this package
    pub fn path(&self) -> PathBuf {
        self.package_type.package_dir(&self.root, &self.name)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.path().join(DESCRIPTOR_FILE)
    }

    pub fn properties(&self) -> &PackageProperties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties.get(key)
    }

    /// Normalized version
    pub fn version(&self) -> String {
        self.behavior.version(self)
    }

    pub fn require(&self) -> &Requirements {
        &self.properties.require
    }

    /// Batch install priority
    pub fn install_order(&self) -> i64 {
        self.properties.effective_install_order()
    }

    pub fn registry(&self) -> Option<&Arc<dyn PackageRegistry>> {
        self.registry.as_ref()
    }

    pub fn is_installed(&self) -> bool {
        self.behavior.is_installed(self)
    }

    /// Install the package, `primary` overrides the registry's primary flag
    pub fn install(&self, primary: Option<bool>) -> Result<()> {
        self.behavior.install(self, primary)
    }

    pub fn post_install(&self) -> Result<()> {
        self.behavior.post_install(self)
    }

    pub fn uninstall(&self) -> Result<()> {
        self.behavior.uninstall(self)
    }

    /// Enable the package, false when the type has no enabled state
    pub fn enable(&self) -> Result<bool> {
        self.behavior.enable(self)
    }

    /// Disable the package, false when the type has no enabled state
    pub fn disable(&self) -> Result<bool> {
        self.behavior.disable(self)
    }

    pub fn set_primary(&self) -> Result<bool> {
        self.behavior.set_primary(self)
    }

    /// Rewrite the descriptor file with the current properties
    pub fn save_properties(&self) -> Result<()> {
        self.properties.save(&self.descriptor_path())
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("package_type", &self.package_type)
            .field("root", &self.root)
            .field("properties", &self.properties)
            .finish()
    }
}
