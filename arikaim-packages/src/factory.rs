//! Package manager factory
//!
//! Maps each [`PackageType`] to its lifecycle behavior, root path and optional
//! registry, and builds configured [`PackageManager`]s.

use crate::behavior::{default_behavior, NoHooks, PackageBehavior, PackageHooks};
use crate::config::PackagesConfig;
use crate::descriptor::{Requirements, DESCRIPTOR_FILE};
use crate::manager::{Collaborators, PackageManager};
use crate::registry::{JsonRegistry, PackageRegistry};
use crate::validator::PackageValidator;
use crate::{PackageError, PackageType, Result};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Root path lookup for every package type
#[derive(Debug, Clone, Default)]
pub struct PackageLocator {
    paths: FxHashMap<PackageType, PathBuf>,
}

impl PackageLocator {
    pub fn new(paths: FxHashMap<PackageType, PathBuf>) -> Self {
        Self { paths }
    }

    pub fn package_path(&self, package_type: PackageType) -> Option<&PathBuf> {
        self.paths.get(&package_type)
    }

    /// Descriptor file of `(package_type, name)`, without touching the file system
    pub fn descriptor_path(&self, package_type: PackageType, name: &str) -> Option<PathBuf> {
        self.paths
            .get(&package_type)
            .map(|root| package_type.package_dir(root, name).join(DESCRIPTOR_FILE))
    }

    pub fn set_path(&mut self, package_type: PackageType, path: PathBuf) {
        self.paths.insert(package_type, path);
    }
}

/// Binding of one package type
#[derive(Clone)]
pub struct PackageTypeBinding {
    pub behavior: Arc<dyn PackageBehavior>,
    pub registry: Option<Arc<dyn PackageRegistry>>,
}

/// Builds package managers for each package type
pub struct PackageManagerFactory {
    config: PackagesConfig,
    locator: PackageLocator,
    bindings: FxHashMap<PackageType, PackageTypeBinding>,
    collaborators: Collaborators,
}

impl PackageManagerFactory {
    /// Create a factory with the default behavior for every type
    ///
    /// Extensions, modules and services get a JSON registry under the storage root.
    pub fn new(config: PackagesConfig, collaborators: Collaborators) -> Result<Self> {
        let locator = PackageLocator::new(config.package_paths());
        let hooks: Arc<dyn PackageHooks> = Arc::new(NoHooks);
        let mut bindings = FxHashMap::default();

        for package_type in PackageType::ALL {
            let registry: Option<Arc<dyn PackageRegistry>> = if package_type.has_registry() {
                Some(Arc::new(JsonRegistry::open(&config.registry_path(package_type))?))
            } else {
                None
            };
            let binding = PackageTypeBinding {
                behavior: default_behavior(
                    package_type,
                    Arc::clone(&hooks),
                    Arc::clone(&collaborators.composer),
                ),
                registry,
            };
            bindings.insert(package_type, binding);
        }

        Ok(Self {
            config,
            locator,
            bindings,
            collaborators,
        })
    }

    /// Create the manager for a package type
    pub fn create(&self, package_type: PackageType) -> Result<PackageManager> {
        let path = self
            .locator
            .package_path(package_type)
            .cloned()
            .or_else(|| (!package_type.is_filesystem_backed()).then(|| self.config.composer_root.clone()))
            .ok_or_else(|| PackageError::UnknownPackageType {
                name: package_type.to_string(),
            })?;
        let binding = self.binding(package_type)?;
        debug!("Creating {} package manager at {}", package_type, path.display());

        Ok(PackageManager::new(
            package_type,
            path,
            binding,
            self.collaborators.clone(),
            self.locator.clone(),
            &self.config,
        ))
    }

    /// Create a manager from a type tag or alias ("themes", "extensions", ...)
    pub fn create_by_name(&self, name: &str) -> Result<PackageManager> {
        self.create(name.parse()?)
    }

    fn binding(&self, package_type: PackageType) -> Result<PackageTypeBinding> {
        self.bindings
            .get(&package_type)
            .cloned()
            .ok_or_else(|| PackageError::UnknownPackageType {
                name: package_type.to_string(),
            })
    }

    /// Validator for a `require` map, independent of any single package
    pub fn create_validator(&self, requires: Requirements) -> PackageValidator {
        PackageValidator::new(
            requires,
            self.locator.clone(),
            Arc::clone(&self.collaborators.composer),
        )
    }

    /// Root path of a package type
    pub fn package_path(&self, package_type: PackageType) -> Option<&PathBuf> {
        self.locator.package_path(package_type)
    }

    /// Descriptor file of `(package_type, name)`
    pub fn descriptor_path(&self, package_type: PackageType, name: &str) -> Option<PathBuf> {
        self.locator.descriptor_path(package_type, name)
    }

    pub fn locator(&self) -> &PackageLocator {
        &self.locator
    }

    /// Remap the root path of a type
    pub fn set_package_path(&mut self, package_type: PackageType, path: PathBuf) {
        self.locator.set_path(package_type, path);
    }

    /// Replace the lifecycle behavior of a type
    pub fn set_package_behavior(&mut self, package_type: PackageType, behavior: Arc<dyn PackageBehavior>) {
        if let Some(binding) = self.bindings.get_mut(&package_type) {
            binding.behavior = behavior;
        }
    }

    /// Use the default behavior of a type with host hooks
    pub fn set_package_hooks(&mut self, package_type: PackageType, hooks: Arc<dyn PackageHooks>) {
        let behavior = default_behavior(package_type, hooks, Arc::clone(&self.collaborators.composer));
        self.set_package_behavior(package_type, behavior);
    }

    /// Bind (or unbind) the registry of a type
    pub fn set_package_registry(
        &mut self,
        package_type: PackageType,
        registry: Option<Arc<dyn PackageRegistry>>,
    ) {
        if let Some(binding) = self.bindings.get_mut(&package_type) {
            binding.registry = registry;
        }
    }

    pub fn registry(&self, package_type: PackageType) -> Option<Arc<dyn PackageRegistry>> {
        self.bindings.get(&package_type).and_then(|b| b.registry.clone())
    }
}
