//! Per package type lifecycle behavior
//!
//! The core decides *what* happens to the registry and the file system for each
//! package type. Type specific work (routes, template assets, console commands,
//! database models) is delegated to host supplied [`PackageHooks`].

use crate::composer::Composer;
use crate::descriptor::PackageProperties;
use crate::registry::{PackageStatus, RegistryEntry};
use crate::version::normalize_version;
use crate::{Package, PackageError, PackageType, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Host callbacks invoked during package lifecycle transitions
pub trait PackageHooks: Send + Sync {
    fn install(&self, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_install(&self, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }

    fn uninstall(&self, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the registry status changed
    fn status_changed(&self, _package: &Package, _status: PackageStatus) -> anyhow::Result<()> {
        Ok(())
    }

    /// Make the package primary outside the registry (e.g. the active template)
    fn set_primary(&self, _package: &Package) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Extra bookkeeping fields written into the registry entry at install time
    fn registry_fields(&self, _package: &Package) -> Map<String, Value> {
        Map::new()
    }
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl PackageHooks for NoHooks {}

/// Lifecycle behavior of one package type
pub trait PackageBehavior: Send + Sync {
    /// Read the package properties
    fn read_properties(&self, package: &Package) -> Result<PackageProperties> {
        PackageProperties::from_file(&package.descriptor_path())
    }

    fn version(&self, package: &Package) -> String {
        package.properties().version.clone()
    }

    fn is_installed(&self, package: &Package) -> bool {
        package.path().is_dir()
    }

    fn install(&self, package: &Package, primary: Option<bool>) -> Result<()>;

    fn post_install(&self, _package: &Package) -> Result<()> {
        Ok(())
    }

    fn uninstall(&self, package: &Package) -> Result<()>;

    fn enable(&self, _package: &Package) -> Result<bool> {
        Ok(false)
    }

    fn disable(&self, _package: &Package) -> Result<bool> {
        Ok(false)
    }

    fn set_primary(&self, _package: &Package) -> Result<bool> {
        Ok(false)
    }
}

/// Behavior registered for each package type
pub fn default_behavior(
    package_type: PackageType,
    hooks: Arc<dyn PackageHooks>,
    composer: Arc<Composer>,
) -> Arc<dyn PackageBehavior> {
    match package_type {
        PackageType::Extension | PackageType::Module | PackageType::Service => {
            Arc::new(RegisteredBehavior::new(hooks))
        }
        PackageType::Template => Arc::new(TemplateBehavior::new(hooks)),
        PackageType::Composer => Arc::new(ComposerBehavior::new(composer)),
        PackageType::Library | PackageType::ComponentsLibrary | PackageType::HtmlComponent => {
            Arc::new(FileBehavior::new(hooks))
        }
    }
}

/// Packages whose installed state is recorded in a registry (extensions, modules, services)
pub struct RegisteredBehavior {
    hooks: Arc<dyn PackageHooks>,
}

impl RegisteredBehavior {
    pub fn new(hooks: Arc<dyn PackageHooks>) -> Self {
        Self { hooks }
    }

    fn registry<'a>(&self, package: &'a Package) -> Result<&'a Arc<dyn crate::PackageRegistry>> {
        package.registry().ok_or_else(|| PackageError::RegistryUnavailable {
            package_type: package.package_type().to_string(),
        })
    }

    fn registry_entry(&self, package: &Package, primary: bool) -> Result<RegistryEntry> {
        let mut entry = RegistryEntry::new(package.name(), &package.version());
        entry.primary = primary;

        if let Value::Object(mut fields) = serde_json::to_value(package.properties())? {
            for key in ["name", "version", "require"] {
                fields.remove(key);
            }
            entry.properties = fields;
        }
        entry.properties.extend(self.hooks.registry_fields(package));
        Ok(entry)
    }

    fn set_status(&self, package: &Package, status: PackageStatus) -> Result<bool> {
        let registry = self.registry(package)?;
        if !registry.set_package_status(package.name(), status)? {
            return Ok(false);
        }
        self.hooks.status_changed(package, status)?;
        info!("Set {} {} status to {:?}", package.package_type(), package.name(), status);
        Ok(true)
    }
}

impl PackageBehavior for RegisteredBehavior {
    fn is_installed(&self, package: &Package) -> bool {
        package
            .registry()
            .map(|r| r.has_package(package.name()))
            .unwrap_or(false)
    }

    fn install(&self, package: &Package, primary: Option<bool>) -> Result<()> {
        let registry = self.registry(package)?;
        let primary = primary.unwrap_or_else(|| registry.is_primary(package.name()));

        self.hooks.install(package)?;

        let entry = self.registry_entry(package, primary)?;
        registry.add_package(package.name(), entry)?;
        if primary {
            registry.set_primary(package.name())?;
        }

        info!("Installed {} {} {}", package.package_type(), package.name(), package.version());
        Ok(())
    }

    fn post_install(&self, package: &Package) -> Result<()> {
        Ok(self.hooks.post_install(package)?)
    }

    fn uninstall(&self, package: &Package) -> Result<()> {
        let registry = self.registry(package)?;
        self.hooks.uninstall(package)?;

        if !registry.remove_package(package.name())? {
            return Err(PackageError::PackageNotFound {
                name: package.name().to_string(),
                package_type: package.package_type().to_string(),
            });
        }
        info!("Uninstalled {} {}", package.package_type(), package.name());
        Ok(())
    }

    fn enable(&self, package: &Package) -> Result<bool> {
        self.set_status(package, PackageStatus::Enabled)
    }

    fn disable(&self, package: &Package) -> Result<bool> {
        self.set_status(package, PackageStatus::Disabled)
    }

    fn set_primary(&self, package: &Package) -> Result<bool> {
        self.registry(package)?.set_primary(package.name())
    }
}

/// Templates: always enabled, primary selection handled by the host
pub struct TemplateBehavior {
    hooks: Arc<dyn PackageHooks>,
}

impl TemplateBehavior {
    pub fn new(hooks: Arc<dyn PackageHooks>) -> Self {
        Self { hooks }
    }
}

impl PackageBehavior for TemplateBehavior {
    fn install(&self, package: &Package, _primary: Option<bool>) -> Result<()> {
        self.hooks.install(package)?;
        info!("Installed template {}", package.name());
        Ok(())
    }

    fn post_install(&self, package: &Package) -> Result<()> {
        Ok(self.hooks.post_install(package)?)
    }

    fn uninstall(&self, package: &Package) -> Result<()> {
        Ok(self.hooks.uninstall(package)?)
    }

    fn enable(&self, _package: &Package) -> Result<bool> {
        Ok(true)
    }

    fn set_primary(&self, package: &Package) -> Result<bool> {
        Ok(self.hooks.set_primary(package)?)
    }
}

/// Plain file packages: libraries, component libraries, html components
pub struct FileBehavior {
    hooks: Arc<dyn PackageHooks>,
}

impl FileBehavior {
    pub fn new(hooks: Arc<dyn PackageHooks>) -> Self {
        Self { hooks }
    }
}

impl PackageBehavior for FileBehavior {
    fn install(&self, package: &Package, _primary: Option<bool>) -> Result<()> {
        self.hooks.install(package)?;
        debug!("Installed {} {}", package.package_type(), package.name());
        Ok(())
    }

    fn post_install(&self, package: &Package) -> Result<()> {
        Ok(self.hooks.post_install(package)?)
    }

    fn uninstall(&self, package: &Package) -> Result<()> {
        Ok(self.hooks.uninstall(package)?)
    }
}

/// Packages managed by composer
pub struct ComposerBehavior {
    composer: Arc<Composer>,
}

impl ComposerBehavior {
    pub fn new(composer: Arc<Composer>) -> Self {
        Self { composer }
    }
}

impl PackageBehavior for ComposerBehavior {
    fn read_properties(&self, package: &Package) -> Result<PackageProperties> {
        let mut data = match self.composer.installed_package_info(package.name()) {
            Some(info) => serde_json::to_value(info)?,
            None => Value::Object(Map::new()),
        };
        if let Value::Object(fields) = &mut data {
            // composer's own "type" (library, project, ...) is not a package category
            fields.remove("type");
            fields.insert("repository-type".to_string(), Value::from("composer"));
        }
        PackageProperties::from_value(data)
    }

    fn version(&self, package: &Package) -> String {
        self.composer
            .installed_version(package.name())
            .map(|v| normalize_version(&v))
            .unwrap_or_else(|| package.properties().version.clone())
    }

    fn is_installed(&self, package: &Package) -> bool {
        self.composer.is_installed(package.name())
    }

    fn install(&self, package: &Package, _primary: Option<bool>) -> Result<()> {
        if self.composer.is_installed(package.name()) {
            self.composer.update_package(package.name())?;
        } else {
            self.composer.require_package(package.name())?;
        }

        if !self.composer.is_installed(package.name()) {
            return Err(PackageError::InstallationFailed {
                package: package.name().to_string(),
                message: "package missing from composer manifest after install".to_string(),
            });
        }
        Ok(())
    }

    fn uninstall(&self, package: &Package) -> Result<()> {
        self.composer.remove_package(package.name())?;
        if self.composer.is_installed(package.name()) {
            return Err(PackageError::InstallationFailed {
                package: package.name().to_string(),
                message: "package still listed in composer manifest".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{JsonRegistry, PackageRegistry};
    use std::path::PathBuf;

    struct CommandHooks;

    impl PackageHooks for CommandHooks {
        fn registry_fields(&self, _package: &Package) -> Map<String, Value> {
            let mut fields = Map::new();
            fields.insert("console_commands".to_string(), Value::from(vec!["Blog\\Cli"]));
            fields
        }
    }

    fn extension(registry: Arc<JsonRegistry>, hooks: Arc<dyn PackageHooks>) -> Package {
        let mut package = Package::new(
            "blog",
            PackageType::Extension,
            PathBuf::from("/tmp/extensions"),
            Arc::new(RegisteredBehavior::new(hooks)),
            Some(registry),
        );
        package.set_properties(
            r#"{ "name": "blog", "version": "1.2", "admin-menu": "Blog" }"#
                .parse::<PackageProperties>()
                .unwrap(),
        );
        package
    }

    #[test]
    fn test_registered_install_writes_registry() {
        let registry = Arc::new(JsonRegistry::in_memory());
        let package = extension(registry.clone(), Arc::new(CommandHooks));

        package.install(Some(true)).unwrap();

        let entry = registry.get_package("blog").unwrap();
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(entry.status, PackageStatus::Enabled);
        assert!(entry.primary);
        assert_eq!(entry.properties["admin-menu"], Value::from("Blog"));
        assert!(entry.properties.contains_key("console_commands"));
        assert!(!entry.properties.contains_key("require"));
        assert!(package.is_installed());
    }

    #[test]
    fn test_registered_status_transitions() {
        let registry = Arc::new(JsonRegistry::in_memory());
        let package = extension(registry.clone(), Arc::new(NoHooks));

        assert!(!package.enable().unwrap());
        package.install(None).unwrap();
        assert!(package.disable().unwrap());
        assert_eq!(registry.get_package_status("blog"), Some(PackageStatus::Disabled));
        assert!(package.enable().unwrap());

        package.uninstall().unwrap();
        assert!(!package.is_installed());
        assert!(package.uninstall().is_err());
    }

    #[test]
    fn test_registered_without_registry_fails() {
        let package = Package::new(
            "cache",
            PackageType::Module,
            PathBuf::from("/tmp/modules"),
            Arc::new(RegisteredBehavior::new(Arc::new(NoHooks))),
            None,
        );
        assert!(matches!(
            package.install(None),
            Err(PackageError::RegistryUnavailable { .. })
        ));
    }

    #[test]
    fn test_failing_hook_aborts_install() {
        struct Failing;
        impl PackageHooks for Failing {
            fn install(&self, _package: &Package) -> anyhow::Result<()> {
                anyhow::bail!("routes table missing")
            }
        }

        let registry = Arc::new(JsonRegistry::in_memory());
        let package = extension(registry.clone(), Arc::new(Failing));
        assert!(matches!(package.install(None), Err(PackageError::Other(_))));
        assert!(!registry.has_package("blog"));
    }
}
