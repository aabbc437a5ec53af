//! Per package type manager
//!
//! A [`PackageManager`] owns one package type's root directory: it scans it, caches
//! the scan, orders packages for batch installs, drives the lifecycle of single
//! packages and writes backups.

use crate::archive::{create_zip, ensure_writable, VCS_DIRS};
use crate::behavior::PackageBehavior;
use crate::cache::{Cache, FileCache};
use crate::composer::{Composer, ProcessComposer};
use crate::config::{PackagesConfig, StoreConfig};
use crate::descriptor::{PackageProperties, Requirements, DEFAULT_INSTALL_ORDER, DESCRIPTOR_FILE};
use crate::drivers::{GitHubDriver, StoreDriver};
use crate::factory::{PackageLocator, PackageTypeBinding};
use crate::http::{HttpClient, ReqwestClient};
use crate::registry::{PackageRegistry, PackageStatus, RegistryEntry};
use crate::repository::{Repository, RepositoryDriver};
use crate::storage::{LocalStorage, Storage, BACKUP_DIR};
use crate::validator::PackageValidator;
use crate::{Package, PackageError, PackageType, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Filter over descriptor properties, every entry must match
pub type PropertyFilter = BTreeMap<String, Value>;

/// Services shared by every manager
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn Cache>,
    pub storage: Arc<dyn Storage>,
    pub http: Arc<dyn HttpClient>,
    pub composer: Arc<Composer>,
}

impl Collaborators {
    /// Default local collaborators for a configuration
    pub fn from_config(config: &PackagesConfig) -> Result<Self> {
        let commands = Arc::new(ProcessComposer::new(
            PathBuf::from("composer"),
            config.composer_root.clone(),
        ));

        Ok(Self {
            cache: Arc::new(FileCache::new(config.storage_path.join("cache"))),
            storage: Arc::new(LocalStorage::new(config.storage_path.clone())),
            http: Arc::new(ReqwestClient::new(config.http_timeout())?),
            composer: Arc::new(Composer::new(config.composer_root.clone(), commands)),
        })
    }
}

/// Manager of one package type
pub struct PackageManager {
    package_type: PackageType,
    path: PathBuf,
    behavior: Arc<dyn PackageBehavior>,
    registry: Option<Arc<dyn PackageRegistry>>,
    collaborators: Collaborators,
    locator: PackageLocator,
    cache_ttl: chrono::Duration,
    store: StoreConfig,
    scans: AtomicUsize,
}

impl PackageManager {
    pub fn new(
        package_type: PackageType,
        path: PathBuf,
        binding: PackageTypeBinding,
        collaborators: Collaborators,
        locator: PackageLocator,
        config: &PackagesConfig,
    ) -> Self {
        Self {
            package_type,
            path,
            behavior: binding.behavior,
            registry: binding.registry,
            collaborators,
            locator,
            cache_ttl: config.cache_ttl(),
            store: config.store.clone(),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    /// Root directory of the managed type
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> Option<&Arc<dyn PackageRegistry>> {
        self.registry.as_ref()
    }

    /// Number of scans performed, cache hits do not count
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    fn cache_key(&self) -> String {
        format!("{}.list", self.package_type)
    }

    /// Build a package entity
    ///
    /// `None` when a filesystem backed package has no directory. Unreadable
    /// descriptors leave the package with default properties.
    pub fn create_package(&self, name: &str, load_properties: bool) -> Option<Package> {
        let mut package = Package::new(
            name,
            self.package_type,
            self.path.clone(),
            Arc::clone(&self.behavior),
            self.registry.clone(),
        );

        if self.package_type.is_filesystem_backed() && !package.path().is_dir() {
            debug!("No {} package directory for {}", self.package_type, name);
            return None;
        }

        if load_properties {
            if let Err(e) = package.load_properties() {
                debug!("Using default properties for {}: {}", name, e);
            }
        }
        Some(package)
    }

    /// Whether the package exists (descriptor on disk, or installed composer package)
    pub fn has_package(&self, name: &str) -> bool {
        if self.package_type.is_filesystem_backed() {
            self.package_type
                .package_dir(&self.path, name)
                .join(DESCRIPTOR_FILE)
                .is_file()
        } else {
            self.collaborators.composer.is_installed(name)
        }
    }

    /// Load the properties of a package, failing on a missing or corrupt descriptor
    pub fn load_package_properties(&self, name: &str) -> Result<PackageProperties> {
        let mut package = Package::new(
            name,
            self.package_type,
            self.path.clone(),
            Arc::clone(&self.behavior),
            self.registry.clone(),
        );
        package.load_properties()?;
        Ok(package.properties().clone())
    }

    /// Properties of a package, `None` when it does not exist
    pub fn get_package_properties(&self, name: &str) -> Option<PackageProperties> {
        self.create_package(name, true)
            .map(|package| package.properties().clone())
    }

    /// Discover package names
    ///
    /// Composer packages come from the installed manifest as is. Other types are
    /// the subdirectories of the root, optionally restricted to packages matching
    /// every filter entry.
    pub fn scan(&self, filter: Option<&PropertyFilter>) -> Vec<String> {
        self.scans.fetch_add(1, Ordering::Relaxed);

        if !self.package_type.is_filesystem_backed() {
            return self.collaborators.composer.installed_package_names();
        }

        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();

        if let Some(filter) = filter {
            names.retain(|name| {
                self.create_package(name, true)
                    .map(|package| package.properties().matches(filter))
                    .unwrap_or(false)
            });
        }

        debug!("Scanned {} {} packages", names.len(), self.package_type);
        names
    }

    /// Package names, from the cache when `cached` is set and the entry is live
    ///
    /// Only unfiltered scans are cached.
    pub fn get_packages(&self, cached: bool, filter: Option<&PropertyFilter>) -> Vec<String> {
        if filter.is_some() {
            return self.scan(filter);
        }

        let key = self.cache_key();
        if cached {
            if let Some(names) = self
                .collaborators
                .cache
                .fetch(&key)
                .and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
            {
                debug!("Cache hit for {}", key);
                return names;
            }
            debug!("Cache miss for {}", key);
        }

        let names = self.scan(None);
        if let Err(e) = self
            .collaborators
            .cache
            .save(&key, Value::from(names.clone()), self.cache_ttl)
        {
            warn!("Cannot cache {}: {}", key, e);
        }
        names
    }

    /// First package whose property `key` equals `value`
    pub fn find_package(&self, key: &str, value: Value) -> Option<Package> {
        let mut filter = PropertyFilter::new();
        filter.insert(key.to_string(), value);

        self.get_packages(false, None)
            .into_iter()
            .filter_map(|name| self.create_package(&name, true))
            .find(|package| package.properties().matches(&filter))
    }

    /// Order packages for installation
    ///
    /// System packages come first, then ascending install order. Packages with the
    /// same order keep their relative position.
    pub fn sort_packages(&self, names: &[String]) -> Vec<String> {
        let mut ordered: Vec<(i64, &String)> = names
            .iter()
            .map(|name| {
                let order = self
                    .create_package(name, true)
                    .map(|package| package.install_order())
                    .unwrap_or(DEFAULT_INSTALL_ORDER);
                (order, name)
            })
            .collect();

        ordered.sort_by_key(|(order, _)| *order);
        ordered.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Install every package in install order
    ///
    /// With `skip_errors` a failed package still reports progress and does not count
    /// as an error. Otherwise the error callback fires and the result is false.
    pub fn install_all_packages(
        &self,
        mut on_progress: Option<&mut dyn FnMut(&str)>,
        mut on_error: Option<&mut dyn FnMut(&str)>,
        skip_errors: bool,
    ) -> bool {
        if let Err(e) = self.collaborators.cache.clear() {
            warn!("Cannot clear package cache: {}", e);
        }

        let packages = self.sort_packages(&self.get_packages(false, None));
        info!("Installing {} {} packages", packages.len(), self.package_type);

        let mut errors = 0;
        for name in &packages {
            let installed = match self.install_package(name) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Install of {} {} failed: {}", self.package_type, name, e);
                    false
                }
            };

            if installed || skip_errors {
                if let Some(callback) = on_progress.as_deref_mut() {
                    callback(name);
                }
            } else {
                if let Some(callback) = on_error.as_deref_mut() {
                    callback(name);
                }
                errors += 1;
            }
        }

        errors == 0
    }

    /// Run the post install step of every package
    pub fn post_install_all_packages(&self) -> bool {
        if let Err(e) = self.collaborators.cache.clear() {
            warn!("Cannot clear package cache: {}", e);
        }

        let errors = self
            .get_packages(false, None)
            .iter()
            .filter(|name| match self.post_install_package(name) {
                Ok(()) => false,
                Err(e) => {
                    warn!("Post install of {} failed: {}", name, e);
                    true
                }
            })
            .count();

        errors == 0
    }

    /// Install one package
    ///
    /// Declared requirements are validated first; problems are logged, never fatal.
    pub fn install_package(&self, name: &str) -> Result<()> {
        let package = self.require_package(name)?;

        let report = self.create_validator(package.require().clone()).validate();
        for check in report.missing() {
            warn!("{} requires missing package {}", name, check.name);
        }
        for check in report.checks().filter(|c| c.warning) {
            warn!(
                "{} requires {} {}, found {}",
                name,
                check.name,
                check.version.as_deref().unwrap_or("*"),
                check.package_version.as_deref().unwrap_or("unknown")
            );
        }

        package.install(None)?;
        info!("Installed {} package {}", self.package_type, name);
        Ok(())
    }

    pub fn post_install_package(&self, name: &str) -> Result<()> {
        self.require_package(name)?.post_install()
    }

    pub fn uninstall_package(&self, name: &str) -> bool {
        self.lifecycle(name, "uninstall", |package| package.uninstall().map(|_| true))
    }

    pub fn enable_package(&self, name: &str) -> bool {
        self.lifecycle(name, "enable", Package::enable)
    }

    pub fn disable_package(&self, name: &str) -> bool {
        self.lifecycle(name, "disable", Package::disable)
    }

    fn require_package(&self, name: &str) -> Result<Package> {
        self.create_package(name, true)
            .ok_or_else(|| PackageError::PackageNotFound {
                name: name.to_string(),
                package_type: self.package_type.to_string(),
            })
    }

    fn lifecycle<F>(&self, name: &str, action: &str, operation: F) -> bool
    where
        F: FnOnce(&Package) -> Result<bool>,
    {
        let Some(package) = self.create_package(name, true) else {
            warn!("Cannot {} {}: package not found", action, name);
            return false;
        };

        match operation(&package) {
            Ok(done) => {
                info!("{} {} package {}: {}", action, self.package_type, name, done);
                done
            }
            Err(e) => {
                warn!("Cannot {} {}: {}", action, name, e);
                false
            }
        }
    }

    /// Validator for a `require` map
    pub fn create_validator(&self, requires: Requirements) -> PackageValidator {
        PackageValidator::new(
            requires,
            self.locator.clone(),
            Arc::clone(&self.collaborators.composer),
        )
    }

    /// Package store repository installing into this type's root
    pub fn get_repository(&self, name: &str) -> Repository {
        let driver = StoreDriver::new(
            &self.store.host,
            name,
            self.package_type,
            self.store.access_key.clone(),
        );
        self.repository(Box::new(driver))
    }

    /// GitHub repository installing into this type's root
    pub fn get_repository_for_url(&self, url: &str) -> Result<Repository> {
        Ok(self.repository(Box::new(GitHubDriver::from_url(url)?)))
    }

    fn repository(&self, driver: Box<dyn RepositoryDriver>) -> Repository {
        Repository::new(
            driver,
            Arc::clone(&self.collaborators.storage),
            Arc::clone(&self.collaborators.http),
            self.path.clone(),
        )
    }

    /// Registry entries of this type, optionally restricted to a status
    pub fn get_installed(&self, status: Option<PackageStatus>) -> Vec<RegistryEntry> {
        let Some(registry) = &self.registry else {
            return Vec::new();
        };

        let mut filter = PropertyFilter::new();
        if let Some(status) = status {
            filter.insert("status".to_string(), Value::from(u8::from(status)));
        }
        registry.get_packages_list(&filter)
    }

    /// Backup archive file name of a package
    pub fn backup_file_name(&self, package: &Package) -> String {
        format!("{}-{}-{}.zip", package.name(), self.package_type, package.version())
    }

    /// Archive a package directory into the storage backup folder
    pub fn create_backup(&self, name: &str) -> bool {
        match self.try_create_backup(name) {
            Ok(path) => {
                info!("Backup of {} written to {}", name, path.display());
                true
            }
            Err(e) => {
                warn!("Backup of {} failed: {}", name, e);
                false
            }
        }
    }

    fn try_create_backup(&self, name: &str) -> Result<PathBuf> {
        let backup_dir = self.collaborators.storage.full_path().join(BACKUP_DIR);
        ensure_writable(&backup_dir)?;

        if !self.has_package(name) {
            return Err(PackageError::PackageNotFound {
                name: name.to_string(),
                package_type: self.package_type.to_string(),
            });
        }
        let package = self.require_package(name)?;
        let source = package.path();
        ensure_writable(&source)?;

        let file_name = self.backup_file_name(&package);
        let key = format!("{}/{}", BACKUP_DIR, file_name);
        if self.collaborators.storage.has(&key) {
            self.collaborators.storage.delete(&key)?;
        }

        let dest = backup_dir.join(file_name);
        create_zip(&source, &dest, &VCS_DIRS)?;
        Ok(dest)
    }
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("package_type", &self.package_type)
            .field("path", &self.path)
            .finish()
    }
}
