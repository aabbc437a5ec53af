//! Package engine configuration

use crate::storage::{BACKUP_DIR, REGISTRY_DIR, REPOSITORY_DIR, TEMP_DIR};
use crate::{PackageType, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Package engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// Root directory per package type, keyed by type tag or alias
    #[serde(default = "default_paths")]
    pub paths: BTreeMap<String, PathBuf>,

    /// Storage root for archives, staged packages and backups
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Project root holding `composer.json` and `vendor/`
    #[serde(default = "default_composer_root")]
    pub composer_root: PathBuf,

    /// Lifetime of cached package lists
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub http_timeout: u64,

    /// Package store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Package store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,

    /// License key sent with private downloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            access_key: None,
        }
    }
}

fn default_app_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("arikaim")
}

fn default_paths() -> BTreeMap<String, PathBuf> {
    let root = default_app_root();
    [
        (PackageType::Extension, "extensions"),
        (PackageType::Template, "themes"),
        (PackageType::Module, "modules"),
        (PackageType::Library, "library"),
        (PackageType::ComponentsLibrary, "components"),
        (PackageType::Service, "services"),
        (PackageType::HtmlComponent, "html-components"),
    ]
    .into_iter()
    .map(|(package_type, dir)| (package_type.to_string(), root.join(dir)))
    .collect()
}

fn default_storage_path() -> PathBuf {
    default_app_root().join("storage")
}

fn default_composer_root() -> PathBuf {
    default_app_root()
}

fn default_cache_ttl_hours() -> i64 {
    2
}

fn default_timeout() -> u64 {
    300
}

fn default_store_host() -> String {
    "https://arikaim.com".to_string()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            storage_path: default_storage_path(),
            composer_root: default_composer_root(),
            cache_ttl_hours: default_cache_ttl_hours(),
            http_timeout: default_timeout(),
            store: StoreConfig::default(),
        }
    }
}

impl PackagesConfig {
    /// Configuration rooted at an application directory
    pub fn with_root(root: &Path) -> Self {
        let paths = default_paths()
            .into_iter()
            .filter_map(|(key, path)| {
                let dir = path.file_name()?.to_owned();
                Some((key, root.join(dir)))
            })
            .collect();

        Self {
            paths,
            storage_path: root.join("storage"),
            composer_root: root.to_path_buf(),
            ..Self::default()
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("arikaim").join("packages.toml"))
    }

    /// Root directories resolved to package types
    ///
    /// Keys that are neither a type tag nor a known alias are skipped.
    pub fn package_paths(&self) -> FxHashMap<PackageType, PathBuf> {
        let mut paths = FxHashMap::default();
        for (key, path) in &self.paths {
            match key.parse::<PackageType>() {
                Ok(package_type) => {
                    paths.insert(package_type, path.clone());
                }
                Err(_) => warn!("Ignoring path for unknown package type '{}'", key),
            }
        }
        paths
    }

    /// Registry file of a package type
    pub fn registry_path(&self, package_type: PackageType) -> PathBuf {
        self.storage_path
            .join(REGISTRY_DIR)
            .join(format!("{}.json", package_type))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Create the storage layout and every package root
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [REPOSITORY_DIR, TEMP_DIR, BACKUP_DIR] {
            std::fs::create_dir_all(self.storage_path.join(dir))?;
        }
        for path in self.paths.values() {
            std::fs::create_dir_all(path)?;
        }
        Ok(())
    }
}
