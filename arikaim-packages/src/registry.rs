//! Installed package registry

use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Installed package status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PackageStatus {
    Disabled = 0,
    Enabled = 1,
}

impl From<PackageStatus> for u8 {
    fn from(status: PackageStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for PackageStatus {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PackageStatus::Disabled),
            1 => Ok(PackageStatus::Enabled),
            other => Err(format!("invalid package status {}", other)),
        }
    }
}

/// Registry record for one installed package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Package name
    pub name: String,

    /// Installed version
    pub version: String,

    /// Enabled or disabled
    pub status: PackageStatus,

    /// Primary package of its type
    #[serde(default)]
    pub primary: bool,

    /// When the package was installed
    pub installed_at: DateTime<Utc>,

    /// Type specific bookkeeping written at install time
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl RegistryEntry {
    /// Enabled entry stamped with the current time
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            status: PackageStatus::Enabled,
            primary: false,
            installed_at: Utc::now(),
            properties: Map::new(),
        }
    }

    /// Look up a field by key, falling back to the bookkeeping properties
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "version" => Some(Value::String(self.version.clone())),
            "status" => Some(Value::from(u8::from(self.status))),
            "primary" => Some(Value::Bool(self.primary)),
            _ => self.properties.get(key).cloned(),
        }
    }
}

/// Durable record of installed packages
///
/// The lifecycle core only ever talks to this interface. Persistence belongs to the host.
pub trait PackageRegistry: Send + Sync {
    fn get_package(&self, name: &str) -> Option<RegistryEntry>;

    /// Insert or replace an entry
    fn add_package(&self, name: &str, entry: RegistryEntry) -> Result<()>;

    /// Remove an entry, returns false when it was not present
    fn remove_package(&self, name: &str) -> Result<bool>;

    /// Entries matching every `key -> value` pair of the filter
    fn get_packages_list(&self, filter: &BTreeMap<String, Value>) -> Vec<RegistryEntry>;

    fn has_package(&self, name: &str) -> bool;

    /// Update the status, returns false for unknown packages
    fn set_package_status(&self, name: &str, status: PackageStatus) -> Result<bool>;

    fn get_package_status(&self, name: &str) -> Option<PackageStatus>;

    /// Mark a package as primary, clearing the flag on every other entry
    fn set_primary(&self, name: &str) -> Result<bool>;

    fn is_primary(&self, name: &str) -> bool;
}

/// JSON file backed registry (`registry.json`)
///
/// Without a file path the registry lives in memory only.
pub struct JsonRegistry {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, RegistryEntry>>,
}

impl JsonRegistry {
    /// Registry without persistence
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open or create a registry file
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, RegistryEntry>) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(entries)?;
            fs::write(path, content)?;
            debug!("Saved package registry {}", path.display());
        }
        Ok(())
    }
}

impl PackageRegistry for JsonRegistry {
    fn get_package(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.read().get(name).cloned()
    }

    fn add_package(&self, name: &str, entry: RegistryEntry) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(name.to_string(), entry);
        self.persist(&entries)
    }

    fn remove_package(&self, name: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        let removed = entries.remove(name).is_some();
        if removed {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    fn get_packages_list(&self, filter: &BTreeMap<String, Value>) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .values()
            .filter(|entry| {
                filter
                    .iter()
                    .all(|(key, expected)| entry.get(key).as_ref() == Some(expected))
            })
            .cloned()
            .collect()
    }

    fn has_package(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn set_package_status(&self, name: &str, status: PackageStatus) -> Result<bool> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.status = status;
                self.persist(&entries)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_package_status(&self, name: &str) -> Option<PackageStatus> {
        self.entries.read().get(name).map(|e| e.status)
    }

    fn set_primary(&self, name: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        if !entries.contains_key(name) {
            return Ok(false);
        }
        for (key, entry) in entries.iter_mut() {
            entry.primary = key == name;
        }
        self.persist(&entries)?;
        Ok(true)
    }

    fn is_primary(&self, name: &str) -> bool {
        self.entries.read().get(name).map(|e| e.primary).unwrap_or(false)
    }
}
