//! Composer managed dependency packages
//!
//! Composer packages are not scanned from a package root. Their list and versions
//! come from `vendor/composer/installed.json`, and install/remove is delegated to
//! the external `composer` tool.

use crate::Result;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// One entry of the composer installed manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposerPackageInfo {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Installed manifest layouts written by different composer versions
#[derive(Deserialize)]
#[serde(untagged)]
enum InstalledManifest {
    Wrapped { packages: Vec<ComposerPackageInfo> },
    List(Vec<ComposerPackageInfo>),
}

/// Runs composer commands (`update`, `require`, `remove`)
pub trait ComposerCommands: Send + Sync {
    fn run(&self, command: &str, packages: &[String]) -> anyhow::Result<()>;
}

/// Invokes the `composer` executable in the project root
pub struct ProcessComposer {
    executable: PathBuf,
    project_root: PathBuf,
}

impl ProcessComposer {
    pub fn new(executable: PathBuf, project_root: PathBuf) -> Self {
        Self {
            executable,
            project_root,
        }
    }
}

impl ComposerCommands for ProcessComposer {
    fn run(&self, command: &str, packages: &[String]) -> anyhow::Result<()> {
        debug!("Running composer {} {:?}", command, packages);
        let status = Command::new(&self.executable)
            .arg(command)
            .args(packages)
            .arg("--quiet")
            .arg("--no-interaction")
            .current_dir(&self.project_root)
            .status()?;

        if !status.success() {
            anyhow::bail!("composer {} exited with {}", command, status);
        }
        Ok(())
    }
}

/// Access to the composer installed manifest of a project
pub struct Composer {
    project_root: PathBuf,
    commands: Arc<dyn ComposerCommands>,
}

impl Composer {
    pub fn new(project_root: PathBuf, commands: Arc<dyn ComposerCommands>) -> Self {
        Self {
            project_root,
            commands,
        }
    }

    /// Path of `vendor/composer/installed.json`
    pub fn installed_manifest_path(&self) -> PathBuf {
        installed_manifest_path(&self.project_root)
    }

    /// Read every installed package, empty when the manifest is missing or unreadable
    pub fn read_installed_packages(&self) -> Vec<ComposerPackageInfo> {
        let path = self.installed_manifest_path();
        match read_installed(&path) {
            Ok(packages) => packages,
            Err(e) => {
                debug!("No composer manifest at {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Names of installed packages, in manifest order
    pub fn installed_package_names(&self) -> Vec<String> {
        self.read_installed_packages()
            .into_iter()
            .map(|p| p.name)
            .collect()
    }

    pub fn installed_package_info(&self, name: &str) -> Option<ComposerPackageInfo> {
        self.read_installed_packages()
            .into_iter()
            .find(|p| p.name == name)
    }

    pub fn installed_version(&self, name: &str) -> Option<String> {
        self.installed_package_info(name).and_then(|p| p.version)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed_package_info(name).is_some()
    }

    /// Installed version for each requested name, resolved in one manifest read
    pub fn local_packages_info(&self, names: &[String]) -> FxHashMap<String, Option<String>> {
        let mut result: FxHashMap<String, Option<String>> =
            names.iter().map(|n| (n.clone(), None)).collect();

        for package in self.read_installed_packages() {
            if let Some(slot) = result.get_mut(&package.name) {
                *slot = package.version;
            }
        }
        result
    }

    /// `composer update <name>`
    pub fn update_package(&self, name: &str) -> anyhow::Result<()> {
        self.commands.run("update", &[name.to_string()])
    }

    /// `composer require <name>`
    pub fn require_package(&self, name: &str) -> anyhow::Result<()> {
        self.commands.run("require", &[name.to_string()])
    }

    /// `composer remove <name>`
    pub fn remove_package(&self, name: &str) -> anyhow::Result<()> {
        let result = self.commands.run("remove", &[name.to_string()]);
        if let Err(e) = &result {
            warn!("composer remove {} failed: {}", name, e);
        }
        result
    }
}

fn installed_manifest_path(project_root: &Path) -> PathBuf {
    project_root
        .join("vendor")
        .join("composer")
        .join("installed.json")
}

fn read_installed(path: &Path) -> Result<Vec<ComposerPackageInfo>> {
    let content = fs::read_to_string(path)?;
    let manifest: InstalledManifest = serde_json::from_str(&content)?;
    Ok(match manifest {
        InstalledManifest::Wrapped { packages } => packages,
        InstalledManifest::List(packages) => packages,
    })
}
