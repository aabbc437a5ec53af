//! Local blob storage

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Path relative blob storage collaborator
///
/// Repository drivers keep downloaded archives under `repository/` and staged
/// folders under `temp/`. Backups go to `backup/`.
pub trait Storage: Send + Sync {
    /// Whether a file or directory exists
    fn has(&self, path: &str) -> bool;

    /// Read a file as text
    fn read(&self, path: &str) -> Result<String>;

    /// Delete a file
    fn delete(&self, path: &str) -> Result<()>;

    /// Delete a directory and its content
    fn delete_dir(&self, path: &str) -> Result<()>;

    /// Absolute root of the storage
    fn full_path(&self) -> PathBuf;
}

/// Storage subdirectory holding downloaded package archives
pub const REPOSITORY_DIR: &str = "repository";

/// Storage subdirectory holding staged (extracted) packages
pub const TEMP_DIR: &str = "temp";

/// Storage subdirectory holding package backups
pub const BACKUP_DIR: &str = "backup";

/// Storage subdirectory holding installed package registries
pub const REGISTRY_DIR: &str = "registry";

/// Storage rooted at a local directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path.trim_start_matches('/')))
    }
}

impl Storage for LocalStorage {
    fn has(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn read(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.resolve(path))?)
    }

    fn delete(&self, path: &str) -> Result<()> {
        Ok(fs::remove_file(self.resolve(path))?)
    }

    fn delete_dir(&self, path: &str) -> Result<()> {
        Ok(fs::remove_dir_all(self.resolve(path))?)
    }

    fn full_path(&self) -> PathBuf {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_storage() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        fs::create_dir_all(dir.path().join("temp/pkg")).unwrap();
        fs::write(dir.path().join("temp/pkg/file.txt"), "content").unwrap();

        assert!(storage.has("temp/pkg/file.txt"));
        assert!(storage.has("/temp/pkg"));
        assert_eq!(storage.read("temp/pkg/file.txt").unwrap(), "content");

        storage.delete("temp/pkg/file.txt").unwrap();
        assert!(!storage.has("temp/pkg/file.txt"));

        storage.delete_dir("temp/pkg").unwrap();
        assert!(!storage.has("temp/pkg"));
        assert!(storage.read("missing").is_err());
    }
}
