//! Shared fixtures for integration tests

#![allow(dead_code)]

use arikaim_packages::archive::create_zip;
use arikaim_packages::{
    Collaborators, Composer, ComposerCommands, HttpClient, LocalStorage, MemoryCache,
    PackageManagerFactory, PackagesConfig, RequestOptions, Result, DESCRIPTOR_FILE,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// HTTP client serving one archive and one "latest" version
pub struct FixtureHttp {
    pub archive: PathBuf,
    pub version: String,
}

impl FixtureHttp {
    fn serve(&self, options: &RequestOptions) -> Result<()> {
        if let Some(sink) = &options.sink {
            fs::copy(&self.archive, sink)?;
        }
        Ok(())
    }
}

impl HttpClient for FixtureHttp {
    fn get(&self, _url: &str, options: &RequestOptions) -> Result<()> {
        self.serve(options)
    }

    fn put(&self, _url: &str, options: &RequestOptions) -> Result<()> {
        self.serve(options)
    }

    fn fetch(&self, _url: &str) -> Result<String> {
        Ok(format!(r#"{{ "tag_name": "{}", "result": {{ "version": "{}" }} }}"#, self.version, self.version))
    }
}

struct NoCommands;

impl ComposerCommands for NoCommands {
    fn run(&self, _command: &str, _packages: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Application sandbox with every package root and a storage folder
pub struct Sandbox {
    pub dir: TempDir,
    pub config: PackagesConfig,
    pub cache: Arc<MemoryCache>,
}

impl Sandbox {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let config = PackagesConfig::with_root(dir.path());
        config.ensure_directories().unwrap();
        Self {
            dir,
            config,
            cache: Arc::new(MemoryCache::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Factory whose HTTP client serves `archive`
    pub fn factory(&self, archive: Option<PathBuf>) -> PackageManagerFactory {
        let http = FixtureHttp {
            archive: archive.unwrap_or_else(|| self.root().join("missing.zip")),
            version: "1.0.0".to_string(),
        };
        let collaborators = Collaborators {
            cache: self.cache.clone(),
            storage: Arc::new(LocalStorage::new(self.config.storage_path.clone())),
            http: Arc::new(http),
            composer: Arc::new(Composer::new(self.root().to_path_buf(), Arc::new(NoCommands))),
        };
        PackageManagerFactory::new(self.config.clone(), collaborators).unwrap()
    }

    /// Zip `files` (relative path, content) into a fixture archive
    pub fn archive(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let source = self.root().join("fixtures").join(name);
        for (path, content) in files {
            let target = source.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        let archive = self.root().join("fixtures").join(format!("{}.zip", name));
        create_zip(&source, &archive, &[]).unwrap();
        archive
    }
}

/// Write a package directory with its descriptor
pub fn write_package(root: &Path, name: &str, descriptor: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(DESCRIPTOR_FILE), descriptor).unwrap();
}
