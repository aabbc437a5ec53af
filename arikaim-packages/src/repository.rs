//! Remote package repositories
//!
//! A [`Repository`] walks one package through
//! `Unresolved -> VersionKnown -> Archived -> Staged -> Installed`. The steps are
//! shared by every source; a [`RepositoryDriver`] only supplies identity and
//! endpoints. A failed step leaves whatever the earlier steps produced (cached
//! archive, staged folder) in place for a retry.

use crate::archive::{ensure_writable, extract_zip, move_dir};
use crate::descriptor::{PackageProperties, DESCRIPTOR_FILE};
use crate::http::{HttpClient, RequestOptions};
use crate::storage::{Storage, REPOSITORY_DIR, TEMP_DIR};
use crate::{PackageError, Result};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Last step a repository install completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepositoryState {
    Unresolved,
    VersionKnown,
    Archived,
    Staged,
    Installed,
}

impl fmt::Display for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepositoryState::Unresolved => "unresolved",
            RepositoryState::VersionKnown => "version-known",
            RepositoryState::Archived => "archived",
            RepositoryState::Staged => "staged",
            RepositoryState::Installed => "installed",
        };
        f.write_str(name)
    }
}

/// Install error together with the last state reached before it
#[derive(Debug)]
pub struct InstallFailure {
    pub reached: RepositoryState,
    pub error: PackageError,
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (stopped at {})", self.error, self.reached)
    }
}

impl std::error::Error for InstallFailure {}

/// HTTP method of an archive download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMethod {
    Get,
    Put,
}

/// How to fetch the archive of one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub method: DownloadMethod,
    pub url: String,
    pub form_params: Vec<(String, String)>,
}

impl DownloadRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: DownloadMethod::Get,
            url,
            form_params: Vec::new(),
        }
    }

    pub fn put(url: String, form_params: Vec<(String, String)>) -> Self {
        Self {
            method: DownloadMethod::Put,
            url,
            form_params,
        }
    }
}

/// Source specific part of a repository
pub trait RepositoryDriver: Send + Sync {
    /// Package identity on the remote side (`owner/repo` for URL based sources)
    fn package_name(&self) -> &str;

    /// Short repository name, used for staging folders
    fn repository_name(&self) -> &str;

    fn repository_url(&self) -> Option<&str> {
        None
    }

    /// Downloads need an access key
    fn is_private(&self) -> bool {
        false
    }

    /// Endpoint answering the latest version
    fn version_url(&self) -> String;

    /// Extract the version from the endpoint's JSON answer
    fn parse_version(&self, response: &Value) -> Option<String>;

    fn download_request(&self, version: &str) -> DownloadRequest;
}

/// Repository of one package
pub struct Repository {
    driver: Box<dyn RepositoryDriver>,
    storage: Arc<dyn Storage>,
    http: Arc<dyn HttpClient>,
    install_dir: PathBuf,
}

impl Repository {
    /// Create a repository installing into `install_dir`
    pub fn new(
        driver: Box<dyn RepositoryDriver>,
        storage: Arc<dyn Storage>,
        http: Arc<dyn HttpClient>,
        install_dir: PathBuf,
    ) -> Self {
        Self {
            driver,
            storage,
            http,
            install_dir,
        }
    }

    pub fn package_name(&self) -> &str {
        self.driver.package_name()
    }

    pub fn repository_name(&self) -> &str {
        self.driver.repository_name()
    }

    pub fn repository_url(&self) -> Option<&str> {
        self.driver.repository_url()
    }

    pub fn is_private(&self) -> bool {
        self.driver.is_private()
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Archive file name of a version, stable for a given `(name, version)`
    pub fn package_file_name(&self, version: &str) -> String {
        format!("{}-{}.zip", self.package_name().replace('/', "_"), version)
    }

    /// Storage relative path of the archive
    fn archive_key(&self, version: &str) -> String {
        format!("{}/{}", REPOSITORY_DIR, self.package_file_name(version))
    }

    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.storage
            .full_path()
            .join(REPOSITORY_DIR)
            .join(self.package_file_name(version))
    }

    /// Staging folder of a version
    pub fn staging_path(&self, version: &str) -> PathBuf {
        self.storage.full_path().join(TEMP_DIR).join(self.staging_name(version))
    }

    fn staging_name(&self, version: &str) -> String {
        format!("{}-{}", self.repository_name(), version)
    }

    /// Latest remote version, `None` when the endpoint gives nothing usable
    pub fn last_version(&self) -> Option<String> {
        let url = self.driver.version_url();
        debug!("Resolving latest version of {} from {}", self.package_name(), url);

        let body = match self.http.fetch(&url) {
            Ok(body) => body,
            Err(e) => {
                warn!("Version lookup for {} failed: {}", self.package_name(), e);
                return None;
            }
        };

        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|response| self.driver.parse_version(&response))
            .filter(|version| !version.trim().is_empty())
    }

    /// Download an archive, the latest version when `version` is `None`
    ///
    /// True when the archive exists afterwards.
    pub fn download(&self, version: Option<&str>) -> bool {
        let version = match self.resolve_version(version) {
            Ok(version) => version,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };

        match self.download_archive(&version) {
            Ok(_) => true,
            Err(e) => {
                warn!("Download of {} {} failed: {}", self.package_name(), version, e);
                false
            }
        }
    }

    fn resolve_version(&self, version: Option<&str>) -> Result<String> {
        match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(version) => Ok(version.to_string()),
            None => self.last_version().ok_or_else(|| PackageError::VersionUnavailable {
                package: self.package_name().to_string(),
            }),
        }
    }

    fn download_archive(&self, version: &str) -> Result<PathBuf> {
        let key = self.archive_key(version);
        let path = self.archive_path(version);
        if let Some(parent) = path.parent() {
            ensure_writable(parent)?;
        }
        if self.storage.has(&key) {
            debug!("Removing previous archive {}", key);
            self.storage.delete(&key)?;
        }

        let request = self.driver.download_request(version);
        let mut options = RequestOptions::sink(path.clone());
        for (name, value) in &request.form_params {
            options = options.with_param(name, value);
        }

        info!("Downloading {} {} from {}", self.package_name(), version, request.url);
        let sent = match request.method {
            DownloadMethod::Get => self.http.get(&request.url, &options),
            DownloadMethod::Put => self.http.put(&request.url, &options),
        };

        if self.storage.has(&key) {
            if let Err(e) = sent {
                debug!("Archive {} present despite request error: {}", key, e);
            }
            return Ok(path);
        }

        Err(sent.err().unwrap_or_else(|| PackageError::NetworkError {
            message: format!("no archive written for {}", request.url),
        }))
    }

    /// Extract a downloaded archive into its staging folder
    ///
    /// Returns the folder holding the package content.
    pub fn extract(&self, version: &str) -> Option<PathBuf> {
        match self.extract_archive(version) {
            Ok(folder) => Some(folder),
            Err(e) => {
                warn!("Extracting {} {} failed: {}", self.package_name(), version, e);
                None
            }
        }
    }

    fn extract_archive(&self, version: &str) -> Result<PathBuf> {
        let staged = self.staging_path(version);
        let key = format!("{}/{}", TEMP_DIR, self.staging_name(version));
        if self.storage.has(&key) {
            self.storage.delete_dir(&key)?;
        }

        extract_zip(&self.archive_path(version), &staged)?;
        debug!("Extracted {} into {}", self.package_file_name(version), staged.display());
        package_root(&staged)
    }

    /// Install a version, the latest when `version` is `None`
    pub fn install(&self, version: Option<&str>) -> bool {
        match self.try_install(version) {
            Ok(path) => {
                info!("Installed {} into {}", self.package_name(), path.display());
                true
            }
            Err(failure) => {
                warn!("Install of {} failed: {}", self.package_name(), failure);
                false
            }
        }
    }

    /// Install and report where the state machine stopped on failure
    pub fn try_install(&self, version: Option<&str>) -> std::result::Result<PathBuf, InstallFailure> {
        let mut state = RepositoryState::Unresolved;
        let fail = |reached, error| InstallFailure { reached, error };

        let version = self.resolve_version(version).map_err(|e| fail(state, e))?;
        state = RepositoryState::VersionKnown;

        self.download_archive(&version).map_err(|e| fail(state, e))?;
        state = RepositoryState::Archived;

        let folder = self.extract_archive(&version).map_err(|e| fail(state, e))?;
        state = RepositoryState::Staged;

        let name = staged_package_name(&folder).map_err(|e| fail(state, e))?;
        let dest = self.install_dir.join(&name);
        self.place(&folder, &dest).map_err(|e| fail(state, e))?;

        Ok(dest)
    }

    /// Move a staged folder to `dest`, restoring the previous install if the move fails
    fn place(&self, folder: &Path, dest: &Path) -> Result<()> {
        if !dest.exists() {
            return move_dir(folder, dest);
        }

        let mut previous = dest.as_os_str().to_owned();
        previous.push(".previous");
        let previous = PathBuf::from(previous);
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        debug!("Replacing {}", dest.display());
        fs::rename(dest, &previous)?;
        match move_dir(folder, dest) {
            Ok(()) => {
                fs::remove_dir_all(&previous)?;
                Ok(())
            }
            Err(e) => {
                if dest.exists() {
                    fs::remove_dir_all(dest)?;
                }
                fs::rename(&previous, dest)?;
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("package_name", &self.package_name())
            .field("repository_name", &self.repository_name())
            .field("install_dir", &self.install_dir)
            .finish()
    }
}

/// Folder holding the descriptor: the staging root, or its single subdirectory
fn package_root(staged: &Path) -> Result<PathBuf> {
    if staged.join(DESCRIPTOR_FILE).is_file() {
        return Ok(staged.to_path_buf());
    }

    let entries = fs::read_dir(staged)?.collect::<std::io::Result<Vec<_>>>()?;
    match entries.as_slice() {
        [single] if single.path().is_dir() => Ok(single.path()),
        _ => Ok(staged.to_path_buf()),
    }
}

/// Package name declared by a staged folder
fn staged_package_name(folder: &Path) -> Result<String> {
    let invalid = |message: &str| PackageError::InvalidPackage {
        path: folder.to_path_buf(),
        message: message.to_string(),
    };

    let descriptor = folder.join(DESCRIPTOR_FILE);
    if !descriptor.is_file() {
        return Err(invalid("missing package descriptor"));
    }
    let properties =
        PackageProperties::from_file(&descriptor).map_err(|e| invalid(&e.to_string()))?;

    let name = properties.name.trim();
    if name.is_empty() {
        return Err(invalid("descriptor has no package name"));
    }
    let safe = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(invalid("package name is not a relative directory name"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::create_zip;
    use crate::http::MockHttpClient;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    struct TestDriver;

    impl RepositoryDriver for TestDriver {
        fn package_name(&self) -> &str {
            "acme/blog"
        }

        fn repository_name(&self) -> &str {
            "blog"
        }

        fn version_url(&self) -> String {
            "https://example.test/version".to_string()
        }

        fn parse_version(&self, response: &Value) -> Option<String> {
            response["tag_name"].as_str().map(str::to_string)
        }

        fn download_request(&self, version: &str) -> DownloadRequest {
            DownloadRequest::get(format!("https://example.test/{}.zip", version))
        }
    }

    /// Build a fixture archive from `files` (relative path, content)
    fn fixture(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let source = dir.join("fixture-src");
        for (path, content) in files {
            let target = source.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        let archive = dir.join("fixture.zip");
        create_zip(&source, &archive, &[]).unwrap();
        archive
    }

    fn serving(archive: PathBuf) -> MockHttpClient {
        let mut http = MockHttpClient::new();
        http.expect_fetch()
            .returning(|_| Ok(r#"{ "tag_name": "1.2.0" }"#.to_string()));
        http.expect_get().returning(move |_, options| {
            fs::copy(&archive, options.sink.as_ref().unwrap()).unwrap();
            Ok(())
        });
        http
    }

    fn repository(dir: &TempDir, http: MockHttpClient) -> Repository {
        Repository::new(
            Box::new(TestDriver),
            Arc::new(LocalStorage::new(dir.path().join("storage"))),
            Arc::new(http),
            dir.path().join("extensions"),
        )
    }

    #[test]
    fn test_package_file_name() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir, MockHttpClient::new());
        assert_eq!(repo.package_file_name("1.2.0"), "acme_blog-1.2.0.zip");
        assert!(repo
            .staging_path("1.2.0")
            .ends_with(Path::new("temp").join("blog-1.2.0")));
    }

    #[test]
    fn test_last_version_handles_bad_responses() {
        let dir = TempDir::new().unwrap();
        let mut http = MockHttpClient::new();
        http.expect_fetch().returning(|_| Ok("not json".to_string()));
        assert_eq!(repository(&dir, http).last_version(), None);

        let mut http = MockHttpClient::new();
        http.expect_fetch().returning(|_| Ok(r#"{ "tag_name": "" }"#.to_string()));
        assert_eq!(repository(&dir, http).last_version(), None);
    }

    #[test]
    fn test_install_latest_version() {
        let dir = TempDir::new().unwrap();
        let archive = fixture(
            dir.path(),
            &[
                ("blog-1.2.0/arikaim-package.json", r#"{ "name": "blog", "version": "1.2" }"#),
                ("blog-1.2.0/src/Blog.php", "<?php"),
            ],
        );
        let repo = repository(&dir, serving(archive));

        let installed = repo.try_install(None).unwrap();
        assert_eq!(installed, dir.path().join("extensions").join("blog"));
        assert!(installed.join("src/Blog.php").is_file());
        assert!(repo.archive_path("1.2.0").is_file());
    }

    #[test]
    fn test_missing_descriptor_stops_at_staged() {
        let dir = TempDir::new().unwrap();
        let archive = fixture(dir.path(), &[("readme.md", "no descriptor")]);
        let repo = repository(&dir, serving(archive));

        let failure = repo.try_install(Some("1.2.0")).unwrap_err();
        assert_eq!(failure.reached, RepositoryState::Staged);
        assert!(matches!(failure.error, PackageError::InvalidPackage { .. }));
        assert!(!dir.path().join("extensions").exists());
        assert!(repo.archive_path("1.2.0").is_file());
    }

    #[test]
    fn test_reinstall_replaces_previous_install() {
        let dir = TempDir::new().unwrap();
        let archive = fixture(dir.path(), &[("arikaim-package.json", r#"{ "name": "blog" }"#)]);
        let repo = repository(&dir, serving(archive));

        let dest = dir.path().join("extensions").join("blog");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.txt"), "old").unwrap();

        assert!(repo.install(Some("1.2.0")));
        assert!(dest.join("arikaim-package.json").is_file());
        assert!(!dest.join("old.txt").exists());
        assert!(!dir.path().join("extensions").join("blog.previous").exists());
    }

    #[test]
    fn test_failed_move_keeps_previous_install() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir, MockHttpClient::new());

        let dest = dir.path().join("extensions").join("blog");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.txt"), "old").unwrap();

        let missing = dir.path().join("storage").join("temp").join("gone");
        assert!(repo.place(&missing, &dest).is_err());
        assert_eq!(fs::read_to_string(dest.join("old.txt")).unwrap(), "old");
        assert!(!dir.path().join("extensions").join("blog.previous").exists());
    }

    #[test]
    fn test_unsafe_package_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = fixture(dir.path(), &[("arikaim-package.json", r#"{ "name": "../escape" }"#)]);
        let repo = repository(&dir, serving(archive));

        assert!(!repo.install(Some("1.0.0")));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_unknown_version_fails_before_download() {
        let dir = TempDir::new().unwrap();
        let mut http = MockHttpClient::new();
        http.expect_fetch().returning(|_| Ok("{}".to_string()));
        http.expect_get().never();
        let repo = repository(&dir, http);

        let failure = repo.try_install(None).unwrap_err();
        assert_eq!(failure.reached, RepositoryState::Unresolved);
        assert!(!repo.download(None));
    }

    #[test]
    fn test_download_replaces_stale_archive() {
        let dir = TempDir::new().unwrap();
        let archive = fixture(dir.path(), &[("arikaim-package.json", r#"{ "name": "blog" }"#)]);
        let repo = repository(&dir, serving(archive.clone()));

        let stale = repo.archive_path("1.2.0");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "stale").unwrap();

        assert!(repo.download(Some("1.2.0")));
        assert_eq!(fs::read(&stale).unwrap(), fs::read(&archive).unwrap());
    }

    #[test]
    fn test_request_error_without_archive_is_failure() {
        let dir = TempDir::new().unwrap();
        let mut http = MockHttpClient::new();
        http.expect_get().returning(|_, _| {
            Err(PackageError::NetworkError {
                message: "connection reset".to_string(),
            })
        });
        let repo = repository(&dir, http);
        assert!(!repo.download(Some("1.2.0")));
    }
}
