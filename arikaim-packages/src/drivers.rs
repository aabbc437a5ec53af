//! Repository drivers for the package store and GitHub

use crate::repository::{DownloadRequest, RepositoryDriver};
use crate::{PackageError, PackageType, Result};
use reqwest::Url;
use serde_json::Value;

/// Driver for the self-hosted package store
///
/// Store packages are private: downloads carry the license key.
#[derive(Debug, Clone)]
pub struct StoreDriver {
    host: String,
    name: String,
    package_type: PackageType,
    access_key: Option<String>,
}

impl StoreDriver {
    pub fn new(host: &str, name: &str, package_type: PackageType, access_key: Option<String>) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            name: name.to_string(),
            package_type,
            access_key,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/repository/package/{}/{}/{}", self.host, path, self.name, self.package_type)
    }
}

impl RepositoryDriver for StoreDriver {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn repository_name(&self) -> &str {
        &self.name
    }

    fn is_private(&self) -> bool {
        true
    }

    fn version_url(&self) -> String {
        self.api_url("version")
    }

    fn parse_version(&self, response: &Value) -> Option<String> {
        response
            .pointer("/result/version")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn download_request(&self, _version: &str) -> DownloadRequest {
        DownloadRequest::put(
            self.api_url("download"),
            vec![
                ("repository".to_string(), self.name.clone()),
                (
                    "license_key".to_string(),
                    self.access_key.clone().unwrap_or_default(),
                ),
            ],
        )
    }
}

/// Driver for public GitHub repositories, identified by their URL
#[derive(Debug, Clone)]
pub struct GitHubDriver {
    url: String,
    package_name: String,
    repository_name: String,
}

impl GitHubDriver {
    /// Resolve `owner/repo` from a repository URL (`https://github.com/owner/repo.git`)
    pub fn from_url(url: &str) -> Result<Self> {
        let invalid = || PackageError::InvalidPackage {
            path: url.into(),
            message: "expected a repository URL of the form host/owner/repo".to_string(),
        };

        let parsed = Url::parse(url).map_err(|_| invalid())?;
        let path = parsed.path().trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        let (owner, repo) = match (segments.next(), segments.next()) {
            (Some(owner), Some(repo)) => (owner, repo),
            _ => return Err(invalid()),
        };

        Ok(Self {
            url: url.to_string(),
            package_name: format!("{}/{}", owner, repo),
            repository_name: repo.to_string(),
        })
    }
}

impl RepositoryDriver for GitHubDriver {
    fn package_name(&self) -> &str {
        &self.package_name
    }

    fn repository_name(&self) -> &str {
        &self.repository_name
    }

    fn repository_url(&self) -> Option<&str> {
        Some(&self.url)
    }

    fn version_url(&self) -> String {
        format!("https://api.github.com/repos/{}/releases/latest", self.package_name)
    }

    fn parse_version(&self, response: &Value) -> Option<String> {
        response.get("tag_name").and_then(Value::as_str).map(str::to_string)
    }

    fn download_request(&self, version: &str) -> DownloadRequest {
        DownloadRequest::get(format!(
            "https://github.com/{}/archive/{}.zip",
            self.package_name, version
        ))
    }
}
