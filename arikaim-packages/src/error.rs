//! Package lifecycle error types

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackageError>;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Package not found: {name} ({package_type})")]
    PackageNotFound { name: String, package_type: String },

    #[error("Invalid package descriptor at {path}: {message}")]
    InvalidDescriptor { path: PathBuf, message: String },

    #[error("Not a valid package at {path}: {message}")]
    InvalidPackage { path: PathBuf, message: String },

    #[error("Invalid version string: {version}")]
    InvalidVersion { version: String },

    #[error("Unknown package type: {name}")]
    UnknownPackageType { name: String },

    #[error("No package registry configured for {package_type} packages")]
    RegistryUnavailable { package_type: String },

    #[error("Unable to resolve a version for {package}")]
    VersionUnavailable { package: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Installation failed for {package}: {message}")]
    InstallationFailed { package: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
