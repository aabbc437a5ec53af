//! Arikaim package lifecycle engine
//!
//! This crate manages the packages of an Arikaim application, including:
//! - Package descriptors (arikaim-package.json) and version normalization
//! - Per type package managers: discovery, cached scans, install ordering, backups
//! - Install / uninstall / enable / disable through per type behaviors and a registry
//! - Advisory validation of declared requirements
//! - Remote repositories (package store, GitHub) with download, extraction and install

pub mod archive;
pub mod behavior;
pub mod cache;
pub mod composer;
pub mod config;
pub mod descriptor;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod http;
pub mod manager;
pub mod package;
pub mod package_type;
pub mod registry;
pub mod repository;
pub mod storage;
pub mod validator;
pub mod version;

pub use behavior::{NoHooks, PackageBehavior, PackageHooks};
pub use cache::{Cache, FileCache, MemoryCache};
pub use composer::{Composer, ComposerCommands, ProcessComposer};
pub use config::{PackagesConfig, StoreConfig};
pub use descriptor::{PackageProperties, Requirements, DESCRIPTOR_FILE};
pub use drivers::{GitHubDriver, StoreDriver};
pub use error::{PackageError, Result};
pub use factory::{PackageLocator, PackageManagerFactory, PackageTypeBinding};
pub use http::{HttpClient, ReqwestClient, RequestOptions};
pub use manager::{Collaborators, PackageManager, PropertyFilter};
pub use package::Package;
pub use package_type::PackageType;
pub use registry::{JsonRegistry, PackageRegistry, PackageStatus, RegistryEntry};
pub use repository::{InstallFailure, Repository, RepositoryDriver, RepositoryState};
pub use storage::{LocalStorage, Storage};
pub use validator::{DependencyCheck, DependencyToken, PackageValidator, ValidationReport};
