//! HTTP client used by repository drivers

use crate::{PackageError, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Options for a single request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Stream the response body into this file instead of returning it
    pub sink: Option<PathBuf>,

    /// Url-encoded form parameters
    pub form_params: Vec<(String, String)>,
}

impl RequestOptions {
    /// Stream the response into `path`
    pub fn sink(path: PathBuf) -> Self {
        Self {
            sink: Some(path),
            ..Default::default()
        }
    }

    /// Add a form parameter
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.form_params.push((key.to_string(), value.to_string()));
        self
    }
}

/// HTTP client collaborator
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// GET request
    fn get(&self, url: &str, options: &RequestOptions) -> Result<()>;

    /// PUT request
    fn put(&self, url: &str, options: &RequestOptions) -> Result<()>;

    /// GET request returning the body as text
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Blocking `reqwest` implementation
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Create a client with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("arikaim-packages/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, options: &RequestOptions) -> Result<()> {
        let request = if options.form_params.is_empty() {
            request
        } else {
            request.form(&options.form_params)
        };

        let mut response = request.send()?;
        if !response.status().is_success() {
            return Err(PackageError::NetworkError {
                message: format!("{} returned {}", response.url(), response.status()),
            });
        }

        if let Some(sink) = &options.sink {
            debug!("Streaming {} into {}", response.url(), sink.display());
            let mut file = fs::File::create(sink)?;
            std::io::copy(&mut response, &mut file)?;
        }

        Ok(())
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, options: &RequestOptions) -> Result<()> {
        self.send(self.client.get(url), options)
    }

    fn put(&self, url: &str, options: &RequestOptions) -> Result<()> {
        self.send(self.client.put(url), options)
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(PackageError::NetworkError {
                message: format!("{} returned {}", url, response.status()),
            });
        }
        Ok(response.text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options() {
        let options = RequestOptions::sink(PathBuf::from("/tmp/a.zip"))
            .with_param("repository", "blog")
            .with_param("license_key", "key");

        assert_eq!(options.sink, Some(PathBuf::from("/tmp/a.zip")));
        assert_eq!(options.form_params.len(), 2);
        assert_eq!(options.form_params[0], ("repository".to_string(), "blog".to_string()));
    }

    #[test]
    fn test_client_builds() {
        assert!(ReqwestClient::new(Duration::from_secs(5)).is_ok());
    }
}
