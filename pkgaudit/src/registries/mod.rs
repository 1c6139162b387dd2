use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::settings::Settings;

pub mod crates;
pub mod npm;
pub mod pypi;

pub use crates::CratesClient;
pub use npm::NpmClient;
pub use pypi::PypiClient;

/// Package metadata as reported by a registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub release_count: Option<usize>,
}

/// A downloadable distribution of a package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub url: String,
    pub filename: String,
    pub package_type: String,
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    NotFound(String),
    #[error("unable to reach registry: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Api(String),
}

/// A package registry the fetch and download tasks can talk to.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Human-readable registry name, e.g. "PyPI".
    fn label(&self) -> &'static str;

    async fn fetch_metadata(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageMetadata, RegistryError>;

    async fn download_info(&self, name: &str, version: &str) -> Result<Artifact, RegistryError>;

    /// Public landing page for a package, used when metadata has no homepage.
    fn package_page(&self, name: &str) -> String;
}

/// Build the HTTP client shared by all registry clients.
pub fn http_client(settings: &Settings) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("pkgaudit/", env!("CARGO_PKG_VERSION")))
        .timeout(settings.http_timeout)
        .build()
        .context("failed to build HTTP client")
}

pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    not_found: impl FnOnce() -> String,
) -> Result<Value, RegistryError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(not_found()));
    }
    if !status.is_success() {
        return Err(RegistryError::Api(format!("{url} returned HTTP {status}")));
    }

    response
        .json()
        .await
        .map_err(|e| RegistryError::Api(format!("invalid JSON from {url}: {e}")))
}

pub(crate) fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Stream an artifact into `dest`, returning the number of bytes written.
#[instrument(skip(client))]
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> anyhow::Result<u64> {
    let mut response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        bail!("artifact not found at {url}");
    }
    if !status.is_success() {
        bail!("{url} returned HTTP {status}");
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("failed to read body from {url}"))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(url, bytes = written, path = %dest.display(), "artifact downloaded");
    Ok(written)
}
