use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::{Artifact, PackageMetadata, PackageRegistry, RegistryError, get_json, non_empty_str};

#[derive(Clone)]
pub struct CratesClient {
    client: reqwest::Client,
    api_url: String,
    download_url: String,
}

impl CratesClient {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            download_url: download_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PackageRegistry for CratesClient {
    fn label(&self) -> &'static str {
        "Crates.io"
    }

    #[instrument(skip(self))]
    async fn fetch_metadata(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageMetadata, RegistryError> {
        let url = format!("{}/api/v1/crates/{name}", self.api_url);
        let json = get_json(&self.client, &url, || {
            format!("Crate '{name}' not found on Crates.io")
        })
        .await?;
        parse_crate(&json, name, version)
    }

    async fn download_info(&self, name: &str, version: &str) -> Result<Artifact, RegistryError> {
        let filename = format!("{name}-{version}.crate");
        Ok(Artifact {
            url: format!("{}/crates/{name}/{filename}", self.download_url),
            filename,
            package_type: "crate".to_string(),
            local_path: None,
        })
    }

    fn package_page(&self, name: &str) -> String {
        format!("https://crates.io/crates/{name}")
    }
}

fn parse_crate(
    json: &Value,
    requested_name: &str,
    version: Option<&str>,
) -> Result<PackageMetadata, RegistryError> {
    let krate = &json["crate"];
    let versions = json["versions"].as_array().map(Vec::as_slice).unwrap_or_default();

    let target = match version {
        Some(v) => Some(v.to_string()),
        None => non_empty_str(&krate["max_stable_version"])
            .or_else(|| non_empty_str(&krate["newest_version"])),
    };

    let selected = target
        .as_deref()
        .and_then(|t| versions.iter().find(|v| v["num"] == t));

    if let (Some(requested), None) = (version, selected) {
        return Err(RegistryError::NotFound(format!(
            "Version '{requested}' not found for crate '{requested_name}'"
        )));
    }

    Ok(PackageMetadata {
        name: non_empty_str(&krate["name"]).unwrap_or_else(|| requested_name.to_string()),
        version: target,
        summary: non_empty_str(&krate["description"]),
        license: selected.and_then(|v| non_empty_str(&v["license"])),
        homepage: non_empty_str(&krate["homepage"]),
        repository: non_empty_str(&krate["repository"]),
        author: selected.and_then(|v| non_empty_str(&v["published_by"]["login"])),
        dependencies: vec![],
        release_count: Some(versions.len()).filter(|n| *n > 0),
    })
}
