use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::{Artifact, PackageMetadata, PackageRegistry, RegistryError, get_json, non_empty_str};

#[derive(Clone)]
pub struct NpmClient {
    client: reqwest::Client,
    base_url: String,
}

impl NpmClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn document_url(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(v) => format!("{}/{name}/{v}", self.base_url),
            None => format!("{}/{name}", self.base_url),
        }
    }
}

#[async_trait]
impl PackageRegistry for NpmClient {
    fn label(&self) -> &'static str {
        "NPM"
    }

    #[instrument(skip(self))]
    async fn fetch_metadata(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageMetadata, RegistryError> {
        let url = self.document_url(name, version);
        let json = get_json(&self.client, &url, || not_found_message(name, version)).await?;

        match version {
            Some(_) => Ok(parse_version_document(&json, name, None)),
            None => {
                // Packument: pick the latest dist-tag and read its version document.
                let latest = json["dist-tags"]["latest"].as_str().ok_or_else(|| {
                    RegistryError::Api(format!("NPM package '{name}' has no latest dist-tag"))
                })?;
                let release_count = json["versions"].as_object().map(|v| v.len());
                let mut meta = parse_version_document(&json["versions"][latest], name, release_count);
                meta.version.get_or_insert_with(|| latest.to_string());
                Ok(meta)
            }
        }
    }

    #[instrument(skip(self))]
    async fn download_info(&self, name: &str, version: &str) -> Result<Artifact, RegistryError> {
        let url = self.document_url(name, Some(version));
        let json = get_json(&self.client, &url, || not_found_message(name, Some(version))).await?;

        let tarball = non_empty_str(&json["dist"]["tarball"]).ok_or_else(|| {
            RegistryError::NotFound(format!("no tarball published for {name}@{version}"))
        })?;
        let filename = tarball
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{version}.tgz", name.replace('/', "-")));

        Ok(Artifact {
            url: tarball,
            filename,
            package_type: "tarball".to_string(),
            local_path: None,
        })
    }

    fn package_page(&self, name: &str) -> String {
        format!("https://www.npmjs.com/package/{name}")
    }
}

fn not_found_message(name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("Version '{v}' not found for package '{name}'"),
        None => format!("Package '{name}' not found on NPM"),
    }
}

/// Fields that may be a plain string or an object carrying the value under `key`.
fn string_or_field(value: &Value, key: &str) -> Option<String> {
    non_empty_str(value).or_else(|| non_empty_str(&value[key]))
}

fn parse_version_document(doc: &Value, requested_name: &str, release_count: Option<usize>) -> PackageMetadata {
    let repository = string_or_field(&doc["repository"], "url").map(|url| {
        url.trim_start_matches("git+")
            .trim_end_matches(".git")
            .to_string()
    });

    let dependencies = doc["dependencies"]
        .as_object()
        .map(|deps| {
            deps.iter()
                .map(|(name, range)| match range.as_str() {
                    Some(r) => format!("{name}@{r}"),
                    None => name.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    PackageMetadata {
        name: non_empty_str(&doc["name"]).unwrap_or_else(|| requested_name.to_string()),
        version: non_empty_str(&doc["version"]),
        summary: non_empty_str(&doc["description"]),
        license: string_or_field(&doc["license"], "type"),
        homepage: non_empty_str(&doc["homepage"]),
        repository,
        author: string_or_field(&doc["author"], "name"),
        dependencies,
        release_count,
    }
}
