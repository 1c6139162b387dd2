use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::{Artifact, PackageMetadata, PackageRegistry, RegistryError, get_json, non_empty_str};

const REPOSITORY_KEYS: [&str; 4] = ["repository", "source", "source code", "code"];

#[derive(Clone)]
pub struct PypiClient {
    client: reqwest::Client,
    base_url: String,
}

impl PypiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn json_url(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(v) => format!("{}/pypi/{name}/{v}/json", self.base_url),
            None => format!("{}/pypi/{name}/json", self.base_url),
        }
    }
}

#[async_trait]
impl PackageRegistry for PypiClient {
    fn label(&self) -> &'static str {
        "PyPI"
    }

    #[instrument(skip(self))]
    async fn fetch_metadata(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageMetadata, RegistryError> {
        let url = self.json_url(name, version);
        let json = get_json(&self.client, &url, || not_found_message(name, version)).await?;
        Ok(parse_metadata(&json, name))
    }

    #[instrument(skip(self))]
    async fn download_info(&self, name: &str, version: &str) -> Result<Artifact, RegistryError> {
        let url = self.json_url(name, Some(version));
        let json = get_json(&self.client, &url, || not_found_message(name, Some(version))).await?;
        select_distribution(&json, version).ok_or_else(|| {
            RegistryError::NotFound(format!(
                "no distribution files published for {name}=={version}"
            ))
        })
    }

    fn package_page(&self, name: &str) -> String {
        format!("https://pypi.org/project/{name}/")
    }
}

fn not_found_message(name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("Version '{v}' not found for package '{name}'"),
        None => format!("Package '{name}' not found on PyPI"),
    }
}

fn parse_metadata(json: &Value, requested_name: &str) -> PackageMetadata {
    let info = &json["info"];
    let project_urls = info["project_urls"].as_object();

    let repository = project_urls.and_then(|urls| {
        urls.iter()
            .find(|(key, _)| REPOSITORY_KEYS.contains(&key.to_ascii_lowercase().as_str()))
            .and_then(|(_, url)| non_empty_str(url))
    });

    let homepage = non_empty_str(&info["home_page"]).or_else(|| {
        project_urls.and_then(|urls| {
            urls.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("homepage"))
                .and_then(|(_, url)| non_empty_str(url))
        })
    });

    let author = non_empty_str(&info["author"]).map(|author| match non_empty_str(&info["author_email"]) {
        Some(email) => format!("{author} ({email})"),
        None => author,
    });

    let dependencies = info["requires_dist"]
        .as_array()
        .map(|deps| deps.iter().filter_map(non_empty_str).collect())
        .unwrap_or_default();

    PackageMetadata {
        name: non_empty_str(&info["name"]).unwrap_or_else(|| requested_name.to_string()),
        version: non_empty_str(&info["version"]),
        summary: non_empty_str(&info["summary"]),
        license: non_empty_str(&info["license"]),
        homepage,
        repository,
        author,
        dependencies,
        release_count: json["releases"].as_object().map(|r| r.len()),
    }
}

/// Pick the artifact to audit, preferring a wheel over a source distribution.
fn select_distribution(json: &Value, version: &str) -> Option<Artifact> {
    let files = json["urls"]
        .as_array()
        .filter(|files| !files.is_empty())
        .or_else(|| json["releases"][version].as_array())?;

    let selected = files
        .iter()
        .find(|f| f["packagetype"] == "bdist_wheel")
        .or_else(|| files.first())?;

    Some(Artifact {
        url: non_empty_str(&selected["url"])?,
        filename: non_empty_str(&selected["filename"])?,
        package_type: non_empty_str(&selected["packagetype"]).unwrap_or_default(),
        local_path: None,
    })
}
