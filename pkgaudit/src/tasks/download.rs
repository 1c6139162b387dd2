use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::Task;
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::registries::{PackageRegistry, download_to_file};
use crate::settings::Settings;

/// Resolve and download the distribution artifact for the fetched version.
pub struct DownloadArtifact {
    name: &'static str,
    registry: Arc<dyn PackageRegistry>,
    client: reqwest::Client,
    downloads_dir: PathBuf,
    timeout: Duration,
}

impl DownloadArtifact {
    pub fn new(
        name: &'static str,
        registry: Arc<dyn PackageRegistry>,
        client: reqwest::Client,
        settings: &Settings,
    ) -> Self {
        Self {
            name,
            registry,
            client,
            downloads_dir: settings.downloads_dir(),
            timeout: settings.download_timeout,
        }
    }
}

/// Last component of a registry-supplied filename, if it names a file.
fn local_filename(filename: &str) -> Option<&str> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl Task for DownloadArtifact {
    fn name(&self) -> &'static str {
        self.name
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Download Package".to_string()
    }

    #[instrument(skip(self, ctx), fields(task = self.name, package = ctx.package_name()))]
    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        let Some(metadata) = &ctx.metadata else {
            return Err(TaskError::fatal(
                "Cannot download package: metadata not available",
            ));
        };
        let Some(version) = metadata.version.clone() else {
            return Err(TaskError::fatal(
                "Cannot download package: version is not specified",
            ));
        };
        let name = ctx.package_name().to_string();

        ctx.log(format!(
            "[{}] Resolving download URL from {}...",
            self.name,
            self.registry.label()
        ));
        let mut artifact = self
            .registry
            .download_info(&name, &version)
            .await
            .map_err(|e| TaskError::fatal(format!("{} error: {e}", self.registry.label())))?;

        let Some(filename) = local_filename(&artifact.filename).map(str::to_string) else {
            return Err(TaskError::fatal(format!(
                "{} returned an unusable artifact filename '{}'",
                self.registry.label(),
                artifact.filename
            )));
        };
        if filename != artifact.filename {
            warn!(task = self.name, original = %artifact.filename, %filename, "artifact filename reduced");
            artifact.filename = filename;
        }

        let dest = self.downloads_dir.join(&artifact.filename);
        ctx.log(format!("[{}] Downloading {}", self.name, artifact.url));
        let bytes = download_to_file(&self.client, &artifact.url, &dest, self.timeout)
            .await
            .with_context(|| format!("failed to download {}", artifact.filename))?;
        debug!(bytes, path = %dest.display(), "artifact downloaded");

        ctx.log(format!(
            "[{}] Saved {} ({bytes} bytes)",
            self.name,
            dest.display()
        ));
        ctx.record(
            self.name,
            Severity::Info,
            format!("Downloaded package artifact: {}", artifact.filename),
        );
        artifact.local_path = Some(dest);
        ctx.artifact = Some(artifact);
        Ok(())
    }
}
