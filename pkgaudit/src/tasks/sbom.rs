use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

use super::{GENERATE_SBOM, Task, file_stem};
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::settings::Settings;
use crate::tools::SbomGenerator;
use crate::tools::syft::{Sbom, summarize};

/// Run the SBOM generator over the downloaded artifact.
pub struct GenerateSbom {
    generator: Arc<dyn SbomGenerator>,
    artifacts_dir: PathBuf,
}

impl GenerateSbom {
    pub fn new(generator: Arc<dyn SbomGenerator>, settings: &Settings) -> Self {
        Self {
            generator,
            artifacts_dir: settings.artifacts_dir.clone(),
        }
    }

    fn output_path(&self, ctx: &AuditContext) -> PathBuf {
        let version = ctx
            .metadata
            .as_ref()
            .and_then(|m| m.version.as_deref())
            .map(|v| format!("-{v}"))
            .unwrap_or_default();
        let stem = file_stem(&format!("{}{version}", ctx.package_name()));
        self.artifacts_dir.join(format!("pkgaudit-{stem}-sbom.json"))
    }
}

async fn save(sbom: &Value, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(sbom)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

#[async_trait]
impl Task for GenerateSbom {
    fn name(&self) -> &'static str {
        GENERATE_SBOM
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Generate SBOM".to_string()
    }

    #[instrument(skip(self, ctx), fields(task = GENERATE_SBOM, package = ctx.package_name()))]
    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        let Some((target, filename)) = ctx
            .artifact
            .as_ref()
            .and_then(|a| Some((a.local_path.clone()?, a.filename.clone())))
        else {
            return Err(TaskError::fatal(
                "Cannot generate SBOM: package artifact not downloaded",
            ));
        };

        ctx.log(format!("[{GENERATE_SBOM}] Generating SBOM for {filename}"));
        let raw = match self.generator.generate(&target).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = format!("SBOM generation failed: {e}");
                ctx.log(format!("[{GENERATE_SBOM}] ERROR: {e}"));
                ctx.record(GENERATE_SBOM, Severity::Critical, &message);
                return Err(TaskError::Fatal(message));
            }
        };

        let path = self.output_path(ctx);
        let saved = match save(&raw, &path).await {
            Ok(()) => {
                ctx.log(format!("[{GENERATE_SBOM}] SBOM saved to: {}", path.display()));
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "failed to save SBOM");
                ctx.log(format!("[{GENERATE_SBOM}] WARNING: Failed to save SBOM file: {e:#}"));
                None
            }
        };

        let declared = ctx.metadata.as_ref().map_or(0, |m| m.dependencies.len());
        let summary = summarize(&raw, declared);
        if summary.total_components == 0 {
            let message = "SBOM is empty (0 components found). Vulnerability scanning will have no components to analyze.";
            ctx.log(format!("[{GENERATE_SBOM}] WARNING: {message}"));
            ctx.record(GENERATE_SBOM, Severity::Medium, message);
        }
        ctx.log(format!(
            "[{GENERATE_SBOM}] Total Components: {}",
            summary.total_components
        ));
        ctx.log(format!(
            "[{GENERATE_SBOM}] Dependency Depth: {} level(s)",
            summary.max_depth
        ));
        ctx.log(format!(
            "[{GENERATE_SBOM}] Direct Dependencies: {}, Transitive Dependencies: {}",
            summary.direct_dependencies, summary.transitive_dependencies
        ));
        if let Some(spec_version) = raw["specVersion"].as_str() {
            ctx.log(format!("[{GENERATE_SBOM}] SBOM Schema Version: {spec_version}"));
        }

        ctx.sbom = Some(Sbom { raw, path: saved });
        ctx.record(GENERATE_SBOM, Severity::Info, "SBOM generated successfully");
        Ok(())
    }
}
