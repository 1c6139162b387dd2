use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use super::Task;
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::registries::{PackageRegistry, RegistryError};

/// Fetch package metadata from a registry into `ctx.metadata`.
pub struct FetchMetadata {
    name: &'static str,
    registry: Arc<dyn PackageRegistry>,
}

impl FetchMetadata {
    pub fn new(name: &'static str, registry: Arc<dyn PackageRegistry>) -> Self {
        Self { name, registry }
    }
}

#[async_trait]
impl Task for FetchMetadata {
    fn name(&self) -> &'static str {
        self.name
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        format!("Query {}", self.registry.label())
    }

    #[instrument(skip(self, ctx), fields(task = self.name, package = ctx.package_name()))]
    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        let label = self.registry.label();
        let version_suffix = ctx
            .requested_version()
            .map(|v| format!("@{v}"))
            .unwrap_or_default();
        ctx.log(format!(
            "[{}] Fetching {}{version_suffix} from {label}",
            self.name,
            ctx.package_name()
        ));

        let result = self
            .registry
            .fetch_metadata(ctx.package_name(), ctx.requested_version())
            .await;

        match result {
            Ok(metadata) => {
                let version_info = metadata
                    .version
                    .as_deref()
                    .map(|v| format!(" version {v}"))
                    .unwrap_or_default();
                let message = format!(
                    "Successfully fetched metadata for {}{version_info}",
                    ctx.package_name()
                );
                ctx.log(format!("[{}] {message}", self.name));
                if let Some(summary) = &metadata.summary {
                    ctx.log(format!("[{}] Summary: {summary}", self.name));
                }
                ctx.metadata = Some(metadata);
                ctx.record(self.name, Severity::Info, message);
                Ok(())
            }
            Err(RegistryError::NotFound(message)) => {
                ctx.log(format!("[{}] ERROR: {message}", self.name));
                ctx.record(self.name, Severity::Critical, &message);
                Err(TaskError::fatal(format!(
                    "package '{}' not found on {label}",
                    ctx.package_name()
                )))
            }
            Err(e) => {
                warn!(task = self.name, error = %e, "metadata fetch failed");
                ctx.log(format!("[{}] ERROR: {e}", self.name));
                ctx.record(self.name, Severity::Medium, format!("{label} error: {e}"));
                Ok(())
            }
        }
    }
}
