use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::{EXTRACT_REPORT_DATA, Task};
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::registries::PackageRegistry;
use crate::tools::grype::{SeverityCounts, Vulnerability};
use crate::tools::syft::{SbomSummary, summarize};

/// Everything the report renderer needs, pulled out of the context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub package_name: String,
    pub package_version: Option<String>,
    pub package_url: Option<String>,
    pub source_id: String,
    pub repository: RepositoryHealth,
    pub components: Option<SbomSummary>,
    pub vulnerabilities: Option<VulnerabilitySummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepositoryHealth {
    pub repository: Option<String>,
    pub license: Option<String>,
    pub total_releases: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilitySummary {
    pub total_matches: usize,
    pub unique_vulnerabilities: usize,
    pub by_severity: SeverityCounts,
    pub found: Vec<Vulnerability>,
}

/// Build [`ReportData`] from whatever earlier tasks managed to gather.
#[derive(Default)]
pub struct ExtractReportData {
    registries: HashMap<String, Arc<dyn PackageRegistry>>,
}

impl ExtractReportData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `registry` for package page links when auditing `source_id`.
    pub fn with_registry(
        mut self,
        source_id: impl Into<String>,
        registry: Arc<dyn PackageRegistry>,
    ) -> Self {
        self.registries.insert(source_id.into(), registry);
        self
    }

    pub fn extract(&self, ctx: &AuditContext) -> ReportData {
        let metadata = ctx.metadata.as_ref();

        let package_url = metadata
            .and_then(|m| m.homepage.clone())
            .or_else(|| {
                self.registries
                    .get(ctx.source_id())
                    .map(|r| r.package_page(ctx.package_name()))
            })
            .or_else(|| ctx.artifact.as_ref().map(|a| a.url.clone()));

        let repository = RepositoryHealth {
            repository: metadata.and_then(|m| m.repository.clone()),
            license: metadata.and_then(|m| m.license.clone()),
            total_releases: metadata.and_then(|m| m.release_count),
        };

        let declared = metadata.map_or(0, |m| m.dependencies.len());
        let components = ctx.sbom.as_ref().map(|s| summarize(&s.raw, declared));

        let vulnerabilities = ctx.vulnerabilities.as_ref().map(|report| {
            let found = report.vulnerabilities();
            VulnerabilitySummary {
                total_matches: report.total_matches,
                unique_vulnerabilities: report.unique_vulnerabilities,
                by_severity: found.iter().collect(),
                found,
            }
        });

        ReportData {
            package_name: ctx.package_name().to_string(),
            package_version: ctx.effective_version().map(str::to_string),
            package_url,
            source_id: ctx.source_id().to_string(),
            repository,
            components,
            vulnerabilities,
        }
    }
}

#[async_trait]
impl Task for ExtractReportData {
    fn name(&self) -> &'static str {
        EXTRACT_REPORT_DATA
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Extract Report Data".to_string()
    }

    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        ctx.log(format!("[{EXTRACT_REPORT_DATA}] Extracting report data..."));
        let data = self.extract(ctx);
        if data.components.is_none() {
            ctx.log(format!(
                "[{EXTRACT_REPORT_DATA}] WARNING: no SBOM available, component metrics omitted"
            ));
        }
        ctx.report_data = Some(data);
        ctx.record(EXTRACT_REPORT_DATA, Severity::Info, "Report data extracted");
        Ok(())
    }
}
