pub mod analyses;
pub mod download;
pub mod fetch;
pub mod report;
pub mod report_data;
pub mod sbom;
pub mod vulnerabilities;

use std::sync::Arc;

use async_trait::async_trait;

use crate::analyzers::AnalyzerSet;
use crate::context::AuditContext;
use crate::error::{ConfigError, TaskError};
use crate::registries::{CratesClient, NpmClient, PackageRegistry, PypiClient};
use crate::registry::TaskRegistry;
use crate::settings::Settings;
use crate::tools::{Grype, Syft};

/// A named unit of pipeline work.
#[async_trait]
pub trait Task: Send + Sync {
    /// Registry key and chain token. Must be unique.
    fn name(&self) -> &'static str;

    /// Short human-readable status for progress displays.
    fn describe_status(&self, ctx: &AuditContext) -> String;

    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError>;
}

pub use analyses::RunAnalyses;
pub use download::DownloadArtifact;
pub use fetch::FetchMetadata;
pub use report::GenerateReport;
pub use report_data::ExtractReportData;
pub use sbom::GenerateSbom;
pub use vulnerabilities::ScanVulnerabilities;

pub const FETCH_PYPI: &str = "fetch_pypi";
pub const FETCH_NPM: &str = "fetch_npm";
pub const FETCH_RUST: &str = "fetch_rust";
pub const DOWNLOAD_PYPI: &str = "download_pypi";
pub const DOWNLOAD_NPM: &str = "download_npm";
pub const DOWNLOAD_RUST: &str = "download_rust";
pub const GENERATE_SBOM: &str = "generate_sbom";
pub const SCAN_VULNERABILITIES: &str = "scan_vulnerabilities";
pub const RUN_ANALYSES: &str = "run_analyses";
pub const EXTRACT_REPORT_DATA: &str = "extract_report_data";
pub const GENERATE_REPORT: &str = "generate_report";

/// Package name reduced to something usable inside a single file name.
///
/// Scoped npm names such as `@types/node` become `@types-node`.
pub(crate) fn file_stem(package_name: &str) -> String {
    package_name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c => c,
        })
        .collect()
}

/// Register every built-in task exactly once.
pub fn register_all(
    registry: &mut TaskRegistry,
    settings: &Settings,
    client: &reqwest::Client,
) -> Result<(), ConfigError> {
    let pypi: Arc<dyn PackageRegistry> =
        Arc::new(PypiClient::new(client.clone(), &settings.pypi_url));
    let npm: Arc<dyn PackageRegistry> = Arc::new(NpmClient::new(client.clone(), &settings.npm_url));
    let crates: Arc<dyn PackageRegistry> = Arc::new(CratesClient::new(
        client.clone(),
        &settings.crates_url,
        &settings.crates_download_url,
    ));

    let mut report_data = ExtractReportData::new();
    for (source_id, fetch, download, source) in [
        ("pypi", FETCH_PYPI, DOWNLOAD_PYPI, pypi),
        ("npm", FETCH_NPM, DOWNLOAD_NPM, npm),
        ("rust", FETCH_RUST, DOWNLOAD_RUST, crates),
    ] {
        registry.register(FetchMetadata::new(fetch, source.clone()))?;
        registry.register(DownloadArtifact::new(
            download,
            source.clone(),
            client.clone(),
            settings,
        ))?;
        report_data = report_data.with_registry(source_id, source);
    }

    let syft = Syft::new(&settings.syft_path, settings.tool_timeout);
    let grype = Grype::new(&settings.grype_path, settings.tool_timeout);
    registry.register(GenerateSbom::new(Arc::new(syft), settings))?;
    registry.register(ScanVulnerabilities::new(Arc::new(grype)))?;
    registry.register(RunAnalyses::new(AnalyzerSet::builtin()))?;
    registry.register(report_data)?;
    registry.register(GenerateReport::new(settings))?;
    Ok(())
}
