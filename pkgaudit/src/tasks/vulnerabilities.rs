use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{instrument, warn};

use super::{SCAN_VULNERABILITIES, Task};
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::tools::grype::{SeverityCounts, VulnerabilityReport};
use crate::tools::syft::ComponentIndex;
use crate::tools::{ToolError, VulnerabilityScanner};

/// Scan the saved SBOM and record one finding per unique vulnerability.
pub struct ScanVulnerabilities {
    scanner: Arc<dyn VulnerabilityScanner>,
}

impl ScanVulnerabilities {
    pub fn new(scanner: Arc<dyn VulnerabilityScanner>) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl Task for ScanVulnerabilities {
    fn name(&self) -> &'static str {
        SCAN_VULNERABILITIES
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Scan for Vulnerabilities".to_string()
    }

    #[instrument(skip(self, ctx), fields(task = SCAN_VULNERABILITIES, package = ctx.package_name()))]
    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        let Some(sbom_path) = ctx.sbom.as_ref().and_then(|s| s.path.clone()) else {
            return Err(TaskError::fatal(
                "Cannot scan vulnerabilities: SBOM not generated",
            ));
        };

        ctx.log(format!("[{SCAN_VULNERABILITIES}] Scanning SBOM for vulnerabilities..."));
        let raw = match self.scanner.scan(&sbom_path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "vulnerability scan failed");
                let (severity, message) = match &e {
                    ToolError::NotFound { .. } => {
                        (Severity::Critical, format!("Grype not available: {e}"))
                    }
                    _ => (Severity::Medium, format!("Vulnerability scan failed: {e}")),
                };
                ctx.log(format!("[{SCAN_VULNERABILITIES}] WARNING: {message}"));
                ctx.record(SCAN_VULNERABILITIES, severity, message);
                ctx.vulnerabilities = Some(VulnerabilityReport::new(json!({ "matches": [] })));
                return Ok(());
            }
        };

        let report = VulnerabilityReport::new(raw);
        let vulnerabilities = report.vulnerabilities();
        ctx.log(format!(
            "[{SCAN_VULNERABILITIES}] Found {} vulnerability match(es), {} unique vulnerability(ies)",
            report.total_matches, report.unique_vulnerabilities
        ));

        let index = ctx
            .sbom
            .as_ref()
            .map(|s| ComponentIndex::from_sbom(&s.raw))
            .unwrap_or_default();
        for vuln in &vulnerabilities {
            let mut message = vuln.to_string();
            if let Some(bom_ref) = index.lookup(vuln.purl.as_deref(), &vuln.package, &vuln.version) {
                message.push_str(&format!(" [SBOM: {bom_ref}]"));
            }
            if let Some(description) = &vuln.description {
                message.push_str(&format!(" - {description}"));
            }
            ctx.record(SCAN_VULNERABILITIES, vuln.severity, message);
        }

        let counts: SeverityCounts = vulnerabilities.iter().collect();
        for severity in Severity::DESCENDING {
            let count = counts.get(severity);
            if count > 0 {
                ctx.log(format!("[{SCAN_VULNERABILITIES}] {severity}: {count}"));
            }
        }

        let summary = match vulnerabilities.len() {
            0 => "No vulnerabilities found in SBOM".to_string(),
            n => format!("Found {n} unique vulnerability(ies) in SBOM"),
        };
        ctx.record(SCAN_VULNERABILITIES, Severity::Info, summary);
        ctx.vulnerabilities = Some(report);
        Ok(())
    }
}
