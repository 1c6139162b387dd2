use super::Analyzer;
use crate::context::AuditContext;
use crate::finding::{Finding, Severity};

/// Checks that registry metadata names a license and a source repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataAnalyzer;

impl Analyzer for MetadataAnalyzer {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn analyze(&self, ctx: &AuditContext) -> Vec<Finding> {
        let Some(metadata) = &ctx.metadata else {
            return vec![Finding::new(
                self.name(),
                Severity::Info,
                "Package metadata is missing",
            )];
        };

        let mut findings = Vec::new();
        if metadata.license.is_none() {
            findings.push(Finding::new(
                self.name(),
                Severity::Low,
                format!("{} declares no license", metadata.name),
            ));
        }
        if metadata.repository.is_none() {
            findings.push(Finding::new(
                self.name(),
                Severity::Low,
                format!("{} lists no source repository", metadata.name),
            ));
        }
        if findings.is_empty() {
            findings.push(Finding::new(
                self.name(),
                Severity::Info,
                format!(
                    "Metadata for {} version {} looks complete",
                    metadata.name,
                    metadata.version.as_deref().unwrap_or("unknown")
                ),
            ));
        }
        findings
    }
}
