use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, instrument};

use super::report_data::{ExtractReportData, ReportData};
use super::{GENERATE_REPORT, Task, file_stem};
use crate::context::AuditContext;
use crate::error::TaskError;
use crate::finding::Severity;
use crate::result::compute_score;
use crate::settings::Settings;

const TITLE_RULE: &str = "========================================";
const RULE: &str = "----------------------------------------";
const DESCRIPTION_WIDTH: usize = 80;

/// Write the plain-text audit report into the artifacts directory.
pub struct GenerateReport {
    artifacts_dir: PathBuf,
}

impl GenerateReport {
    pub fn new(settings: &Settings) -> Self {
        Self {
            artifacts_dir: settings.artifacts_dir.clone(),
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let head: String = text.chars().take(width - 3).collect();
    format!("{head}...")
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

/// Render the report document for the current state of `ctx`.
pub fn write_report(ctx: &AuditContext, out: &mut dyn Write) -> io::Result<()> {
    let extracted;
    let data: &ReportData = match &ctx.report_data {
        Some(data) => data,
        None => {
            extracted = ExtractReportData::new().extract(ctx);
            &extracted
        }
    };

    writeln!(out, "pkgaudit - Audit Report")?;
    writeln!(out, "{TITLE_RULE}")?;
    writeln!(out)?;
    writeln!(out, "Package: {}", data.package_name)?;
    writeln!(out, "Source: {}", data.source_id)?;
    writeln!(out, "Version: {}", or_na(data.package_version.as_deref()))?;
    if let Some(summary) = ctx.metadata.as_ref().and_then(|m| m.summary.as_deref()) {
        writeln!(out, "Summary: {summary}")?;
    }
    writeln!(out, "URL: {}", or_na(data.package_url.as_deref()))?;
    writeln!(out)?;
    writeln!(out, "Risk Score: {}", compute_score(ctx))?;
    writeln!(out, "Findings: {}", ctx.findings().len())?;
    writeln!(out)?;

    writeln!(out, "Repository Health")?;
    writeln!(out, "{RULE}")?;
    let repo = &data.repository;
    writeln!(
        out,
        "Repository: {}",
        repo.repository.as_deref().unwrap_or("None found")
    )?;
    writeln!(
        out,
        "License: {}",
        repo.license.as_deref().unwrap_or("No license found")
    )?;
    match repo.total_releases {
        Some(n) => writeln!(out, "Total Releases: {n}")?,
        None => writeln!(out, "Total Releases: Unknown")?,
    }
    writeln!(out)?;

    if let Some(components) = &data.components {
        writeln!(out, "Components & Dependencies")?;
        writeln!(out, "{RULE}")?;
        writeln!(out, "Total Components: {}", components.total_components)?;
        writeln!(out, "Dependency Depth: {}", components.max_depth)?;
        writeln!(out, "Direct Dependencies: {}", components.direct_dependencies)?;
        writeln!(
            out,
            "Transitive Dependencies: {}",
            components.transitive_dependencies
        )?;
        writeln!(out)?;
    }

    if let Some(vulns) = &data.vulnerabilities {
        writeln!(out, "Vulnerabilities")?;
        writeln!(out, "{RULE}")?;
        writeln!(
            out,
            "Total Unique Vulnerabilities: {}",
            vulns.unique_vulnerabilities
        )?;
        if vulns.total_matches != vulns.unique_vulnerabilities {
            writeln!(
                out,
                "Total Matches: {} ({} duplicate(s))",
                vulns.total_matches,
                vulns.total_matches - vulns.unique_vulnerabilities
            )?;
        }
        writeln!(out)?;
        for severity in Severity::DESCENDING {
            let count = vulns.by_severity.get(severity);
            if count > 0 {
                writeln!(out, "  {severity}: {count}")?;
            }
        }

        if !vulns.found.is_empty() {
            writeln!(out)?;
            writeln!(out, "Vulnerability Details:")?;
            writeln!(out)?;
            for severity in Severity::DESCENDING {
                for vuln in vulns.found.iter().filter(|v| v.severity == severity) {
                    let label = severity.as_str().to_uppercase();
                    writeln!(out, "  [{label}] {vuln}")?;
                    if let Some(description) = &vuln.description {
                        writeln!(out, "    {}", truncate(description, DESCRIPTION_WIDTH))?;
                    }
                }
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "Findings")?;
    writeln!(out, "{RULE}")?;
    for finding in ctx.findings() {
        writeln!(out, "{finding}")?;
    }
    Ok(())
}

/// Render the report into a string.
pub fn render_report(ctx: &AuditContext) -> io::Result<String> {
    let mut buf = Vec::new();
    write_report(ctx, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl Task for GenerateReport {
    fn name(&self) -> &'static str {
        GENERATE_REPORT
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Generate Report".to_string()
    }

    #[instrument(skip(self, ctx), fields(task = GENERATE_REPORT, package = ctx.package_name()))]
    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        let path = self
            .artifacts_dir
            .join(format!("pkgaudit-{}-report.txt", file_stem(ctx.package_name())));
        let body = render_report(ctx).context("failed to render report")?;

        tokio::fs::create_dir_all(&self.artifacts_dir)
            .await
            .with_context(|| format!("failed to create {}", self.artifacts_dir.display()))?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;

        info!(path = %path.display(), "report written");
        ctx.log(format!("[{GENERATE_REPORT}] Report saved to: {}", path.display()));
        ctx.record(
            GENERATE_REPORT,
            Severity::Info,
            format!("Report written to {}", path.display()),
        );
        ctx.report_path = Some(path);
        Ok(())
    }
}
