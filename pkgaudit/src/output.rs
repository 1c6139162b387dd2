use crate::finding::Severity;
use crate::result::AuditResult;
use crate::tools::grype::SeverityCounts;

pub trait OutputFormatter {
    fn write_result(
        &self,
        result: &AuditResult,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()>;
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_result(
        &self,
        result: &AuditResult,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        let ctx = result.context();
        writeln!(writer, "{} ({})", ctx.package_name(), ctx.source_id())?;
        writeln!(
            writer,
            "  version: {}",
            ctx.effective_version().unwrap_or("unknown")
        )?;
        writeln!(writer, "  score: {}", result.score())?;

        if let Some(report) = &ctx.vulnerabilities {
            let counts: SeverityCounts = report.vulnerabilities().iter().collect();
            let parts: Vec<String> = Severity::DESCENDING
                .iter()
                .filter(|s| counts.get(**s) > 0)
                .map(|s| format!("{} {s}", counts.get(*s)))
                .collect();
            if parts.is_empty() {
                writeln!(writer, "  vulnerabilities: none")?;
            } else {
                writeln!(writer, "  vulnerabilities: {}", parts.join(", "))?;
            }
        }

        if ctx.findings().is_empty() {
            writeln!(writer, "  findings: none")?;
        } else {
            writeln!(writer, "  findings:")?;
            for finding in ctx.findings() {
                writeln!(writer, "    {finding}")?;
            }
        }

        if let Some(path) = result.report_path() {
            writeln!(writer, "  report: {}", path.display())?;
        }
        if let Some(abort) = result.abort() {
            writeln!(writer, "  aborted at {}: {}", abort.task, abort.message)?;
        }
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_result(
        &self,
        result: &AuditResult,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, result)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuditContext;
    use crate::registries::PackageMetadata;
    use crate::result::Abort;
    use crate::tools::grype::VulnerabilityReport;
    use serde_json::json;

    fn render(fmt: &dyn OutputFormatter, result: &AuditResult) -> String {
        let mut buf = Vec::new();
        fmt.write_result(result, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample_ctx() -> AuditContext {
        let mut ctx = AuditContext::new("requests", None, "pypi");
        ctx.metadata = Some(PackageMetadata {
            name: "requests".into(),
            version: Some("2.31.0".into()),
            ..Default::default()
        });
        ctx.record("fetch_pypi", Severity::Info, "Successfully fetched metadata");
        ctx
    }

    #[test]
    fn text_output_basic() {
        let result = AuditResult::assemble(sample_ctx(), None);
        let output = render(&TextOutput, &result);
        assert!(output.starts_with("requests (pypi)\n"));
        assert!(output.contains("  version: 2.31.0\n"));
        assert!(output.contains("  score: 0\n"));
        assert!(output.contains("    [INFO] fetch_pypi: Successfully fetched metadata\n"));
        assert!(!output.contains("aborted"));
        assert!(!output.contains("vulnerabilities"));
    }

    #[test]
    fn text_output_with_no_findings() {
        let result = AuditResult::assemble(AuditContext::new("x", None, "npm"), None);
        let output = render(&TextOutput, &result);
        assert!(output.contains("  version: unknown\n"));
        assert!(output.contains("  findings: none\n"));
    }

    #[test]
    fn text_output_vulnerability_counts() {
        let mut ctx = sample_ctx();
        ctx.vulnerabilities = Some(VulnerabilityReport::new(json!({
            "matches": [
                { "vulnerability": { "id": "A", "severity": "High" }, "artifact": { "name": "p", "version": "1" } },
                { "vulnerability": { "id": "B", "severity": "High" }, "artifact": { "name": "p", "version": "1" } },
                { "vulnerability": { "id": "C", "severity": "Low" }, "artifact": { "name": "p", "version": "1" } }
            ]
        })));
        let output = render(&TextOutput, &AuditResult::assemble(ctx, None));
        assert!(output.contains("  vulnerabilities: 2 high, 1 low\n"));
    }

    #[test]
    fn text_output_aborted() {
        let mut ctx = sample_ctx();
        ctx.record("download_pypi", Severity::Critical, "artifact not found");
        let result = AuditResult::assemble(
            ctx,
            Some(Abort {
                task: "download_pypi".into(),
                message: "artifact not found".into(),
            }),
        );
        let output = render(&TextOutput, &result);
        assert!(output.contains("  score: 10\n"));
        assert!(output.contains("  aborted at download_pypi: artifact not found\n"));
    }

    #[test]
    fn json_output_is_valid() {
        let result = AuditResult::assemble(sample_ctx(), None);
        let output = render(&JsonOutput, &result);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["score"], 0);
        assert_eq!(parsed["context"]["package_name"], "requests");
        assert_eq!(parsed["context"]["metadata"]["version"], "2.31.0");
        assert_eq!(parsed["context"]["findings"][0]["source"], "fetch_pypi");
    }

    #[test]
    fn formatter_selects_by_flag() {
        let result = AuditResult::assemble(sample_ctx(), None);
        assert!(render(formatter(true).as_ref(), &result).starts_with('{'));
        assert!(render(formatter(false).as_ref(), &result).starts_with("requests"));
    }
}
