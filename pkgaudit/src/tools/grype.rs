use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{ToolError, VulnerabilityScanner, run_json};
use crate::finding::Severity;

/// Raw Grype output for the SBOM of the audited package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityReport {
    #[serde(skip)]
    pub raw: Value,
    pub total_matches: usize,
    pub unique_vulnerabilities: usize,
}

impl VulnerabilityReport {
    pub fn new(raw: Value) -> Self {
        let total_matches = matches(&raw).len();
        let unique_vulnerabilities = unique_vulnerabilities(&raw).len();
        Self {
            raw,
            total_matches,
            unique_vulnerabilities,
        }
    }

    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        unique_vulnerabilities(&self.raw)
    }
}

/// Scan an SBOM file with Grype and return the JSON report.
pub async fn scan_sbom(program: &str, sbom: &Path, timeout: Duration) -> Result<Value, ToolError> {
    let args = vec![
        format!("sbom:{}", sbom.display()),
        "-o".to_string(),
        "json".to_string(),
    ];
    run_json("grype", program, &args, timeout).await
}

/// The `grype` binary.
#[derive(Debug, Clone)]
pub struct Grype {
    program: String,
    timeout: Duration,
}

impl Grype {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VulnerabilityScanner for Grype {
    async fn scan(&self, sbom: &Path) -> Result<Value, ToolError> {
        scan_sbom(&self.program, sbom, self.timeout).await
    }
}

/// One vulnerability in one package version, merged across duplicate matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vulnerability {
    pub id: String,
    pub package: String,
    pub version: String,
    pub severity: Severity,
    pub description: Option<String>,
    pub fixed_version: Option<String>,
    pub purl: Option<String>,
    pub component_count: usize,
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}@{}", self.id, self.package, self.version)?;
        match &self.fixed_version {
            Some(fixed) => write!(f, " (Fixed in {fixed})")?,
            None => write!(f, " (No fix available)")?,
        }
        if self.component_count > 1 {
            write!(f, " - affects {} component(s)", self.component_count)?;
        }
        Ok(())
    }
}

fn matches(raw: &Value) -> &[Value] {
    raw["matches"].as_array().map(Vec::as_slice).unwrap_or_default()
}

/// Deduplicate Grype matches by (id, package, version), keeping first-seen order.
pub fn unique_vulnerabilities(raw: &Value) -> Vec<Vulnerability> {
    let mut out: Vec<Vulnerability> = Vec::new();
    let mut positions: HashMap<(String, String, String), usize> = HashMap::new();

    for m in matches(raw) {
        let vuln = &m["vulnerability"];
        let artifact = &m["artifact"];
        let id = vuln["id"].as_str().unwrap_or("UNKNOWN").to_string();
        let package = artifact["name"].as_str().unwrap_or("unknown").to_string();
        let version = artifact["version"].as_str().unwrap_or("unknown").to_string();

        let key = (id.clone(), package.clone(), version.clone());
        if let Some(&pos) = positions.get(&key) {
            out[pos].component_count += 1;
            continue;
        }
        positions.insert(key, out.len());

        let description = vuln["description"]
            .as_str()
            .or_else(|| vuln["name"].as_str())
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);

        out.push(Vulnerability {
            id,
            package,
            version,
            severity: Severity::from_scanner_label(vuln["severity"].as_str().unwrap_or_default()),
            description,
            fixed_version: vuln["fix"]["versions"][0].as_str().map(str::to_string),
            purl: artifact["purl"].as_str().map(str::to_string),
            component_count: 1,
        });
    }

    out
}

/// Per-severity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        *self.slot(severity) += 1;
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    fn slot(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        }
    }
}

impl<'a> FromIterator<&'a Vulnerability> for SeverityCounts {
    fn from_iter<I: IntoIterator<Item = &'a Vulnerability>>(iter: I) -> Self {
        let mut counts = Self::default();
        for v in iter {
            counts.add(v.severity);
        }
        counts
    }
}
