use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::finding::{Finding, Severity};
use crate::observer::{LogSink, StatusSink, StatusTriple};
use crate::registries::{Artifact, PackageMetadata};
use crate::tasks::report_data::ReportData;
use crate::tools::grype::VulnerabilityReport;
use crate::tools::syft::Sbom;

/// Cooperative cancellation signal shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for CancelFlag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Optional progress channels. A missing sink turns the matching call into a no-op.
#[derive(Clone, Default)]
pub struct Observers {
    pub log: Option<Arc<dyn LogSink>>,
    pub status: Option<Arc<dyn StatusSink>>,
    pub cancel: CancelFlag,
}

impl Observers {
    pub fn write_log(&self, message: &str) {
        if let Some(log) = &self.log {
            log.write(message);
        }
    }

    pub fn publish_status(&self, status: &StatusTriple) {
        if let Some(sink) = &self.status {
            sink.publish(status);
        }
    }
}

fn same_sink<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for Observers {
    fn eq(&self, other: &Self) -> bool {
        same_sink(&self.log, &other.log)
            && same_sink(&self.status, &other.status)
            && self.cancel == other.cancel
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("log", &self.log.is_some())
            .field("status", &self.status.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// The record threaded through every task of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditContext {
    package_name: String,
    requested_version: Option<String>,
    source_id: String,
    // Populated by tasks as the chain progresses
    pub metadata: Option<PackageMetadata>,
    pub artifact: Option<Artifact>,
    pub sbom: Option<Sbom>,
    pub vulnerabilities: Option<VulnerabilityReport>,
    pub report_data: Option<ReportData>,
    pub report_path: Option<PathBuf>,
    findings: Vec<Finding>,
    #[serde(skip)]
    observers: Observers,
}

impl AuditContext {
    pub fn new(
        package_name: impl Into<String>,
        requested_version: Option<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            requested_version,
            source_id: source_id.into(),
            metadata: None,
            artifact: None,
            sbom: None,
            vulnerabilities: None,
            report_data: None,
            report_path: None,
            findings: vec![],
            observers: Observers::default(),
        }
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.observers.log = Some(sink);
        self
    }

    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.observers.status = Some(sink);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.observers.cancel = cancel;
        self
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn requested_version(&self) -> Option<&str> {
        self.requested_version.as_deref()
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Version resolved by the registry, falling back to the requested one.
    pub fn effective_version(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.version.as_deref())
            .or(self.requested_version())
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn push_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn record(&mut self, source: &str, severity: Severity, message: impl Into<String>) {
        self.push_finding(Finding::new(source, severity, message));
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn is_cancelled(&self) -> bool {
        self.observers.cancel.is_cancelled()
    }

    /// Write a progress line to the log sink, if one is attached.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(package = %self.package_name, "{message}");
        self.observers.write_log(message);
    }
}
