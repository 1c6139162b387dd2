use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::context::AuditContext;
use crate::finding::{Finding, Severity};

/// Points contributed by a single finding of the given severity.
pub fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 10,
        Severity::High => 5,
        Severity::Medium => 2,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

/// Sum of severity weights over every finding in `ctx`.
pub fn compute_score(ctx: &AuditContext) -> u32 {
    ctx.findings()
        .iter()
        .map(|f| severity_weight(f.severity))
        .sum()
}

/// Why a run stopped before the end of its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abort {
    pub task: String,
    pub message: String,
}

/// Final outcome of one audit run, complete or aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    context: AuditContext,
    score: u32,
    report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    abort: Option<Abort>,
}

impl AuditResult {
    pub(crate) fn assemble(context: AuditContext, abort: Option<Abort>) -> Self {
        Self {
            score: compute_score(&context),
            report_path: context.report_path.clone(),
            context,
            abort,
        }
    }

    pub fn context(&self) -> &AuditContext {
        &self.context
    }

    pub fn into_context(self) -> AuditContext {
        self.context
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    pub fn abort(&self) -> Option<&Abort> {
        self.abort.as_ref()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    pub fn findings(&self) -> &[Finding] {
        self.context.findings()
    }

    /// Most severe finding level, if any finding was recorded.
    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings().iter().map(|f| f.severity).max()
    }
}
