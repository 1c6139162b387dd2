use async_trait::async_trait;
use tracing::debug;

use super::{RUN_ANALYSES, Task};
use crate::analyzers::AnalyzerSet;
use crate::context::AuditContext;
use crate::error::TaskError;

pub struct RunAnalyses {
    analyzers: AnalyzerSet,
}

impl RunAnalyses {
    pub fn new(analyzers: AnalyzerSet) -> Self {
        Self { analyzers }
    }
}

#[async_trait]
impl Task for RunAnalyses {
    fn name(&self) -> &'static str {
        RUN_ANALYSES
    }

    fn describe_status(&self, _ctx: &AuditContext) -> String {
        "Run Analyses".to_string()
    }

    async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
        for analyzer in self.analyzers.iter() {
            let findings = analyzer.analyze(ctx);
            debug!(analyzer = analyzer.name(), count = findings.len(), "analyzer finished");
            ctx.log(format!(
                "[{RUN_ANALYSES}] {}: {} finding(s)",
                analyzer.name(),
                findings.len()
            ));
            for finding in findings {
                ctx.push_finding(finding);
            }
        }
        Ok(())
    }
}
