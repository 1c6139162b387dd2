use std::sync::Arc;

use tracing::{Instrument, debug, info_span, instrument, warn};

use crate::chain::ChainTable;
use crate::context::AuditContext;
use crate::error::{ConfigError, TaskError};
use crate::finding::Severity;
use crate::observer::StatusTriple;
use crate::registry::TaskRegistry;
use crate::result::{Abort, AuditResult};
use crate::tasks::Task;

/// Finding source used for problems raised by the orchestrator itself.
pub const PIPELINE_SOURCE: &str = "pipeline";

/// Runs the task chain for a context's source, one task at a time.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<TaskRegistry>,
    chains: Arc<ChainTable>,
}

impl Pipeline {
    pub fn new(registry: Arc<TaskRegistry>, chains: Arc<ChainTable>) -> Self {
        Self { registry, chains }
    }

    /// Resolve every task listed for `source_id`, failing on the first missing name.
    pub fn chain_for(&self, source_id: &str) -> Result<Vec<Arc<dyn Task>>, ConfigError> {
        self.chains
            .resolve(source_id)?
            .iter()
            .map(|name| {
                self.registry
                    .resolve(name)
                    .ok_or_else(|| ConfigError::UnresolvedTask {
                        source_id: source_id.to_string(),
                        task: name.clone(),
                    })
            })
            .collect()
    }

    /// Status triple for position `index` of `chain`, evaluated on `ctx` as it is now.
    pub fn status_for(ctx: &AuditContext, chain: &[Arc<dyn Task>], index: usize) -> StatusTriple {
        let describe = |i: Option<usize>| {
            i.and_then(|i| chain.get(i))
                .map(|task| task.describe_status(ctx))
                .unwrap_or_default()
        };
        StatusTriple {
            previous: describe(index.checked_sub(1)),
            current: describe(Some(index)),
            next: describe(index.checked_add(1)),
        }
    }

    /// Run the chain for `ctx.source_id()` and assemble the result.
    ///
    /// Configuration problems are returned before any task runs. A fatal task
    /// error or a cancellation stops the chain; the partial context is still
    /// returned inside an aborted [`AuditResult`].
    #[instrument(skip(self, ctx), fields(package = ctx.package_name(), source = ctx.source_id()))]
    pub async fn run(&self, mut ctx: AuditContext) -> Result<AuditResult, ConfigError> {
        let chain = self.chain_for(ctx.source_id())?;
        debug!(task_count = chain.len(), "chain resolved");

        let mut abort = None;
        for (index, task) in chain.iter().enumerate() {
            let name = task.name();

            if ctx.is_cancelled() {
                let message = TaskError::Cancelled.to_string();
                warn!(task = name, "cancelled before task started");
                ctx.record(PIPELINE_SOURCE, Severity::Critical, &message);
                abort = Some(Abort {
                    task: name.to_string(),
                    message,
                });
                break;
            }

            let status = Self::status_for(&ctx, &chain, index);
            ctx.observers().publish_status(&status);

            let before = ctx.findings().len();
            let outcome = task
                .execute(&mut ctx)
                .instrument(info_span!("task", task = name, index))
                .await;

            match outcome {
                Ok(()) => debug!(task = name, "task complete"),
                Err(e) => {
                    let message = e.to_string();
                    warn!(task = name, error = %e, "task failed, stopping chain");

                    let attributed = ctx.findings()[before..]
                        .iter()
                        .any(|f| f.severity == Severity::Critical && f.source == name);
                    if !attributed {
                        ctx.record(name, Severity::Critical, &message);
                    }
                    abort = Some(Abort {
                        task: name.to_string(),
                        message,
                    });
                    break;
                }
            }
        }

        let result = AuditResult::assemble(ctx, abort);
        debug!(
            score = result.score(),
            findings = result.findings().len(),
            aborted = result.is_aborted(),
            "pipeline finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::context::CancelFlag;
    use crate::observer::StatusSink;
    use crate::registries::PackageMetadata;
    use crate::tasks::register_all;
    use crate::settings::Settings;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records its execution, appends fixed findings, then optionally fails.
    struct ScriptedTask {
        name: &'static str,
        journal: Journal,
        findings: Vec<(Severity, &'static str)>,
        failure: Option<TaskFailure>,
    }

    enum TaskFailure {
        Fatal(&'static str),
        FatalWithOwnCritical(&'static str),
        Cancelled,
    }

    impl ScriptedTask {
        fn ok(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: journal.clone(),
                findings: vec![],
                failure: None,
            }
        }

        fn finding(mut self, severity: Severity, message: &'static str) -> Self {
            self.findings.push((severity, message));
            self
        }

        fn failing(mut self, failure: TaskFailure) -> Self {
            self.failure = Some(failure);
            self
        }
    }

    #[async_trait]
    impl Task for ScriptedTask {
        fn name(&self) -> &'static str {
            self.name
        }

        fn describe_status(&self, ctx: &AuditContext) -> String {
            format!("{} [{}]", self.name, ctx.findings().len())
        }

        async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
            self.journal.lock().unwrap().push(self.name.to_string());
            for (severity, message) in &self.findings {
                ctx.record(self.name, *severity, *message);
            }
            match self.failure {
                None => Ok(()),
                Some(TaskFailure::Fatal(message)) => Err(TaskError::fatal(message)),
                Some(TaskFailure::FatalWithOwnCritical(message)) => {
                    ctx.record(self.name, Severity::Critical, message);
                    Err(TaskError::fatal(message))
                }
                Some(TaskFailure::Cancelled) => Err(TaskError::Cancelled),
            }
        }
    }

    /// Sets metadata and one info finding, like a registry fetch.
    struct FetchLike(Journal);

    #[async_trait]
    impl Task for FetchLike {
        fn name(&self) -> &'static str {
            "fetch"
        }

        fn describe_status(&self, _ctx: &AuditContext) -> String {
            "Query PyPI".to_string()
        }

        async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
            self.0.lock().unwrap().push("fetch".to_string());
            ctx.metadata = Some(PackageMetadata {
                name: ctx.package_name().to_string(),
                version: Some("1.0.0".into()),
                ..Default::default()
            });
            ctx.record("fetch", Severity::Info, "Successfully fetched metadata");
            Ok(())
        }
    }

    /// Trips the shared cancel flag and otherwise succeeds.
    struct CancellingTask(Journal);

    #[async_trait]
    impl Task for CancellingTask {
        fn name(&self) -> &'static str {
            "cancel"
        }

        fn describe_status(&self, _ctx: &AuditContext) -> String {
            "Cancel".to_string()
        }

        async fn execute(&self, ctx: &mut AuditContext) -> Result<(), TaskError> {
            self.0.lock().unwrap().push("cancel".to_string());
            ctx.observers().cancel.cancel();
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStatus(Mutex<Vec<StatusTriple>>);

    impl StatusSink for RecordingStatus {
        fn publish(&self, status: &StatusTriple) {
            self.0.lock().unwrap().push(status.clone());
        }
    }

    impl RecordingStatus {
        fn published(&self) -> Vec<StatusTriple> {
            self.0.lock().unwrap().clone()
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn executed(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn pipeline(tasks: Vec<Arc<dyn Task>>, source: &str, chain: &[&str]) -> Pipeline {
        let mut registry = TaskRegistry::new();
        for task in tasks {
            registry.register_arc(task).unwrap();
        }
        let chains = ChainTable::builder()
            .chain(source, chain.iter().copied())
            .build();
        Pipeline::new(Arc::new(registry), Arc::new(chains))
    }

    fn pypi_ctx() -> AuditContext {
        AuditContext::new("requests", None, "pypi")
    }

    fn triple(previous: &str, current: &str, next: &str) -> StatusTriple {
        StatusTriple {
            previous: previous.into(),
            current: current.into(),
            next: next.into(),
        }
    }

    #[tokio::test]
    async fn runs_every_task_once_in_listed_order() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(ScriptedTask::ok("c", &log)),
                Arc::new(ScriptedTask::ok("a", &log)),
                Arc::new(ScriptedTask::ok("b", &log)),
            ],
            "pypi",
            &["a", "b", "c"],
        );
        let status = Arc::new(RecordingStatus::default());

        let result = p.run(pypi_ctx().with_status_sink(status.clone())).await.unwrap();

        assert!(!result.is_aborted());
        assert_eq!(executed(&log), vec!["a", "b", "c"]);
        let currents: Vec<String> = status.published().into_iter().map(|s| s.current).collect();
        assert_eq!(currents, vec!["a [0]", "b [0]", "c [0]"]);
    }

    #[tokio::test]
    async fn status_triples_have_empty_edges() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(ScriptedTask::ok("a", &log)),
                Arc::new(ScriptedTask::ok("b", &log)),
                Arc::new(ScriptedTask::ok("c", &log)),
            ],
            "pypi",
            &["a", "b", "c"],
        );
        let status = Arc::new(RecordingStatus::default());

        p.run(pypi_ctx().with_status_sink(status.clone())).await.unwrap();

        assert_eq!(
            status.published(),
            vec![
                triple("", "a [0]", "b [0]"),
                triple("a [0]", "b [0]", "c [0]"),
                triple("b [0]", "c [0]", ""),
            ]
        );
    }

    #[tokio::test]
    async fn status_is_computed_before_execute() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(ScriptedTask::ok("a", &log).finding(Severity::Info, "one")),
                Arc::new(
                    ScriptedTask::ok("b", &log)
                        .finding(Severity::Low, "two")
                        .finding(Severity::Low, "three"),
                ),
            ],
            "pypi",
            &["a", "b"],
        );
        let status = Arc::new(RecordingStatus::default());

        p.run(pypi_ctx().with_status_sink(status.clone())).await.unwrap();

        // "b" sees one finding from "a" and none of its own
        assert_eq!(
            status.published(),
            vec![triple("", "a [0]", "b [0]"), triple("a [1]", "b [1]", "")]
        );
    }

    #[tokio::test]
    async fn single_task_chain_has_no_neighbours() {
        let log = journal();
        let p = pipeline(vec![Arc::new(ScriptedTask::ok("only", &log))], "npm", &["only"]);
        let status = Arc::new(RecordingStatus::default());

        p.run(AuditContext::new("x", None, "npm").with_status_sink(status.clone()))
            .await
            .unwrap();

        assert_eq!(status.published(), vec![triple("", "only [0]", "")]);
    }

    #[tokio::test]
    async fn empty_chain_yields_clean_result() {
        let p = pipeline(vec![], "pypi", &[]);
        let result = p.run(pypi_ctx()).await.unwrap();
        assert!(!result.is_aborted());
        assert!(result.findings().is_empty());
        assert_eq!(result.score(), 0);
    }

    #[tokio::test]
    async fn runs_without_any_sinks() {
        let log = journal();
        let p = pipeline(
            vec![Arc::new(ScriptedTask::ok("a", &log).finding(Severity::High, "x"))],
            "pypi",
            &["a"],
        );
        let result = p.run(pypi_ctx()).await.unwrap();
        assert_eq!(result.score(), 5);
    }

    #[tokio::test]
    async fn unknown_source_runs_nothing() {
        let log = journal();
        let p = pipeline(vec![Arc::new(ScriptedTask::ok("a", &log))], "pypi", &["a"]);
        let status = Arc::new(RecordingStatus::default());

        let err = p
            .run(AuditContext::new("requests", None, "unknown-source").with_status_sink(status.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::UnknownSource { ref source_id, .. } if source_id == "unknown-source"));
        assert!(executed(&log).is_empty());
        assert!(status.published().is_empty());
    }

    #[tokio::test]
    async fn unresolved_task_fails_before_anything_runs() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(ScriptedTask::ok("a", &log)),
                Arc::new(ScriptedTask::ok("c", &log)),
            ],
            "pypi",
            &["a", "missing", "c"],
        );
        let status = Arc::new(RecordingStatus::default());

        let err = p
            .run(pypi_ctx().with_status_sink(status.clone()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::UnresolvedTask {
                source_id: "pypi".into(),
                task: "missing".into(),
            }
        );
        assert!(executed(&log).is_empty());
        assert!(status.published().is_empty());
    }

    #[tokio::test]
    async fn fatal_error_stops_chain_and_keeps_findings_through_failure() {
        for fail_at in 0..3 {
            let log = journal();
            let names = ["a", "b", "c"];
            let tasks: Vec<Arc<dyn Task>> = names
                .iter()
                .enumerate()
                .map(|(i, &name)| {
                    let task = ScriptedTask::ok(name, &log).finding(Severity::Low, "work");
                    let task = if i == fail_at {
                        task.failing(TaskFailure::Fatal("boom"))
                    } else {
                        task
                    };
                    Arc::new(task) as Arc<dyn Task>
                })
                .collect();
            let p = pipeline(tasks, "pypi", &names);

            let result = p.run(pypi_ctx()).await.unwrap();

            assert_eq!(executed(&log), names[..=fail_at].to_vec(), "fail_at={fail_at}");
            // one "work" finding per executed task plus the critical one
            assert_eq!(result.findings().len(), fail_at + 2, "fail_at={fail_at}");
            let last = result.findings().last().unwrap();
            assert_eq!(last.severity, Severity::Critical);
            assert_eq!(last.source, names[fail_at]);
            assert_eq!(last.message, "boom");
            let abort = result.abort().unwrap();
            assert_eq!(abort.task, names[fail_at]);
            assert_eq!(abort.message, "boom");
        }
    }

    #[tokio::test]
    async fn task_recorded_critical_is_not_duplicated() {
        let log = journal();
        let p = pipeline(
            vec![Arc::new(
                ScriptedTask::ok("download", &log)
                    .failing(TaskFailure::FatalWithOwnCritical("artifact not found")),
            )],
            "pypi",
            &["download"],
        );

        let result = p.run(pypi_ctx()).await.unwrap();

        let critical: Vec<_> = result
            .findings()
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].source, "download");
    }

    #[tokio::test]
    async fn critical_from_other_source_does_not_count_as_attribution() {
        let log = journal();
        let p = pipeline(
            vec![Arc::new(
                ScriptedTask::ok("download", &log).failing(TaskFailure::Fatal("boom")),
            )],
            "pypi",
            &["download"],
        );
        let mut ctx = pypi_ctx();
        ctx.record("elsewhere", Severity::Critical, "earlier problem");

        let result = p.run(ctx).await.unwrap();

        let sources: Vec<&str> = result.findings().iter().map(|f| f.source.as_str()).collect();
        assert_eq!(sources, vec!["elsewhere", "download"]);
    }

    #[tokio::test]
    async fn findings_never_shrink_and_keep_call_order() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(
                    ScriptedTask::ok("a", &log)
                        .finding(Severity::Info, "a1")
                        .finding(Severity::Medium, "a2"),
                ),
                Arc::new(ScriptedTask::ok("b", &log).finding(Severity::Low, "b1")),
            ],
            "pypi",
            &["a", "b"],
        );
        let mut ctx = pypi_ctx();
        ctx.record("caller", Severity::Info, "seed");

        let result = p.run(ctx).await.unwrap();

        let messages: Vec<&str> = result.findings().iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["seed", "a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn scenario_fetch_then_analyze() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(FetchLike(log.clone())),
                Arc::new(
                    ScriptedTask::ok("analyze", &log)
                        .finding(Severity::Low, "no license")
                        .finding(Severity::High, "typosquat suspected"),
                ),
            ],
            "pypi",
            &["fetch", "analyze"],
        );

        let result = p.run(pypi_ctx()).await.unwrap();

        let shape: Vec<(&str, Severity)> = result
            .findings()
            .iter()
            .map(|f| (f.source.as_str(), f.severity))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("fetch", Severity::Info),
                ("analyze", Severity::Low),
                ("analyze", Severity::High),
            ]
        );
        assert_eq!(result.score(), 6);
        assert!(result.context().metadata.is_some());
        assert!(!result.is_aborted());
    }

    #[tokio::test]
    async fn scenario_download_failure_stops_before_analyze() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(FetchLike(log.clone())),
                Arc::new(
                    ScriptedTask::ok("download", &log)
                        .failing(TaskFailure::Fatal("artifact not found")),
                ),
                Arc::new(ScriptedTask::ok("analyze", &log).finding(Severity::High, "never")),
            ],
            "pypi",
            &["fetch", "download", "analyze"],
        );

        let result = p.run(pypi_ctx()).await.unwrap();

        assert_eq!(executed(&log), vec!["fetch", "download"]);
        let findings = result.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].source, "fetch");
        assert_eq!(findings[1].source, "download");
        assert_eq!(findings[1].severity, Severity::Critical);
        assert_eq!(findings[1].message, "artifact not found");
        assert_eq!(result.score(), 10);
        assert!(result.is_aborted());
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let log = journal();
        let p = pipeline(vec![Arc::new(ScriptedTask::ok("a", &log))], "pypi", &["a"]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let status = Arc::new(RecordingStatus::default());

        let result = p
            .run(
                pypi_ctx()
                    .with_cancel_flag(cancel)
                    .with_status_sink(status.clone()),
            )
            .await
            .unwrap();

        assert!(executed(&log).is_empty());
        assert!(status.published().is_empty());
        assert_eq!(result.findings()[0].source, PIPELINE_SOURCE);
        assert_eq!(result.abort().unwrap().message, "audit cancelled");
        assert_eq!(result.abort().unwrap().task, "a");
    }

    #[tokio::test]
    async fn cancellation_mid_run_skips_next_status() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(CancellingTask(log.clone())),
                Arc::new(ScriptedTask::ok("after", &log)),
            ],
            "pypi",
            &["cancel", "after"],
        );
        let status = Arc::new(RecordingStatus::default());

        let result = p
            .run(
                pypi_ctx()
                    .with_cancel_flag(CancelFlag::new())
                    .with_status_sink(status.clone()),
            )
            .await
            .unwrap();

        assert_eq!(executed(&log), vec!["cancel"]);
        assert_eq!(status.published().len(), 1);
        assert_eq!(result.abort().unwrap().task, "after");
    }

    #[tokio::test]
    async fn task_reported_cancellation_is_fatal() {
        let log = journal();
        let p = pipeline(
            vec![
                Arc::new(ScriptedTask::ok("a", &log).failing(TaskFailure::Cancelled)),
                Arc::new(ScriptedTask::ok("b", &log)),
            ],
            "pypi",
            &["a", "b"],
        );

        let result = p.run(pypi_ctx()).await.unwrap();

        assert_eq!(executed(&log), vec!["a"]);
        assert_eq!(result.findings()[0].severity, Severity::Critical);
        assert_eq!(result.findings()[0].message, "audit cancelled");
    }

    #[test]
    fn describe_status_leaves_context_unchanged() {
        let mut registry = TaskRegistry::new();
        register_all(&mut registry, &Settings::default(), &reqwest::Client::new()).unwrap();
        let mut ctx = pypi_ctx();
        ctx.record("caller", Severity::Low, "seed");
        let before = ctx.clone();

        for _ in 0..3 {
            for task in registry.all() {
                let _ = task.describe_status(&ctx);
            }
        }

        assert_eq!(ctx, before);
    }

    #[test]
    fn default_chains_resolve_against_builtin_tasks() {
        let mut registry = TaskRegistry::new();
        register_all(&mut registry, &Settings::default(), &reqwest::Client::new()).unwrap();
        let p = Pipeline::new(Arc::new(registry), Arc::new(ChainTable::default()));

        let chain = p.chain_for("pypi").unwrap();
        let names: Vec<&str> = chain.iter().map(|t| t.name()).collect();
        assert_eq!(names[0], "fetch_pypi");
        assert_eq!(names.len(), 7);

        let status = Pipeline::status_for(&pypi_ctx(), &chain, 0);
        assert_eq!(status, triple("", "Query PyPI", "Download Package"));
    }
}
