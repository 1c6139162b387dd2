pub mod analyzers;
pub mod chain;
pub mod context;
pub mod error;
pub mod finding;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod registries;
pub mod registry;
pub mod result;
pub mod settings;
pub mod tasks;
pub mod tools;

use std::sync::Arc;

use anyhow::Context as _;

pub use chain::ChainTable;
pub use context::{AuditContext, CancelFlag};
pub use error::{ConfigError, TaskError};
pub use finding::{Finding, Severity};
pub use observer::{LogSink, StatusSink, StatusTriple, TracingLogSink};
pub use pipeline::Pipeline;
pub use registry::TaskRegistry;
pub use result::{Abort, AuditResult, compute_score};
pub use settings::Settings;
pub use tasks::Task;

/// Build a pipeline with every built-in task and the default chain table.
pub fn default_pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let client = registries::http_client(settings)?;
    let mut registry = TaskRegistry::new();
    tasks::register_all(&mut registry, settings, &client)
        .context("failed to register built-in tasks")?;
    Ok(Pipeline::new(
        Arc::new(registry),
        Arc::new(ChainTable::default()),
    ))
}
