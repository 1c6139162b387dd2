use thiserror::Error;

/// Problems with the task registry or chain table, detected before any task runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown source: {source_id} (available: {})", .available.join(", "))]
    UnknownSource {
        source_id: String,
        available: Vec<String>,
    },
    #[error("task '{task}' listed in the {source_id} chain is not registered")]
    UnresolvedTask { source_id: String, task: String },
    #[error("task '{0}' is already registered")]
    DuplicateTask(String),
}

/// Failure reported by a task that stops the chain.
///
/// Recoverable problems never surface here; tasks turn them into findings
/// and return `Ok(())`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Fatal(String),
    #[error("audit cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fatal(format!("{err:#}"))
    }
}
