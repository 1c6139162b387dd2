use std::fmt;

use serde::Serialize;

/// Status of the task about to run, flanked by its neighbours in the chain.
///
/// `previous` is empty for the first task and `next` is empty for the last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusTriple {
    pub previous: String,
    pub current: String,
    pub next: String,
}

impl fmt::Display for StatusTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.current)?;
        if !self.previous.is_empty() {
            write!(f, " (after: {})", self.previous)?;
        }
        if !self.next.is_empty() {
            write!(f, " (next: {})", self.next)?;
        }
        Ok(())
    }
}

/// Receives the status triple once per task, right before it executes.
///
/// Called synchronously from the pipeline loop, so implementations must
/// return promptly. Repeated identical calls must be harmless.
pub trait StatusSink: Send + Sync {
    fn publish(&self, status: &StatusTriple);
}

/// Receives free-form progress lines written by tasks, in call order.
pub trait LogSink: Send + Sync {
    fn write(&self, message: &str);
}

/// Log sink that forwards every line to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, message: &str) {
        tracing::info!(target: "pkgaudit::task_log", "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_middle_task() {
        let status = StatusTriple {
            previous: "Query PyPI".into(),
            current: "Download Package".into(),
            next: "Generate SBOM".into(),
        };
        assert_eq!(
            status.to_string(),
            "Download Package (after: Query PyPI) (next: Generate SBOM)"
        );
    }

    #[test]
    fn display_omits_empty_neighbours() {
        let status = StatusTriple {
            current: "Query PyPI".into(),
            ..Default::default()
        };
        assert_eq!(status.to_string(), "Query PyPI");
    }
}
