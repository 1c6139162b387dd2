use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

pub mod grype;
pub mod syft;

pub use grype::Grype;
pub use syft::Syft;

/// Produces a CycloneDX SBOM for a file or directory.
#[async_trait]
pub trait SbomGenerator: Send + Sync {
    async fn generate(&self, target: &Path) -> Result<Value, ToolError>;
}

/// Matches the components of an SBOM against a vulnerability database.
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    async fn scan(&self, sbom: &Path) -> Result<Value, ToolError>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found at '{program}'; install it or point PKGAUDIT_{} at it", .tool.to_uppercase())]
    NotFound { tool: &'static str, program: String },
    #[error("{tool} failed: {message}")]
    Failed { tool: &'static str, message: String },
    #[error("{tool} timed out after {} seconds", .timeout.as_secs())]
    Timeout { tool: &'static str, timeout: Duration },
    #[error("failed to parse {tool} output: {source}")]
    InvalidOutput {
        tool: &'static str,
        source: serde_json::Error,
    },
}

/// Run an external scanner and parse its stdout as JSON.
#[instrument(skip(args))]
pub(crate) async fn run_json(
    tool: &'static str,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Value, ToolError> {
    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => return Err(ToolError::Timeout { tool, timeout }),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound {
                tool,
                program: program.to_string(),
            });
        }
        Ok(Err(e)) => {
            return Err(ToolError::Failed {
                tool,
                message: e.to_string(),
            });
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            msg => msg.to_string(),
        };
        return Err(ToolError::Failed { tool, message });
    }

    debug!(tool, bytes = output.stdout.len(), "tool finished");
    serde_json::from_slice(&output.stdout).map_err(|source| ToolError::InvalidOutput { tool, source })
}
