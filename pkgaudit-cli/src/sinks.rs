use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use pkgaudit::{StatusSink, StatusTriple};

/// Prints one numbered progress line per task.
pub struct TerminalStatus {
    step: AtomicUsize,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalStatus {
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            step: AtomicUsize::new(0),
            out: Mutex::new(out),
        }
    }
}

impl StatusSink for TerminalStatus {
    fn publish(&self, status: &StatusTriple) {
        let step = self.step.fetch_add(1, Ordering::Relaxed) + 1;
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let line = if status.next.is_empty() {
            format!("[{step}] {}", status.current)
        } else {
            format!("[{step}] {} -> {}", status.current, status.next)
        };
        if let Err(e) = writeln!(out, "{line}") {
            tracing::debug!(error = %e, "failed to write status line");
        }
    }
}
