mod cli;
mod sinks;

use std::process;
use std::sync::Arc;

use clap::Parser;
use pkgaudit::output::{OutputFormatter, formatter};
use pkgaudit::{AuditContext, CancelFlag, TracingLogSink};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, LogFormat};
use sinks::TerminalStatus;

const EXIT_ABORTED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.tracing_level_filter().into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn watch_interrupt(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping before the next task");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = cli.settings();
    let pipeline = pkgaudit::default_pipeline(&settings)?;
    let cancel = CancelFlag::new();
    watch_interrupt(cancel.clone());

    let ctx = AuditContext::new(cli.package, cli.pkg_version, cli.source)
        .with_status_sink(Arc::new(TerminalStatus::stderr()))
        .with_log_sink(Arc::new(TracingLogSink))
        .with_cancel_flag(cancel);

    let result = pipeline.run(ctx).await?;

    let mut stdout = std::io::stdout().lock();
    formatter(cli.json).write_result(&result, &mut stdout)?;

    Ok(if result.is_aborted() { EXIT_ABORTED } else { 0 })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(EXIT_ERROR);
        }
    }
}
