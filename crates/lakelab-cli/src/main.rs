//! lakelab CLI
//!
//! Lifecycle of a disposable data-lakehouse lab: bootstrap, up, down, status.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lakelab_cli::{watch_interrupts, Cli};

/// 128 + SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_interrupt).await {
            error!("second interrupt, exiting without waiting for the current step");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let cli = Cli::parse();
    match cli.run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(class = e.class(), "{}", e);
            eprintln!("error [{}]: {}", e.class(), e);
            if e.is_retryable() {
                eprintln!("the lab state was checkpointed; re-run the command to resume");
            }
            ExitCode::FAILURE
        }
    }
}
