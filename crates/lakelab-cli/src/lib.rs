//! lakelab CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::future::Future;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// lakelab - disposable data-lakehouse labs on a managed cloud
#[derive(Parser, Debug)]
#[command(name = "lakelab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Lab config file (default: $LAKELAB_CONFIG or ./lakelab.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the state backend and the long-lived foundation
    Bootstrap(commands::bootstrap::BootstrapArgs),
    /// Bring up the cluster, essentials, and components
    Up(commands::up::UpArgs),
    /// Tear down the cluster (and optionally the foundation)
    Down(commands::down::DownArgs),
    /// Show the recorded lab state and live cluster status
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Run the CLI command, stopping in-progress waits when `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let orch = commands::orchestrator(self.config.as_deref(), cancel)?;
        match self.command {
            Commands::Bootstrap(args) => commands::bootstrap::run(&orch, args).await,
            Commands::Up(args) => commands::up::run(&orch, args).await,
            Commands::Down(args) => commands::down::run(&orch, args).await,
            Commands::Status(args) => commands::status::run(&orch, args).await,
        }
    }
}

/// Cancel `cancel` on the first interrupt from `next_signal`, then keep
/// listening. Returns `true` when a second interrupt arrives, `false` if the
/// signal source fails.
pub async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    warn!("interrupt received, stopping after the current step (press Ctrl-C again to quit now)");
    cancel.cancel();
    next_signal().await.is_ok()
}
