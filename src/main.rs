//! CodeCanvas CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "codecanvas")]
#[command(about = "Persistent, queryable code graph for editing assistants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace, build the graph, and publish a snapshot
    Init,
    /// Drain a batch of the dirty queue and republish
    Refresh,
    /// Run a call-graph resolver pass
    Resolve {
        /// Budget in seconds
        #[arg(short, long, default_value = "30")]
        budget: f64,
    },
    /// Watch the workspace and refresh on external edits
    Watch,
    /// Enqueue paths as externally modified
    MarkDirty {
        /// Paths to mark
        paths: Vec<PathBuf>,
        /// Reason recorded in the queue
        #[arg(short = 'm', long, default_value = "manual")]
        reason: String,
    },
    /// Print the latest published snapshot record
    Status,
    /// Show what might break if a symbol changes
    Impact {
        /// Qualified symbol name (e.g. `Outer.method`)
        symbol: String,
        /// Maximum caller distance to report
        #[arg(short, long, default_value = "3")]
        depth: usize,
    },
    /// Delete the workspace's artifact directory
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "codecanvas={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("CodeCanvas v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init => commands::init(cli.root).await,
        Commands::Refresh => commands::refresh(cli.root).await,
        Commands::Resolve { budget } => commands::resolve(cli.root, budget).await,
        Commands::Watch => commands::watch(cli.root).await,
        Commands::MarkDirty { paths, reason } => {
            commands::mark_dirty(cli.root, paths, reason).await
        }
        Commands::Status => commands::status(cli.root).await,
        Commands::Impact { symbol, depth } => commands::impact(cli.root, symbol, depth).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("codecanvas v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
