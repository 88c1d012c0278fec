//! Thicket CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use thicket_core::TargetKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "thicket")]
#[command(about = "Load, validate and query BUILD manifests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Build root (defaults to the nearest ancestor holding thicket.toml)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List declared targets
    List {
        /// Only targets of this kind (library, test-suite, binary, page, resources, other)
        #[arg(long)]
        kind: Option<TargetKind>,

        /// Only targets carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Check that every dependency resolves and the graph is acyclic
    Validate,
    /// Show what a target depends on
    Deps {
        address: String,

        /// Include indirect dependencies
        #[arg(short, long)]
        transitive: bool,
    },
    /// Show what depends on a target
    Dependees {
        address: String,

        /// Include indirect dependees
        #[arg(short, long)]
        transitive: bool,
    },
    /// Print targets with dependencies before dependents
    Order,
    /// Show a dependency path between two targets
    Path { from: String, to: String },
    /// Print cache keys (all targets when none are given)
    Keys {
        addresses: Vec<String>,

        /// Cover each target's dependencies too
        #[arg(short, long)]
        transitive: bool,
    },
    /// List targets whose keys changed since the last `mark`
    Changed {
        /// Compare transitive keys
        #[arg(short, long)]
        transitive: bool,
    },
    /// Record the current key of every target
    Mark {
        /// Record transitive keys
        #[arg(short, long)]
        transitive: bool,
    },
    /// Reload and re-validate whenever a manifest changes (`--json` prints each diff)
    Watch,
    /// Remove the working directory
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; THICKET_LOG takes precedence over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = std::env::var("THICKET_LOG").unwrap_or_else(|_| format!("thicket={}", log_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Version = cli.command {
        println!("thicket v{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let root = commands::build_root(cli.root)?;
    tracing::debug!("Build root: {}", root.display());
    let json = cli.json;

    match cli.command {
        Commands::List { kind, tag } => commands::list(&root, kind, tag.as_deref(), json),
        Commands::Validate => commands::validate(&root, json),
        Commands::Deps { address, transitive } => commands::deps(&root, &address, transitive, json),
        Commands::Dependees { address, transitive } => {
            commands::dependees(&root, &address, transitive, json)
        }
        Commands::Order => commands::order(&root, json),
        Commands::Path { from, to } => commands::path(&root, &from, &to, json),
        Commands::Keys { addresses, transitive } => commands::keys(&root, &addresses, transitive, json),
        Commands::Changed { transitive } => commands::changed(&root, transitive, json),
        Commands::Mark { transitive } => commands::mark(&root, transitive),
        Commands::Watch => commands::watch(&root, json).await,
        Commands::Clear => commands::clear(&root),
        Commands::Version => Ok(ExitCode::SUCCESS),
    }
}
