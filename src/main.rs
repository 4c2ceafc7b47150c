use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolyard::config::{LoggingConfig, ToolyardConfig};
use toolyard::memo::MemoStore;

/// Maintenance tool for Toolyard's shared cache.
#[derive(Debug, Parser)]
#[command(name = "toolyard", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect or clear the persisted cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Subcommand)]
enum CacheAction {
    /// Show entry counts for the shared tiers
    Stats,
    /// Remove persisted entries
    Clear {
        /// Only remove entries whose key contains this text
        #[arg(long)]
        pattern: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ToolyardConfig::load(cli.config.as_deref())?;

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Toolyard starting");

    match cli.command {
        Command::Cache { action } => {
            let store = MemoStore::from_config(&config.cache);
            info!(
                directory = %config.cache.directory.display(),
                disk_enabled = config.cache.disk_enabled,
                "Cache store opened"
            );

            match action {
                CacheAction::Stats => {
                    let stats = store.shared_stats();
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                CacheAction::Clear { pattern } => {
                    let removed = store.clear_shared(pattern.as_deref());
                    info!(removed = removed, pattern = ?pattern, "Cache cleared");
                    println!("removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
                }
            }
        }
        Command::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
