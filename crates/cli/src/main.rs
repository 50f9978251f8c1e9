//! Drop Shop CLI - Database migrations, seeding and stats.
//!
//! # Usage
//!
//! ```bash
//! # Apply the schema migrations
//! dropshop migrate
//!
//! # Load drops, products and users from YAML
//! dropshop seed crates/cli/seed.example.yaml
//!
//! # Row counts and order revenue by status
//! dropshop stats
//! dropshop stats --json
//! ```
//!
//! # Environment Variables
//!
//! See `dropshop_client::config` (`DATABASE_URL` and pool settings).
//! `RUST_LOG` overrides the default log filter.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "dropshop_client=info,dropshop_cli=info";

#[derive(Parser)]
#[command(name = "dropshop")]
#[command(author, version, about = "Drop Shop CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Seed the database from a YAML file
    Seed {
        /// Path to the seed file
        file: PathBuf,

        /// Validate the file without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Show table counts and orders by status
    Stats {
        /// Print JSON instead of log lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, dry_run } => commands::seed::run(&file, dry_run).await?,
        Commands::Stats { json } => commands::stats::run(json).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_seed_args() {
        let cli = Cli::try_parse_from(["dropshop", "seed", "shop.yaml", "--dry-run"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Seed { ref file, dry_run: true }) if file == &PathBuf::from("shop.yaml")
        ));
    }
}
