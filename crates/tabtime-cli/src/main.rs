use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tabtime_cli::commands::{clear, consolidate, replay, send, status, timeline};
use tabtime_cli::{Cli, Commands, Config};
use tabtime_engine::SystemClock;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Arc<tabtime_db::Database>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tabtime_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((Arc::new(db), config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, db.as_ref(), &config.database_path)?;
        }
        Some(Commands::Timeline { json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            timeline::run(&mut stdout, db.as_ref(), *json)?;
        }
        Some(Commands::Consolidate) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            consolidate::run(&mut stdout, db, Arc::new(SystemClock), config.engine)?;
        }
        Some(Commands::Clear) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            clear::run(&mut stdout, db, Arc::new(SystemClock), config.engine)?;
        }
        Some(Commands::Send { message }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            send::run(&mut stdout, db, Arc::new(SystemClock), config.engine, message)?;
        }
        Some(Commands::Replay { script, json }) => {
            // Replay runs in memory; only the engine settings are needed.
            let config = Config::load_from(cli.config.as_deref())
                .context("failed to load configuration")?;
            let script = std::fs::read_to_string(script)
                .with_context(|| format!("failed to read {}", script.display()))?;
            replay::run(&mut stdout, &script, config.engine, *json)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
