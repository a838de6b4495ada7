//! CLI binary for running and validating Torrent Trench configs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trench_client::ClientManager;
use trench_pipeline::{load_config, CronScheduler, TrenchRunner, TrenchScheduler, ValidatedConfig};
use trench_types::TrenchError;

#[derive(Parser)]
#[command(name = "torrent-trench", version, about = "Scheduled rule pipelines for torrent clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding torrent-trench.json
    #[arg(long, env = "TT_CONFIG_PATH", default_value = "/data", global = true)]
    config_path: PathBuf,

    /// Log level: error, warn, info or debug
    #[arg(
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug"],
        global = true
    )]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every client and run trenches on their schedules (default)
    Run,

    /// Load the config, print any issues, and exit
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&cli.config_path).await?,
        Commands::Validate => cmd_validate(&cli.config_path)?,
    }

    Ok(())
}

/// Load the config, printing every issue and exiting 1 on validation failure.
fn load_or_exit(dir: &Path) -> anyhow::Result<ValidatedConfig> {
    match load_config(dir) {
        Ok(config) => Ok(config),
        Err(TrenchError::Validation(issues)) => {
            eprintln!("Config validation failed with {} issue(s):", issues.len());
            for issue in &issues {
                eprintln!("  {issue}");
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_validate(dir: &Path) -> anyhow::Result<()> {
    let config = load_or_exit(dir)?;
    println!(
        "Config is valid: {} connection(s), {} trench(es)",
        config.connections.len(),
        config.trenches.len()
    );
    Ok(())
}

async fn cmd_run(dir: &Path) -> anyhow::Result<()> {
    tracing::info!("Starting Torrent Trench v{}", env!("CARGO_PKG_VERSION"));

    let config = load_or_exit(dir)?;
    tracing::debug!(version = config.version, "Config loaded");

    let clients = ClientManager::from_connections(&config.connections)?;
    clients.test_connections().await?;

    let runner = Arc::new(TrenchRunner::new(Arc::clone(&config.trenches)));
    let scheduler = Arc::new(TrenchScheduler::new(runner, clients));
    let handles = scheduler.schedule_all(&CronScheduler);

    if handles.is_empty() {
        tracing::warn!("No enabled trenches, nothing will run");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    for handle in &handles {
        handle.cancel();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_level_accepts_known_levels_only() {
        for level in ["error", "warn", "info", "debug"] {
            let cli = Cli::try_parse_from(["torrent-trench", "--log-level", level]).unwrap();
            assert_eq!(cli.log_level, level);
        }
        assert!(Cli::try_parse_from(["torrent-trench", "--log-level", "trace"]).is_err());
        assert!(Cli::try_parse_from(["torrent-trench", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn validate_subcommand_takes_config_path() {
        let cli = Cli::try_parse_from(["torrent-trench", "validate", "--config-path", "/etc/trench"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Validate)));
        assert_eq!(cli.config_path, PathBuf::from("/etc/trench"));
    }
}
