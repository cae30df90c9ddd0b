//! Verdant controller daemon.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use verdant_bin::app;
use verdant_bin::config::Config;
use verdant_bin::logging::init_logging;

/// Verdant controller command-line interface.
#[derive(Parser)]
#[command(name = "verdantd")]
#[command(about = "Autonomous grow-light and air-pump controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "verdant.json", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller
    Start,
    /// Print the persisted device state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::load(&cli.config)?;

    match cli.command {
        Some(Commands::Start) | None => app::run_daemon(config).await?,
        Some(Commands::Status) => app::print_status(&config)?,
    }

    Ok(())
}
