//! Horizon Funding - Main Entry Point

use clap::Parser;
use horizon_funding::cli::{cmd_info, cmd_list, cmd_run, Cli, Commands, RunOptions};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "horizon_funding=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { pipeline, params, data_dir, tracking_dir, experiment, no_tracking } => {
            let opts = RunOptions { pipeline, params, data_dir, tracking_dir, experiment, no_tracking };
            cmd_run(&opts)?;
        }
        Commands::List => {
            cmd_list()?;
        }
        Commands::Info { data, separator } => {
            cmd_info(&data, separator)?;
        }
    }

    Ok(())
}
