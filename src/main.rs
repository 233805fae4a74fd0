mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use cli::{Cli, Commands};
use finance_loader::app::Loader;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let loader = Loader::from_config_path(&cli.config)
        .with_context(|| format!("failed to start loader from {}", cli.config.display()))?;
    info!("Loader configured from {}.", cli.config.display());

    match cli.command {
        Commands::Run => loader.run_once().await,
        Commands::Watch => loader.watch().await?,
        Commands::Listen => loader.listen().await?,
        Commands::Rank => loader.print_rankings().await?,
    }

    Ok(())
}
