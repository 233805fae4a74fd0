use std::path::PathBuf;

use clap::{Parser, Subcommand};

use finance_loader::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "finance-loader")]
#[command(about = "Loads the IEX institution directory, refreshes quotes and ranks the movers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Loader configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh one batch, persist it and exit
    Run,

    /// Refresh on the configured interval and log rankings until Ctrl-C
    Watch,

    /// Start runs from AUTHORIZED / FORBIDDEN messages read on stdin
    Listen,

    /// Print the top institutions by volume and change percent
    Rank,
}
