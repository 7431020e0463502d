use clap::{Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(about = "Concurrent task harvester", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the configured job and harvest it with a worker pool
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to $HARVESTER_CONFIG, then config/harvester.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override pool.workers
    #[arg(long)]
    pub workers: Option<NonZeroUsize>,
}
