use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "jellysweep",
    version,
    about = "Automates lifecycle cleanup of a self-hosted media library."
)]
pub struct Cli {
    /// Set the log level
    #[clap(short, long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: log::LevelFilter,
    /// Path to the config file
    #[clap(short, long)]
    pub config: PathBuf,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scheduler and the HTTP API until terminated.
    Serve,
    /// Run a single cleanup pass immediately and exit.
    RunCleanup {
        /// Override the config's `dry_run` setting for this run only.
        #[clap(long)]
        dry_run: Option<bool>,
    },
}
