//! CLI command definitions and dispatch.

mod inspect;
mod save;
mod version;

use boxtar_core::config::LogLevel;
use clap::{Parser, Subcommand};

/// boxtar - deterministic image archives.
#[derive(Parser)]
#[command(name = "boxtar", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Save the images of an OCI layout into a tar archive
    Save(save::SaveArgs),
    /// List the entries of an image archive
    Inspect(inspect::InspectArgs),
    /// Show version information
    Version(version::VersionArgs),
}

impl Cli {
    /// Log level used when `RUST_LOG` is not set.
    ///
    /// Taken from the writer config file of `save`, otherwise `warn`.
    pub fn log_level(&self) -> LogLevel {
        match &self.command {
            Command::Save(args) => args
                .config
                .as_deref()
                .and_then(|path| boxtar_core::WriterConfig::from_file(path).ok())
                .map(|config| config.log_level)
                .unwrap_or(LogLevel::Warn),
            _ => LogLevel::Warn,
        }
    }
}

/// Dispatch a parsed CLI command to its handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Save(args) => save::execute(args).await,
        Command::Inspect(args) => inspect::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
