//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `karakuri`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "karakuri",
    version,
    about = "Static-site asset pipeline with live reload and branch deploys.",
    long_about = None
)]
pub struct CliArgs {
    /// Project root holding `app/` and `dist/`.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub root: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KARAKURI_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Full pipeline: clean the output directory (keeping optimized
    /// images), compile styles, then concatenate assets and optimize
    /// images concurrently.
    Build,

    /// Delete the output directory contents and clear the whole
    /// optimization cache.
    Clean,

    /// Push the output directory to the hosting branch.
    Deploy,

    /// Compile styles, serve the source tree and live-reload on changes.
    /// This is the default when no subcommand is given.
    Dev {
        /// Port for the HTTP server.
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
