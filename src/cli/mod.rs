//! Command line interface.
//!
//! Every command loads the [`config::Config`] once and hands it to the engine; the
//! blocking engine calls run on tokio's blocking pool so Ctrl+C stays responsive.
mod commands;
pub mod logging;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
pub use commands::run;
pub use logging::init_global_subscriber;

/// Top level arguments.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Run as if started in DIR
    ///
    /// Relative script, target and metadata paths are resolved against it.
    #[arg(short = 'C', value_name = "DIR", global = true, value_parser = validate_path)]
    working_directory: Option<PathBuf>,

    /// Logging options.
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    command: commands::Commands,
}

/// Verbosity flags shared by every command.
#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// More output: -v shows resolution and cache decisions, -vv every transfer
    ///
    /// `RUST_LOG` takes precedence over this flag.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// Less output: -q hides progress and info lines, -qq everything but errors
    ///
    /// Overrides both `--verbosity` and `RUST_LOG`.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,
}

impl Args {
    /// Switches to the `-C` directory, if one was given.
    pub fn enter_working_directory(&self) -> std::io::Result<()> {
        match &self.working_directory {
            Some(dir) => std::env::set_current_dir(dir),
            None => Ok(()),
        }
    }
}

fn validate_path(path: &str) -> Result<PathBuf, std::io::Error> {
    std::fs::canonicalize(path)
}
