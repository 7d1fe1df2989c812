//! The `deploy` subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use script::Builder;
use script::build::Error;

/// The `deploy` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// The script to deploy
    script: PathBuf,
    /// The directory receiving the archive and its libraries
    dir: PathBuf,
}

pub(super) async fn run(config: Config, args: Args) -> Result<ExitCode> {
    let Args { script, dir } = args;
    let result = tokio::task::spawn_blocking(move || -> Result<_> {
        let builder = Builder::new(&config)?;
        Ok(builder.deploy(&script, &dir))
    })
    .await??;

    match result {
        Ok(jar) => {
            println!("{}", jar.display());
            Ok(ExitCode::SUCCESS)
        },
        Err(Error::Failed {
            exit_code,
            diagnostics,
        }) => Ok(super::report_failure(exit_code, &diagnostics)),
        Err(e) => Err(e).context("could not deploy"),
    }
}
