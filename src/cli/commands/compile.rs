//! The `compile` subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use script::Builder;

//================================================================================================
// Types
//================================================================================================

/// The `compile` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Rebuild even if a valid cached archive exists
    #[arg(short, long)]
    force: bool,
    /// Also write the result manifest to PATH
    #[arg(short = 'M', long = "metadata", value_name = "PATH")]
    metadata: Option<PathBuf>,
    /// The script to compile
    script: PathBuf,
}

//================================================================================================
// Functions
//================================================================================================

pub(super) async fn run(config: Config, args: Args) -> Result<ExitCode> {
    let Args {
        force,
        metadata,
        script,
    } = args;
    let build = tokio::task::spawn_blocking(move || -> Result<_> {
        let builder = Builder::new(&config)?.force(force);
        builder
            .compile(&script)
            .with_context(|| format!("could not compile {}", script.display()))
    })
    .await??;

    if let Some(path) = metadata {
        build
            .manifest
            .store_to_file(&path)
            .with_context(|| format!("could not write {}", path.display()))?;
    }

    match build.manifest.exit_code {
        Some(code) if code != 0 => Ok(super::report_failure(code, &build.manifest.diagnostics)),
        _ => {
            println!("{}", build.archive.display());
            Ok(ExitCode::SUCCESS)
        },
    }
}
