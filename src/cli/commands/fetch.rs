//! The `fetch` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use config::Config;
use script::{Dependency, Resolver};

/// The `fetch` subcommand.
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Coordinates to fetch
    #[arg(required = true)]
    coordinates: Vec<Dependency>,
}

pub(super) async fn run(config: Config, args: Args) -> Result<ExitCode> {
    let coordinates = args.coordinates;
    tokio::task::spawn_blocking(move || -> Result<_> {
        let resolved = Resolver::new(&config)?.resolve(&coordinates)?;
        for dep in &coordinates {
            if let Some(path) = resolved.get(dep) {
                println!("{}", path.display());
            }
        }
        Ok(ExitCode::SUCCESS)
    })
    .await?
}
