mod compile;
mod deploy;
mod fetch;

use std::process::ExitCode;

use anyhow::Context;
use clap::Subcommand;
use config::Config;

use super::Args;

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Compile a script into the local cache.
    ///
    /// The script's dependencies are resolved first, fetching whatever
    /// the local repository lacks. The compiler only runs when no valid
    /// cached archive exists for the current contents of the script and
    /// its includes. The path of the cached archive is printed.
    #[command(verbatim_doc_comment)]
    Compile(compile::Args),
    /// Deploy a compiled script into a directory.
    ///
    /// Writes `<script>.jar` and a `lib/` directory holding every
    /// dependency under a content-hashed name. Libraries that are no
    /// longer referenced are removed.
    #[command(verbatim_doc_comment)]
    Deploy(deploy::Args),
    /// Fetch coordinates into the local repository.
    ///
    /// Each coordinate has the form
    /// `group:artifact:version[:classifier][@type][:sha256=<hex>]`.
    #[command(verbatim_doc_comment)]
    Fetch(fetch::Args),
}

/// Runs the selected command, returning the process exit code.
pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = Config::load().context("could not load configuration")?;
    tracing::debug!(
        repository = %config.repository.url,
        local = %config.repository.local.display(),
        "configuration loaded"
    );
    match args.command {
        Commands::Compile(args) => compile::run(config, args).await,
        Commands::Deploy(args) => deploy::run(config, args).await,
        Commands::Fetch(args) => fetch::run(config, args).await,
    }
}

/// Relays compiler diagnostics and converts its exit code for the process.
fn report_failure(exit_code: i32, diagnostics: &[String]) -> ExitCode {
    for line in diagnostics {
        eprintln!("{line}");
    }
    ExitCode::from(u8::try_from(exit_code).ok().filter(|c| *c != 0).unwrap_or(1))
}
