//! The main entry point for the kotlin_script CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use clap::Parser;
use kotlin_script::cli::{self, Args};

//================================================================================================
// Functions
//================================================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = cli::init_global_subscriber(args.log);

    if let Err(e) = args.enter_working_directory() {
        kotlin_script::fatal!(format!("could not enter working directory: {e}"));
        return ExitCode::FAILURE;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, terminating...");
            ExitCode::FAILURE
        }
        res = cli::run(args) => {
            match res {
                Ok(code) => code,
                Err(e) => {
                    kotlin_script::fatal!(format!("{e:#}"));
                    ExitCode::FAILURE
                },
            }
        }
    }
}
