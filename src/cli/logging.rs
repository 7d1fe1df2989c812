//! Log output and progress bars.
//!
//! On a terminal, compact log lines share stderr with the fetch and compile progress bars
//! drawn by `tracing-indicatif`. Anywhere else there are no progress bars and every event
//! is written as a JSON line through a non-blocking stderr writer.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::style::ProgressStyle;
use tracing_subscriber::filter::{Directive, EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Statics
//================================================================================================

/// Whether ANSI escape codes may be written.
pub static ANSI: AtomicBool = AtomicBool::new(true);

/// Dependencies of the HTTP transport that are too chatty below `warn`.
const NOISY: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

//================================================================================================
// Modules
//================================================================================================

/// ANSI escape codes for styling terminal output.
pub mod ansi {
    /// Magenta text.
    pub const MAGENTA: &str = "\x1b[35m";
    /// Reset styling.
    pub const RESET: &str = "\x1b[0m";
}

//================================================================================================
// Macros
//================================================================================================

/// Logs a fatal error.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {{
        use $crate::cli::logging::{ANSI, ansi};
        let ansi = ANSI.load(std::sync::atomic::Ordering::SeqCst);
        tracing::error!(
            fatal = true,
            "{}FATAL{} {}",
            if ansi { ansi::MAGENTA } else { "" },
            if ansi { ansi::RESET } else { "" },
            $error
        );
    }};
}

//================================================================================================
// Impls
//================================================================================================

impl LogArgs {
    /// The maximum level to log at.
    pub fn level(&self) -> LevelFilter {
        match self.quiet {
            0 => {},
            1 => return LevelFilter::WARN,
            _ => return LevelFilter::ERROR,
        }
        let from_env = std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .and_then(|v| LevelFilter::from_str(&v).ok());
        from_env.unwrap_or(match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Installs the global subscriber; keep the guard alive until exit to flush JSON output.
pub fn init_global_subscriber(args: LogArgs) -> WorkerGuard {
    let level = args.level();
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    if std::io::stderr().is_terminal() {
        let mut progress = IndicatifLayer::new();
        if let Ok(style) = ProgressStyle::with_template("{span_child_prefix}{spinner} {wide_msg}") {
            progress = progress.with_progress_style(style);
        }
        let fmt = fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(progress.get_stderr_writer())
            .compact()
            .with_filter(filter(level));
        // no bars at all when only warnings and errors are wanted
        let progress = progress.with_filter(if level >= LevelFilter::INFO {
            LevelFilter::TRACE
        } else {
            LevelFilter::OFF
        });
        tracing_subscriber::registry().with(fmt).with(progress).init();
    } else {
        ANSI.store(false, Ordering::SeqCst);
        let fmt = fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(non_blocking)
            .with_filter(filter(level));
        tracing_subscriber::registry().with(fmt).init();
    }

    tracing::trace!(%level, "logging initialized");
    guard
}

/// `RUST_LOG` plus `level`, with the HTTP stack held at `warn` unless named explicitly.
fn filter(level: LevelFilter) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    let explicit = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    for target in NOISY.iter().filter(|t| !explicit.contains(**t)) {
        if let Ok(directive) = Directive::from_str(&format!("{target}=warn")) {
            filter = filter.add_directive(directive);
        }
    }
    filter
}
