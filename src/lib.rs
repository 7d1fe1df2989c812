//! kotlin_script, a build tool for single-file Kotlin programs that carry their own
//! dependency declarations.
//!
//! The heavy lifting lives in the `script` crate; this crate only parses the command line,
//! loads the configuration and reports results.

#![warn(missing_docs)]

pub mod cli;
