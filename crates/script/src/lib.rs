//! # Script Build Engine
//!
//! This crate contains the dependency resolution, concurrent fetch and incremental build
//! machinery behind `kotlin_script`: single-file programs that declare their own compiler
//! and library dependencies in comment directives and are compiled on demand into a
//! content-addressed cache.
//!
//! ## Layers
//!
//! - [`coord`]: dependency coordinates and their repository sub-paths.
//! - [`script`] and [`manifest`]: source descriptors and the `///` directive format.
//! - [`cache`]: content-derived cache keys and archive locations.
//! - [`resolve`] and [`fetch`]: the local cache gate and the concurrent downloader.
//! - [`build`]: the staleness check, rebuild orchestration and deployment.
//!
//! The external compiler sits behind the [`compiler::Compiler`] trait and progress
//! presentation behind [`log::Progress`], so the engine can be driven without a JVM or a
//! terminal.
#![warn(missing_docs)]

pub mod archive;
pub mod build;
pub mod cache;
pub mod compiler;
pub mod coord;
pub mod fetch;
pub mod log;
pub mod manifest;
pub mod resolve;
pub mod script;
pub mod toolchain;

pub use build::Builder;
pub use coord::{Dependency, Scope};
pub use manifest::Manifest;
pub use resolve::Resolver;
pub use script::{Checksum, Script};

/// Version of this tool, recorded in every manifest it writes and part of every cache path.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix marking a directive line in a source file or stored manifest.
pub const DIRECTIVE_PREFIX: &str = "///";

/// Name of the archive entry holding the result manifest.
pub const METADATA_ENTRY: &str = "kotlin_script.metadata";
