//! # Incremental Build Driver
//!
//! Produces a compiled archive for a script, reusing the content-addressed cache whenever
//! that is safe.
//!
//! ## Staleness
//!
//! A cached archive is reused only when its embedded result manifest
//!
//! - exists and records a successful build,
//! - names the same main script checksum,
//! - lists the same include checksums, in order, as the include files hold right now,
//! - and was built with the same compiler class path.
//!
//! Any difference rebuilds the whole archive. The JVM target is part of the archive path,
//! so switching it never picks up bytecode built for another target.
//!
//! ## Rebuilding
//!
//! Sources are staged into a scratch directory that is removed on every exit path, the
//! compiler runs once, and the archive is published by atomic rename. A failed compile
//! still publishes an archive: a placeholder holding only the result manifest with its
//! non-zero exit code, so nobody mistakes it for a usable build.
mod deploy;
pub mod stage;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use config::Config;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::archive;
use crate::cache;
use crate::compiler::{Compiler, CompilerOutput, Invocation, JvmCompiler};
use crate::coord::{Dependency, Scope};
use crate::fetch;
use crate::log;
use crate::manifest::{self, Manifest, Source};
use crate::resolve::Resolver;
use crate::script::Script;
use crate::toolchain;

//================================================================================================
// Types
//================================================================================================

/// Errors that abort a build.
#[derive(Error, Debug)]
pub enum Error {
    /// The script or one of its includes does not exist.
    #[error("no such file: {}", .0.display())]
    NotFound(PathBuf),
    /// A path cannot be mapped into the scratch or cache layout.
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),
    /// The compiler rejected the script.
    #[error("compilation failed with exit code {exit_code}")]
    Failed {
        /// The compiler's exit code.
        exit_code: i32,
        /// The compiler's diagnostics.
        diagnostics: Vec<String>,
    },
    /// The script's directives are malformed.
    #[error(transparent)]
    Manifest(#[from] manifest::Error),
    /// A dependency could not be fetched.
    #[error(transparent)]
    Fetch(#[from] fetch::Error),
    /// An archive could not be read or written.
    #[error(transparent)]
    Archive(#[from] archive::Error),
    /// Local I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The outcome of [`Builder::compile`].
#[derive(Debug)]
pub struct Build {
    /// The result manifest; check [`Manifest::exit_code`] before running the archive.
    pub manifest: Manifest,
    /// Path of the cached archive.
    pub archive: PathBuf,
    /// Whether the compiler ran.
    pub rebuilt: bool,
    /// Local paths of every effective dependency.
    pub resolved: BTreeMap<Dependency, PathBuf>,
}

/// Compiles scripts into the cache.
pub struct Builder<C = JvmCompiler> {
    resolver: Resolver,
    compiler: C,
    force: bool,
}

/// A loaded script with its includes and effective dependency set.
struct Prepared {
    script: Script,
    includes: Vec<Script>,
    manifest: Manifest,
    compiler: Vec<Dependency>,
    dependencies: Vec<Dependency>,
}

//================================================================================================
// Impls
//================================================================================================

impl Builder<JvmCompiler> {
    /// A builder using the repositories and JVM named in `config`.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Builder::with_compiler(
            Resolver::new(config)?,
            JvmCompiler::new(&config.compiler),
        ))
    }
}

impl<C: Compiler> Builder<C> {
    /// A builder with explicit collaborators.
    pub fn with_compiler(resolver: Resolver, compiler: C) -> Self {
        Builder {
            resolver,
            compiler,
            force: false,
        }
    }

    /// Skips the reuse check and always rebuilds.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Builds `path` unless a valid cached archive exists.
    ///
    /// Dependencies are resolved on every call, so a deleted artifact is fetched again even
    /// when the archive itself is reused. A compiler failure is not an error: it is
    /// reported through the exit code of the returned manifest.
    pub fn compile(&self, path: &Path) -> Result<Build, Error> {
        let prepared = self.prepare(path)?;
        let resolved = self.resolver.resolve(&prepared.dependencies)?;

        let key = cache::key(&prepared.script, &prepared.includes);
        let archive_path =
            cache::archive_path(self.resolver.local(), &key, self.compiler.jvm_target());
        let sidecar = cache::metadata_path(self.resolver.local(), &prepared.script.checksum());

        if !self.force {
            if let Some(cached) = self.reusable(&archive_path, &prepared) {
                tracing::debug!(archive = %archive_path.display(), "cache hit");
                cached.store_to_file(&sidecar)?;
                return Ok(Build {
                    manifest: cached,
                    archive: archive_path,
                    rebuilt: false,
                    resolved,
                });
            }
        }

        let manifest = self.rebuild(path, &prepared, &resolved, &archive_path)?;
        manifest.store_to_file(&sidecar)?;
        Ok(Build {
            manifest,
            archive: archive_path,
            rebuilt: true,
            resolved,
        })
    }

    fn prepare(&self, path: &Path) -> Result<Prepared, Error> {
        let script = Script::load(path)?;
        if script.is_missing() {
            return Err(Error::NotFound(path.into()));
        }
        let manifest = Manifest::from_script(&script)?;
        let base = path.parent().unwrap_or(Path::new("."));
        let includes = manifest.load_includes(base)?;
        if let Some(missing) = includes.iter().find(|s| s.is_missing()) {
            return Err(Error::NotFound(base.join(missing.path())));
        }

        let declared: Vec<Dependency> = manifest
            .dependencies
            .iter()
            .cloned()
            .map(toolchain::with_default_version)
            .collect();
        let overrides: Vec<Dependency> = declared
            .iter()
            .filter(|d| d.scope == Scope::Compiler)
            .cloned()
            .collect();
        let compiler = if overrides.is_empty() {
            toolchain::compiler_class_path()
        } else {
            overrides
        };

        let mut dependencies = compiler.clone();
        for runtime in toolchain::runtime_subset(&compiler) {
            let shadowed = declared
                .iter()
                .any(|d| d.scope == Scope::Compile && d.sub_path() == runtime.sub_path());
            if !shadowed {
                dependencies.push(runtime);
            }
        }
        dependencies.extend(declared.into_iter().filter(|d| d.scope != Scope::Compiler));
        dependencies.sort_by_key(|d| d.scope);

        Ok(Prepared {
            script,
            includes,
            manifest,
            compiler,
            dependencies,
        })
    }

    /// The cached manifest, if the archive at `path` may be reused.
    fn reusable(&self, path: &Path, prepared: &Prepared) -> Option<Manifest> {
        let cached = match archive::read_manifest(path) {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!(archive = %path.display(), error = %e, "ignoring unreadable cache entry");
                return None;
            },
        };
        if !cached.succeeded() {
            tracing::debug!(archive = %path.display(), "cached build failed");
            return None;
        }
        if cached.script.checksum != Some(prepared.script.checksum()) {
            return None;
        }
        let current = prepared.includes.iter().map(|s| Some(s.checksum()));
        if !cached.includes.iter().map(|s| s.checksum).eq(current) {
            return None;
        }
        let recorded = cached.dependencies_in(Scope::Compiler).map(Dependency::to_spec);
        if !recorded.eq(prepared.compiler.iter().map(Dependency::to_spec)) {
            tracing::debug!(archive = %path.display(), "compiler changed");
            return None;
        }
        Some(cached)
    }

    fn rebuild(
        &self,
        path: &Path,
        prepared: &Prepared,
        resolved: &BTreeMap<Dependency, PathBuf>,
        archive_path: &Path,
    ) -> Result<Manifest, Error> {
        let scratch = tempfile::Builder::new().prefix("kotlin_script").tempdir()?;
        let src = scratch.path().join("src");
        let classes = scratch.path().join("classes");
        std::fs::create_dir_all(&classes)?;
        let staged = stage::stage(&src, path, &prepared.script, &prepared.includes)?;

        let paths = |scope: Scope| -> Vec<PathBuf> {
            let mut out: Vec<PathBuf> = Vec::new();
            for dep in prepared.dependencies.iter().filter(|d| d.scope == scope) {
                if let Some(p) = resolved.get(dep).filter(|p| !out.contains(p)) {
                    out.push(p.clone());
                }
            }
            out
        };
        let compiler_class_path = paths(Scope::Compiler);
        let plugins = paths(Scope::Plugin);
        let class_path = paths(Scope::Compile);

        let result = if staged.sources.is_empty() {
            CompilerOutput::default()
        } else {
            let span = tracing::info_span!("compile");
            log::set_sub_task(&span, &format!("compiling {}", prepared.script.file_name()));
            let _enter = span.enter();
            self.compiler.compile(&Invocation {
                work_dir: &staged.work_dir,
                sources: &staged.sources,
                compiler_class_path: &compiler_class_path,
                plugins: &plugins,
                class_path: &class_path,
                args: &prepared.manifest.compiler_args,
                output_dir: &classes,
            })?
        };

        let manifest = Manifest {
            version: Some(crate::VERSION.into()),
            script: Source {
                path: prepared.script.file_name().into(),
                checksum: Some(prepared.script.checksum()),
            },
            includes: prepared.includes.iter().map(Source::from).collect(),
            main: prepared.manifest.main.clone(),
            dependencies: prepared.dependencies.clone(),
            compiler_args: prepared.manifest.compiler_args.clone(),
            exit_code: Some(result.exit_code),
            diagnostics: result.diagnostics(),
        };

        let dir = archive_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        if result.exit_code == 0 {
            let runtime: Vec<PathBuf> = [paths(Scope::Compile), paths(Scope::Runtime)].concat();
            let class_path = relative_class_path(dir, &runtime)?;
            archive::pack(&classes, tmp.as_file_mut(), &manifest, &class_path)?;
        } else {
            tracing::warn!(
                script = %path.display(),
                exit_code = result.exit_code,
                "compilation failed"
            );
            archive::placeholder(tmp.as_file_mut(), &manifest)?;
        }
        tmp.persist(archive_path).map_err(|e| e.error)?;
        tracing::info!(archive = %archive_path.display(), "compiled");
        Ok(manifest)
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Class path entries relative to `dir`, `/` separated.
fn relative_class_path(dir: &Path, paths: &[PathBuf]) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    for path in paths {
        let rel = pathdiff::diff_paths(path, dir).ok_or_else(|| Error::InvalidPath(path.clone()))?;
        let entry = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !out.contains(&entry) {
            out.push(entry);
        }
    }
    Ok(out)
}
