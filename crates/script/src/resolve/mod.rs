//! # Local Cache Resolver
//!
//! The synchronous gate in front of the fetch engine. Each coordinate is satisfied, in
//! order of preference, by:
//!
//! 1. the local repository, if the artifact exists and matches any declared size;
//! 2. a verified copy from the read-only mirror, published by atomic rename;
//! 3. a download, scheduled with the [`fetch`](crate::fetch) engine.
//!
//! Classification does no network I/O.
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use config::Config;
use sha2::{Digest, Sha256};

use crate::coord::Dependency;
use crate::fetch::{self, Fetcher, Options, Transport};
use crate::log;
use crate::script::Checksum;

//================================================================================================
// Types
//================================================================================================

/// Result of [`classify`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classification {
    /// Coordinates already present locally, with their paths.
    pub resolved: BTreeMap<Dependency, PathBuf>,
    /// Coordinates that must be downloaded, one per sub-path.
    pub needs_fetch: Vec<Dependency>,
}

/// Resolves coordinate sets into local paths, fetching whatever is missing.
pub struct Resolver {
    local: PathBuf,
    mirror: Option<PathBuf>,
    transport: Box<dyn Transport>,
    options: Options,
}

/// Feeds everything written through it into a digest.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

//================================================================================================
// Impls
//================================================================================================

impl Resolver {
    /// A resolver for the repositories named in `config`.
    pub fn new(config: &Config) -> Result<Self, fetch::Error> {
        let transport = fetch::transport::for_url(&config.repository.url)?;
        Ok(Resolver::with_transport(config, transport))
    }

    /// A resolver using an explicit transport for the remote repository.
    pub fn with_transport(config: &Config, transport: Box<dyn Transport>) -> Self {
        Resolver {
            local: config.repository.local.clone(),
            mirror: config.mirror().cloned(),
            transport,
            options: Options {
                workers: config.fetch.workers,
                ..Options::default()
            },
        }
    }

    /// Replaces the fetch tunables.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Root of the local repository.
    pub fn local(&self) -> &Path {
        &self.local
    }

    /// Maps every coordinate to a verified local path.
    ///
    /// Returns only once every missing artifact has been fetched, or with the first fetch
    /// failure.
    pub fn resolve(&self, deps: &[Dependency]) -> Result<BTreeMap<Dependency, PathBuf>, fetch::Error> {
        let Classification {
            mut resolved,
            needs_fetch,
        } = classify(deps, &self.local, self.mirror.as_deref());
        if needs_fetch.is_empty() {
            return Ok(resolved);
        }

        tracing::debug!(count = needs_fetch.len(), "fetching dependencies");
        let fetched = log::with_progress("fetching dependencies", fetch::TOTAL, |progress| {
            Fetcher::new(self.transport.as_ref())
                .with_options(self.options)
                .fetch(&self.local, needs_fetch, progress)
        })?;
        let by_sub_path: BTreeMap<String, PathBuf> = fetched
            .into_iter()
            .map(|(dep, path)| (dep.sub_path(), path))
            .collect();

        for dep in deps {
            if let Some(path) = by_sub_path.get(&dep.sub_path()) {
                resolved.insert(dep.clone(), path.clone());
            }
        }
        Ok(resolved)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Splits `deps` into those satisfied locally and those that must be fetched.
pub fn classify(deps: &[Dependency], local: &Path, mirror: Option<&Path>) -> Classification {
    let mut out = Classification::default();
    let mut scheduled = BTreeSet::new();
    for dep in deps {
        let sub_path = dep.sub_path();
        let target = local.join(&sub_path);
        if present(dep, &target) {
            out.resolved.insert(dep.clone(), target);
            continue;
        }
        if let Some(mirror) = mirror {
            let source = mirror.join(&sub_path);
            match copy_from_mirror(dep, &source, &target) {
                Ok(true) => {
                    tracing::debug!(from = %source.display(), to = %target.display(), "copied from mirror");
                    out.resolved.insert(dep.clone(), target);
                    continue;
                },
                Ok(false) => (),
                Err(e) => {
                    tracing::debug!(path = %source.display(), error = %e, "mirror copy failed");
                },
            }
        }
        if scheduled.insert(sub_path) {
            out.needs_fetch.push(dep.clone());
        }
    }
    out
}

fn present(dep: &Dependency, path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && dep.size.is_none_or(|s| s == meta.len()),
        Err(_) => false,
    }
}

/// Copies an artifact out of the mirror, verifying declared size and checksum.
///
/// Returns `Ok(false)` when the mirror lacks the artifact or holds one that does not verify.
pub fn copy_from_mirror(dep: &Dependency, source: &Path, target: &Path) -> io::Result<bool> {
    let Ok(meta) = std::fs::metadata(source) else {
        return Ok(false);
    };
    if !meta.is_file() || dep.size.is_some_and(|s| s != meta.len()) {
        return Ok(false);
    }

    let dir = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}~", dep.file_name()))
        .tempfile_in(dir)?;
    let mut writer = HashingWriter {
        inner: tmp.as_file_mut(),
        hasher: Sha256::new(),
    };
    io::copy(&mut File::open(source)?, &mut writer)?;
    writer.flush()?;
    let actual = Checksum::finish(writer.hasher);

    if let Some(expected) = &dep.sha256 {
        if !actual.matches_hex(expected) {
            tracing::warn!(path = %source.display(), %actual, "checksum mismatch in mirror");
            return Ok(false);
        }
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(true)
}
