//! Copying a build and its dependencies into a self-contained directory.
//!
//! ```text
//! <target>/<script stem>.jar
//! <target>/lib/<artifact>-<version>[-<classifier>]-<sha256>.<type>
//! ```
//!
//! Library names carry a content hash, so an unchanged name never needs to be copied
//! again and anything in `lib/` that is not wanted any more can simply be removed.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{Builder, Error};
use crate::archive;
use crate::compiler::Compiler;
use crate::coord::{Dependency, Scope};
use crate::script::Checksum;

const LIB_DIR: &str = "lib";

impl<C: Compiler> Builder<C> {
    /// Builds `path` if stale and deploys it into `target`, returning the deployed archive.
    pub fn deploy(&self, path: &Path, target: &Path) -> Result<PathBuf, Error> {
        let build = self.compile(path)?;
        if !build.manifest.succeeded() {
            return Err(Error::Failed {
                exit_code: build.manifest.exit_code.unwrap_or(-1),
                diagnostics: build.manifest.diagnostics,
            });
        }

        let by_sub_path: BTreeMap<String, &PathBuf> = build
            .resolved
            .iter()
            .map(|(dep, path)| (dep.sub_path(), path))
            .collect();
        let lib = target.join(LIB_DIR);
        std::fs::create_dir_all(&lib)?;

        let mut wanted = BTreeMap::new();
        let mut class_path = Vec::new();
        for dep in build
            .manifest
            .dependencies
            .iter()
            .filter(|d| matches!(d.scope, Scope::Compile | Scope::Runtime))
        {
            let source = by_sub_path
                .get(&dep.sub_path())
                .ok_or_else(|| Error::NotFound(dep.sub_path().into()))?;
            let name = lib_name(dep, source)?;
            if wanted.insert(name.clone(), (*source).clone()).is_none() {
                class_path.push(format!("{LIB_DIR}/{name}"));
            }
        }
        sync(&lib, &wanted)?;

        let stem = path
            .file_stem()
            .ok_or_else(|| Error::InvalidPath(path.into()))?
            .to_string_lossy();
        let jar = target.join(format!("{stem}.jar"));
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{stem}.jar~"))
            .tempfile_in(target)?;
        archive::relink(&build.archive, tmp.as_file_mut(), &class_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(&jar).map_err(|e| e.error)?;
        tracing::info!(path = %jar.display(), libs = wanted.len(), "deployed");
        Ok(jar)
    }
}

/// `artifact-version[-classifier]-<sha256>.type`, hashing the file when no checksum is declared.
fn lib_name(dep: &Dependency, path: &Path) -> io::Result<String> {
    let hash = match &dep.sha256 {
        Some(sha256) => sha256.clone(),
        None => {
            let mut hasher = Sha256::new();
            io::copy(&mut File::open(path)?, &mut hasher)?;
            Checksum::finish(hasher).hex()
        },
    };
    Ok(match &dep.classifier {
        Some(c) => format!("{}-{}-{}-{}.{}", dep.artifact, dep.version, c, hash, dep.kind),
        None => format!("{}-{}-{}.{}", dep.artifact, dep.version, hash, dep.kind),
    })
}

/// Makes the files in `lib` exactly the `wanted` ones with a sorted merge of both listings.
fn sync(lib: &Path, wanted: &BTreeMap<String, PathBuf>) -> io::Result<()> {
    let mut existing = Vec::new();
    for entry in std::fs::read_dir(lib)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            existing.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    existing.sort();

    let mut existing = existing.into_iter().peekable();
    let mut wanted = wanted.iter().peekable();
    loop {
        let order = match (existing.peek(), wanted.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(have), Some((want, _))) => have.as_str().cmp(want.as_str()),
        };
        match order {
            Ordering::Less => {
                if let Some(stale) = existing.next() {
                    tracing::debug!(name = %stale, "removing stale library");
                    std::fs::remove_file(lib.join(stale))?;
                }
            },
            Ordering::Equal => {
                existing.next();
                wanted.next();
            },
            Ordering::Greater => {
                if let Some((name, source)) = wanted.next() {
                    tracing::debug!(name = %name, "copying library");
                    let mut tmp = tempfile::Builder::new()
                        .prefix(&format!("{name}~"))
                        .tempfile_in(lib)?;
                    io::copy(&mut File::open(source)?, tmp.as_file_mut())?;
                    tmp.persist(lib.join(name)).map_err(|e| e.error)?;
                }
            },
        }
    }
    Ok(())
}
