//! Staging sources into a scratch directory.
//!
//! Includes may climb out of the script's directory with `..`. To keep those references
//! valid the main script is staged together with as many of its parent directories as the
//! deepest climb needs: an include of `../../common/util.kt` keeps two parents, so
//! `/work/app/src/main.kt` lands at `<root>/app/src/main.kt`.
use std::path::{Component, Path, PathBuf};

use super::Error;
use crate::script::Script;

/// Where the sources ended up.
#[derive(Debug, PartialEq, Eq)]
pub struct Staged {
    /// Directory holding the main script; includes are relative to it.
    pub work_dir: PathBuf,
    /// Sources to pass to the compiler, relative to `work_dir`.
    pub sources: Vec<PathBuf>,
}

/// Number of leading `..` components of a normalized relative path.
fn climb(path: &Path) -> usize {
    path.components()
        .take_while(|c| matches!(c, Component::ParentDir))
        .count()
}

/// Writes the main script and its includes below `root`.
///
/// `script_path` is where the main script lives; only its trailing components matter.
pub fn stage(root: &Path, script_path: &Path, script: &Script, includes: &[Script]) -> Result<Staged, Error> {
    let mut depth = 0;
    for inc in includes {
        if inc.path().is_absolute() {
            return Err(Error::InvalidPath(inc.path().into()));
        }
        depth = depth.max(climb(&path_clean::clean(inc.path())));
    }

    let absolute = std::path::absolute(script_path)?;
    let names: Vec<_> = absolute
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    if names.len() < depth + 1 {
        return Err(Error::InvalidPath(script_path.into()));
    }
    let sub_path: PathBuf = names[names.len() - depth - 1..].iter().collect();

    let target = root.join(&sub_path);
    let work_dir = target.parent().unwrap_or(root).to_path_buf();
    std::fs::create_dir_all(&work_dir)?;
    std::fs::write(&target, script.data())?;
    tracing::trace!(path = %target.display(), "staged");

    let mut sources = Vec::new();
    if script_path.extension().is_some_and(|e| e == "kt") {
        sources.push(PathBuf::from(script.file_name()));
    }
    for inc in includes {
        let staged = path_clean::clean(work_dir.join(inc.path()));
        if !staged.starts_with(root) {
            return Err(Error::InvalidPath(inc.path().into()));
        }
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&staged, inc.data())?;
        tracing::trace!(path = %staged.display(), "staged");
        sources.push(inc.path().into());
    }
    Ok(Staged { work_dir, sources })
}
