//! Content derived cache keys and the locations they map to.
//!
//! Cache entries live in the local repository under the coordinate
//! `org.cikit:kotlin_script_cache:<version>:<key>`, so they share the repository layout of
//! every other artifact. Nothing is ever invalidated: a change to any input produces a new key.
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::coord::Dependency;
use crate::script::{Checksum, Script};

const GROUP: &str = "org.cikit";
const ARTIFACT: &str = "kotlin_script_cache";

/// The cache key of a script and its includes.
///
/// Without includes this is the main script's checksum. Otherwise it is the digest of a
/// canonical listing of every checksum and path in declaration order.
pub fn key(main: &Script, includes: &[Script]) -> Checksum {
    if includes.is_empty() {
        return main.checksum();
    }
    let mut listing = format!("{} {}", main.checksum(), main.file_name());
    for inc in includes {
        let _ = write!(listing, "\n{} {}", inc.checksum(), inc.path().display());
    }
    listing.push('\n');
    Checksum::of(listing)
}

fn entry(classifier: String, kind: &str) -> Dependency {
    let mut dep = Dependency::new(GROUP, ARTIFACT, crate::VERSION);
    dep.classifier = Some(classifier);
    dep.kind = kind.into();
    dep
}

/// Location of the compiled archive for `key` under the local repository.
///
/// Archives compiled for an explicit JVM target are kept apart from the default build and
/// from each other: `kotlin_script_cache-<version>-jvm<target>-sha256=<key>.jar`.
pub fn archive_path(local: &Path, key: &Checksum, jvm_target: Option<&str>) -> PathBuf {
    let classifier = match jvm_target {
        Some(target) => format!("jvm{target}-{key}"),
        None => key.to_string(),
    };
    local.join(entry(classifier, "jar").sub_path())
}

/// Location of the sidecar manifest, keyed by the main script checksum alone.
pub fn metadata_path(local: &Path, main: &Checksum) -> PathBuf {
    local.join(entry(main.to_string(), "metadata").sub_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts(main: &str, incs: &[(&str, &str)]) -> (Script, Vec<Script>) {
        (
            Script::from_bytes("main.kt", main.as_bytes().to_vec()),
            incs.iter()
                .map(|(p, d)| Script::from_bytes(*p, d.as_bytes().to_vec()))
                .collect(),
        )
    }

    #[test]
    fn main_only_key_is_main_checksum() {
        let (main, incs) = scripts("fun main() {}", &[]);
        assert_eq!(key(&main, &incs), main.checksum());
    }

    #[test]
    fn key_is_deterministic() {
        let (main, incs) = scripts("m", &[("a.kt", "a"), ("b.kt", "b")]);
        let (main2, incs2) = scripts("m", &[("a.kt", "a"), ("b.kt", "b")]);
        assert_eq!(key(&main, &incs), key(&main2, &incs2));
    }

    #[test]
    fn key_tracks_every_input() {
        let (main, incs) = scripts("m", &[("a.kt", "a"), ("b.kt", "b")]);
        let base = key(&main, &incs);
        let variants = [
            scripts("m2", &[("a.kt", "a"), ("b.kt", "b")]),
            scripts("m", &[("a.kt", "a2"), ("b.kt", "b")]),
            scripts("m", &[("b.kt", "b"), ("a.kt", "a")]),
            scripts("m", &[("a.kt", "a")]),
            scripts("m", &[("a.kt", "a"), ("b.kt", "b"), ("c.kt", "c")]),
            scripts("m", &[("x/a.kt", "a"), ("b.kt", "b")]),
        ];
        for (main, incs) in variants {
            assert_ne!(key(&main, &incs), base);
        }
    }

    #[test]
    fn canonical_listing() {
        let (main, incs) = scripts("m", &[("inc.kt", "i")]);
        let listing = format!(
            "{} main.kt\n{} inc.kt\n",
            Checksum::of("m"),
            Checksum::of("i")
        );
        assert_eq!(key(&main, &incs), Checksum::of(listing));
    }

    #[test]
    fn layout() {
        let key = Checksum::of("");
        let path = archive_path(Path::new("/repo"), &key, None);
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/repo/org/cikit/kotlin_script_cache/{v}/kotlin_script_cache-{v}-{key}.jar",
                v = crate::VERSION
            ))
        );
        assert_eq!(
            archive_path(Path::new("/repo"), &key, Some("17")),
            PathBuf::from(format!(
                "/repo/org/cikit/kotlin_script_cache/{v}/kotlin_script_cache-{v}-jvm17-{key}.jar",
                v = crate::VERSION
            ))
        );
        assert_eq!(
            metadata_path(Path::new("/repo"), &key).extension(),
            Some(std::ffi::OsStr::new("metadata"))
        );
    }
}
