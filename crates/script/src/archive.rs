//! # Compiled Archives
//!
//! Build results are jar files: a zip holding the compiler output, the result manifest
//! under [`METADATA_ENTRY`] and a runtime manifest at `META-INF/MANIFEST.MF` naming the entry
//! point and the class path. A failed build is recorded as an archive holding nothing but
//! its result manifest, which carries the non-zero exit code.
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::METADATA_ENTRY;
use crate::manifest::{self, Manifest};

/// Path of the runtime manifest inside an archive.
pub const RUNTIME_MANIFEST: &str = "META-INF/MANIFEST.MF";

const MAX_LINE: usize = 72;

//================================================================================================
// Types
//================================================================================================

/// The main section of a jar runtime manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeManifest {
    attributes: Vec<(String, String)>,
    /// Per-entry sections, kept verbatim.
    trailer: String,
}

/// Errors arising while reading or writing archives.
#[derive(Error, Debug)]
pub enum Error {
    /// The zip container is malformed.
    #[error(transparent)]
    Zip(#[from] ZipError),
    /// The embedded result manifest is malformed.
    #[error(transparent)]
    Manifest(#[from] manifest::Error),
    /// Local I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

//================================================================================================
// Impls
//================================================================================================

impl RuntimeManifest {
    /// Parses manifest text, accepting any line ending and continuation lines.
    pub fn parse(text: &str) -> Self {
        let mut manifest = RuntimeManifest::default();
        let mut lines = text.split_inclusive('\n').peekable();
        while let Some(raw) = lines.next() {
            let line = raw.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                manifest.trailer = lines.collect();
                break;
            }
            if let Some(cont) = line.strip_prefix(' ') {
                if let Some((_, value)) = manifest.attributes.last_mut() {
                    value.push_str(cont);
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                manifest
                    .attributes
                    .push((name.trim().into(), value.strip_prefix(' ').unwrap_or(value).into()));
            }
        }
        manifest
    }

    /// The value of an attribute, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, keeping its position if already present.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.into(), value)),
        }
    }

    /// Removes an attribute.
    pub fn remove(&mut self, name: &str) {
        self.attributes.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Sets `Manifest-Version`, `Main-Class` and `Class-Path`.
    ///
    /// An empty class path removes the attribute.
    pub fn configure(&mut self, main: &str, class_path: &[String]) {
        if self.get("Manifest-Version").is_none() {
            self.attributes.insert(0, ("Manifest-Version".into(), "1.0".into()));
        }
        self.set("Main-Class", main);
        if class_path.is_empty() {
            self.remove("Class-Path");
        } else {
            self.set("Class-Path", class_path.join(" "));
        }
    }

    /// Renders the manifest with `\r\n` line endings, wrapping lines at 72 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in &self.attributes {
            let line = format!("{name}: {value}");
            let mut rest = line.as_str();
            let mut limit = MAX_LINE;
            loop {
                let cut = floor_char_boundary(rest, limit);
                out.push_str(&rest[..cut]);
                out.push_str("\r\n");
                rest = &rest[cut..];
                if rest.is_empty() {
                    break;
                }
                out.push(' ');
                limit = MAX_LINE - 1;
            }
        }
        out.push_str("\r\n");
        out.push_str(&self.trailer);
        out.into_bytes()
    }
}

//================================================================================================
// Functions
//================================================================================================

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Largest index `<= max` that falls on a char boundary, but at least one char.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        s.chars().next().map_or(s.len(), char::len_utf8)
    } else {
        cut
    }
}

/// Files below `root`, as sorted `/` separated relative names.
fn walk(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    fn visit(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit(root, &path, out)?;
            } else if let Some(rel) = pathdiff::diff_paths(&path, root) {
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((name, path));
            }
        }
        Ok(())
    }
    let mut out = Vec::new();
    visit(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

/// Packs the compiler output in `classes` into a jar.
///
/// The result manifest is embedded and the runtime manifest, whether produced by the
/// compiler or not, is updated with the entry point and `class_path`.
pub fn pack<W: Write + Seek>(
    classes: &Path,
    out: W,
    manifest: &Manifest,
    class_path: &[String],
) -> Result<W, Error> {
    let files = walk(classes)?;
    let mut runtime = match files.iter().find(|(name, _)| name == RUNTIME_MANIFEST) {
        Some((_, path)) => RuntimeManifest::parse(&std::fs::read_to_string(path)?),
        None => RuntimeManifest::default(),
    };
    runtime.configure(&manifest.main, class_path);

    let mut zip = ZipWriter::new(out);
    zip.add_directory("META-INF/", options())?;
    zip.start_file(RUNTIME_MANIFEST, options())?;
    zip.write_all(&runtime.to_bytes())?;
    zip.start_file(METADATA_ENTRY, options())?;
    manifest.write_to(&mut zip)?;

    for (name, path) in files {
        if name == RUNTIME_MANIFEST || name == METADATA_ENTRY {
            continue;
        }
        zip.start_file(name, options())?;
        io::copy(&mut File::open(&path)?, &mut zip)?;
    }
    Ok(zip.finish()?)
}

/// Writes the archive standing in for a failed build.
pub fn placeholder<W: Write + Seek>(out: W, manifest: &Manifest) -> Result<W, Error> {
    let mut zip = ZipWriter::new(out);
    zip.start_file(METADATA_ENTRY, options())?;
    manifest.write_to(&mut zip)?;
    Ok(zip.finish()?)
}

/// Reads the result manifest of an archive.
///
/// A missing archive, or one without a manifest, yields `None`.
pub fn read_manifest(path: &Path) -> Result<Option<Manifest>, Error> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut archive = ZipArchive::new(file)?;
    let mut entry = match archive.by_name(METADATA_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(Manifest::parse(METADATA_ENTRY, &bytes)?))
}

/// Copies an archive, replacing the `Class-Path` of its runtime manifest.
pub fn relink<W: Write + Seek>(source: &Path, out: W, class_path: &[String]) -> Result<W, Error> {
    let mut archive = ZipArchive::new(File::open(source)?)?;
    let mut zip = ZipWriter::new(out);
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.name() != RUNTIME_MANIFEST {
            zip.raw_copy_file(entry)?;
            continue;
        }
        drop(entry);
        let mut text = String::new();
        archive.by_index(i)?.read_to_string(&mut text)?;
        let mut runtime = RuntimeManifest::parse(&text);
        if class_path.is_empty() {
            runtime.remove("Class-Path");
        } else {
            runtime.set("Class-Path", class_path.join(" "));
        }
        zip.start_file(RUNTIME_MANIFEST, options())?;
        zip.write_all(&runtime.to_bytes())?;
    }
    Ok(zip.finish()?)
}

/// Reads the runtime manifest of an archive.
pub fn read_runtime_manifest(path: &Path) -> Result<Option<RuntimeManifest>, Error> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut text = String::new();
    match archive.by_name(RUNTIME_MANIFEST) {
        Ok(mut entry) => entry.read_to_string(&mut text)?,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(RuntimeManifest::parse(&text)))
}
