//! Source script descriptors and their content checksums.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

const PREFIX: &str = "sha256=";

//================================================================================================
// Types
//================================================================================================

/// A sha256 digest, rendered textually as `sha256=<hex>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

/// An immutable snapshot of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    path: PathBuf,
    checksum: Checksum,
    data: Vec<u8>,
    missing: bool,
}

/// Errors from reading checksums out of text.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The digest kind is not `sha256`.
    #[error("unsupported checksum: {0}")]
    Unsupported(String),
    /// The digest is not 32 bytes of hex.
    #[error("malformed checksum `{0}`")]
    Malformed(String),
}

//================================================================================================
// Impls
//================================================================================================

impl Checksum {
    /// Digest of an in-memory buffer.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Checksum(Sha256::digest(bytes.as_ref()).into())
    }

    /// Finishes a running digest.
    pub fn finish(hasher: Sha256) -> Self {
        Checksum(hasher.finalize().into())
    }

    /// Lowercase hex without the `sha256=` prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this digest matches a declared lowercase or uppercase hex string.
    pub fn matches_hex(&self, hex: &str) -> bool {
        self.hex().eq_ignore_ascii_case(hex.trim())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.hex())
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::Unsupported(s.into()))?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes).map_err(|_| Error::Malformed(s.into()))?;
        Ok(Checksum(bytes))
    }
}

impl Script {
    /// Reads and hashes a file.
    ///
    /// A file that does not exist yields an empty descriptor whose checksum is that of zero
    /// bytes; [`Script::is_missing`] tells the two apart. Any other I/O failure is an error.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let data = read_optional(&path)?;
        Ok(Script::from_contents(path, data))
    }

    /// Reads an include, recording `path` as declared but reading it relative to `base`.
    pub fn load_in(base: &Path, path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let data = read_optional(&base.join(&path))?;
        Ok(Script::from_contents(path, data))
    }

    /// Builds a descriptor from contents already in memory.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Script::from_contents(path.into(), Some(data))
    }

    fn from_contents(path: PathBuf, data: Option<Vec<u8>>) -> Self {
        let missing = data.is_none();
        let data = data.unwrap_or_default();
        Script {
            checksum: Checksum::of(&data),
            path,
            data,
            missing,
        }
    }

    /// The path as given when loading.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name component of [`Script::path`].
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Checksum of the contents.
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// The raw contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the file was absent when loaded.
    pub fn is_missing(&self) -> bool {
        self.missing
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Reads a whole file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
