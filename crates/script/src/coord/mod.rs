//! # Dependency Coordinates
//!
//! A coordinate names one artifact in a repository:
//!
//! ```text
//! group:artifact:version[:classifier][@type][:sha256=hex]
//! ```
//!
//! The `@type` suffix may follow either the version or the classifier; the type defaults
//! to `jar`. A fifth segment is only meaningful when it starts with `sha256=`, anything
//! else is ignored so other digest kinds can be added without breaking older readers.
//!
//! Every coordinate maps to a repository sub-path shared by the local cache, the mirror
//! and the remote repository:
//!
//! ```text
//! group/with/slashes/artifact/version/artifact-version[-classifier].type
//! ```
#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use nom::IResult;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::char;
use nom::combinator::{opt, rest};
use nom::sequence::{pair, preceded};
use thiserror::Error;

/// Artifact type assumed when a coordinate names none.
pub const DEFAULT_TYPE: &str = "jar";

const CHECKSUM_PREFIX: &str = "sha256=";

//================================================================================================
// Types
//================================================================================================

/// The role a dependency plays, which decides the class path it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Part of the compiler toolchain itself.
    Compiler,
    /// A compiler extension.
    Plugin,
    /// Needed at compile time and at run time.
    Compile,
    /// Needed at run time only.
    Runtime,
}

/// A single dependency coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    /// Group id, dot separated.
    pub group: String,
    /// Artifact id.
    pub artifact: String,
    /// Version, used verbatim.
    pub version: String,
    /// Optional classifier appended to the file name.
    pub classifier: Option<String>,
    /// Artifact type, doubling as the file extension.
    pub kind: String,
    /// Lowercase hex sha256 of the artifact, if declared.
    pub sha256: Option<String>,
    /// Expected size in bytes, if known ahead of time.
    pub size: Option<u64>,
    /// How the artifact is used.
    pub scope: Scope,
}

/// Errors arising from coordinate parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Fewer than three `:` separated segments.
    #[error("invalid dependency spec: {0}")]
    Incomplete(String),
    /// A required identifying segment is blank.
    #[error("invalid dependency spec `{spec}`: empty {field}")]
    Empty {
        /// The offending spec.
        spec: String,
        /// Which field was blank.
        field: &'static str,
    },
}

//================================================================================================
// Impls
//================================================================================================

impl Scope {
    /// All scopes in manifest serialization order.
    pub const ALL: [Scope; 4] = [Scope::Compiler, Scope::Plugin, Scope::Compile, Scope::Runtime];

    /// The directive tag declaring a dependency of this scope.
    pub const fn tag(self) -> &'static str {
        match self {
            Scope::Compiler => "COMPILER",
            Scope::Plugin => "PLUGIN",
            Scope::Compile => "DEP",
            Scope::Runtime => "RDEP",
        }
    }

    /// Looks a scope up by its directive tag.
    pub fn from_tag(tag: &str) -> Option<Scope> {
        Scope::ALL.into_iter().find(|s| s.tag() == tag)
    }
}

impl Dependency {
    /// A compile scoped `jar` coordinate with no checksum or size.
    pub fn new(group: impl Into<String>, artifact: impl Into<String>, version: impl Into<String>) -> Self {
        Dependency {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            classifier: None,
            kind: DEFAULT_TYPE.into(),
            sha256: None,
            size: None,
            scope: Scope::Compile,
        }
    }

    /// Parses a coordinate spec, see the [module docs](self) for the grammar.
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() < 3 {
            return Err(Error::Incomplete(spec.into()));
        }

        let (version, mut kind) = typed(parts[2]);
        let classifier = parts.get(3).map(|c| {
            let (classifier, ty) = typed(c);
            if ty.is_some() {
                kind = ty;
            }
            classifier.trim()
        });

        let dep = Dependency {
            group: parts[0].trim().into(),
            artifact: parts[1].trim().into(),
            version: version.trim().into(),
            classifier: classifier.filter(|c| !c.is_empty()).map(Into::into),
            kind: kind
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or(DEFAULT_TYPE)
                .into(),
            sha256: parts.get(4).and_then(|c| checksum(c.trim()).ok()).and_then(|(_, hex)| {
                let hex = hex.trim();
                (!hex.is_empty()).then(|| hex.to_ascii_lowercase())
            }),
            size: None,
            scope: Scope::Compile,
        };

        if dep.group.is_empty() {
            return Err(Error::Empty { spec: spec.into(), field: "group" });
        }
        if dep.artifact.is_empty() {
            return Err(Error::Empty { spec: spec.into(), field: "artifact" });
        }
        Ok(dep)
    }

    /// Renders the coordinate back into its spec, omitting defaults.
    ///
    /// A checksum without a classifier is written behind an empty classifier segment so the
    /// result parses back to the same coordinate.
    pub fn to_spec(&self) -> String {
        let mut spec = format!("{}:{}:{}", self.group, self.artifact, self.version);
        if let Some(classifier) = &self.classifier {
            spec.push(':');
            spec.push_str(classifier);
        }
        if self.kind != DEFAULT_TYPE {
            spec.push('@');
            spec.push_str(&self.kind);
        }
        if let Some(sha256) = &self.sha256 {
            if self.classifier.is_none() {
                spec.push(':');
            }
            spec.push(':');
            spec.push_str(CHECKSUM_PREFIX);
            spec.push_str(sha256);
        }
        spec
    }

    /// The file name of the artifact: `artifact-version[-classifier].type`.
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact, self.version, c, self.kind),
            None => format!("{}-{}.{}", self.artifact, self.version, self.kind),
        }
    }

    /// The repository relative path of the artifact.
    ///
    /// Depends only on group, artifact, version, classifier and type, so declarations of the
    /// same artifact in different scopes share one cache entry.
    pub fn sub_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.file_name()
        )
    }

    /// Returns the coordinate with its scope replaced.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns the coordinate with a declared checksum.
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    /// Returns the coordinate with a known size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl FromStr for Dependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dependency::parse(s)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Splits `name[@type]`.
fn typed(segment: &str) -> (&str, Option<&str>) {
    fn parse(input: &str) -> IResult<&str, (&str, Option<&str>)> {
        pair(take_till(|c| c == '@'), opt(preceded(char('@'), rest)))(input)
    }
    match parse(segment) {
        Ok((_, parsed)) => parsed,
        Err(_) => (segment, None),
    }
}

fn checksum(segment: &str) -> IResult<&str, &str> {
    preceded(tag(CHECKSUM_PREFIX), rest)(segment)
}
