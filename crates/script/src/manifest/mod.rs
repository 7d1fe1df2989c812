//! # Build Manifests
//!
//! Manifests are line oriented directive streams. In a source file they live in comments
//! starting with `///`; in a produced archive the same grammar records what the archive was
//! built from, so a stored manifest can be parsed with the very same code.
//!
//! ```text
//! ///MAIN=<entry point name>
//! ///INC=<path of an additional source file, relative to the main script>
//! ///DEP=<coordinate>        compile time
//! ///RDEP=<coordinate>       run time only
//! ///PLUGIN=<coordinate>     compiler extension
//! ///COMPILER=<coordinate>   compiler toolchain override
//! ///CARG=<extra compiler argument>
//! ```
//!
//! Stored manifests additionally carry `VERSION`, `SCRIPT`, `CHK` (the checksum of the
//! preceding `SCRIPT` or `INC`), `RC` and `ERROR` lines. Unknown tags are ignored.
//!
//! Serialization is stable: the same manifest always renders to the same bytes, which
//! matters because rendered manifests are compared to decide whether a cache entry is reusable.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::coord::{self, Dependency, Scope};
use crate::script::{self, Checksum, Script};
use crate::DIRECTIVE_PREFIX;

//================================================================================================
// Types
//================================================================================================

/// One validated directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `VERSION`: the tool version that wrote the manifest.
    Version(String),
    /// `SCRIPT`: the file name of the main script.
    Script(PathBuf),
    /// `CHK`: checksum of the preceding script or include.
    Checksum(Checksum),
    /// `INC`: an additional source file.
    Include(PathBuf),
    /// `MAIN`: the entry point name.
    Main(String),
    /// `DEP`, `RDEP`, `PLUGIN` or `COMPILER`; the scope is set on the dependency.
    Dependency(Dependency),
    /// `CARG`: one extra compiler argument.
    CompilerArg(String),
    /// `RC`: the compiler exit code.
    ExitCode(i32),
    /// `ERROR`: one line of compiler diagnostics.
    Error(String),
}

/// A source file as recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Path as declared.
    pub path: PathBuf,
    /// Content checksum, when known.
    pub checksum: Option<Checksum>,
}

/// A parsed build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Version of the tool that produced a stored manifest.
    pub version: Option<String>,
    /// The main script.
    pub script: Source,
    /// Included scripts, in declaration order.
    pub includes: Vec<Source>,
    /// The entry point name.
    pub main: String,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<Dependency>,
    /// Extra compiler arguments.
    pub compiler_args: Vec<String>,
    /// Compiler exit code of a build result.
    pub exit_code: Option<i32>,
    /// Compiler diagnostics of a build result, one entry per line.
    pub diagnostics: Vec<String>,
}

/// Errors arising while reading or writing manifests.
#[derive(Error, Debug)]
pub enum Error {
    /// No `MAIN` directive and no file name to derive one from.
    #[error("missing MAIN in manifest")]
    MissingMain,
    /// A dependency directive carries a malformed coordinate.
    #[error("line {line}: {source}")]
    Coordinate {
        /// One based line number.
        line: usize,
        /// The underlying parse failure.
        #[source]
        source: coord::Error,
    },
    /// A `CHK` directive carries a malformed checksum.
    #[error("line {line}: {source}")]
    Checksum {
        /// One based line number.
        line: usize,
        /// The underlying parse failure.
        #[source]
        source: script::Error,
    },
    /// An `RC` directive is not an integer.
    #[error("line {line}: invalid exit code `{value}`")]
    ExitCode {
        /// One based line number.
        line: usize,
        /// The offending value.
        value: String,
    },
    /// Reading or writing failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

enum Last {
    Script,
    Include(usize),
}

//================================================================================================
// Impls
//================================================================================================

impl Directive {
    /// Parses a single line.
    ///
    /// Returns `None` for lines that are not directives and for unknown tags.
    pub fn parse(line: &str, number: usize) -> Result<Option<Directive>, Error> {
        let Some(body) = line.strip_prefix(DIRECTIVE_PREFIX) else {
            return Ok(None);
        };
        let (tag, value) = body.split_once('=').unwrap_or((body, ""));
        let directive = match tag {
            "VERSION" => Directive::Version(value.trim().into()),
            "SCRIPT" => Directive::Script(value.trim().into()),
            "INC" => Directive::Include(value.trim().into()),
            "MAIN" => Directive::Main(value.trim().into()),
            "CARG" => Directive::CompilerArg(value.into()),
            "ERROR" => Directive::Error(value.into()),
            "CHK" => Directive::Checksum(
                value
                    .parse()
                    .map_err(|source| Error::Checksum { line: number, source })?,
            ),
            "RC" => Directive::ExitCode(value.trim().parse().map_err(|_| Error::ExitCode {
                line: number,
                value: value.into(),
            })?),
            _ => match Scope::from_tag(tag) {
                Some(scope) => Directive::Dependency(
                    Dependency::parse(value)
                        .map_err(|source| Error::Coordinate { line: number, source })?
                        .with_scope(scope),
                ),
                None => return Ok(None),
            },
        };
        Ok(Some(directive))
    }
}

impl Source {
    fn new(path: impl Into<PathBuf>) -> Self {
        Source {
            path: path.into(),
            checksum: None,
        }
    }
}

impl From<&Script> for Source {
    fn from(script: &Script) -> Self {
        Source {
            path: script.path().to_path_buf(),
            checksum: Some(script.checksum()),
        }
    }
}

impl Manifest {
    /// Parses the directives embedded in `bytes`.
    ///
    /// `name_hint` is the file name of the script the bytes came from; it names the main
    /// script unless a `SCRIPT` directive does, and it seeds the default entry point name.
    ///
    /// Dependencies are grouped by [`Scope`], keeping declaration order within each scope.
    pub fn parse(name_hint: &str, bytes: &[u8]) -> Result<Manifest, Error> {
        let text = String::from_utf8_lossy(bytes);
        let mut version = None;
        let mut script = Source::new(name_hint);
        let mut includes: Vec<Source> = Vec::new();
        let mut mains: Vec<String> = Vec::new();
        let mut dependencies = Vec::new();
        let mut compiler_args = Vec::new();
        let mut exit_code = None;
        let mut diagnostics = Vec::new();
        let mut last = Last::Script;

        for (i, line) in text.lines().enumerate() {
            let Some(directive) = Directive::parse(line, i + 1)? else {
                continue;
            };
            match directive {
                Directive::Version(v) => version = Some(v),
                Directive::Script(path) => {
                    script.path = path;
                    last = Last::Script;
                },
                Directive::Checksum(c) => match last {
                    Last::Script => script.checksum = Some(c),
                    Last::Include(idx) => includes[idx].checksum = Some(c),
                },
                Directive::Include(path) => {
                    includes.push(Source::new(path));
                    last = Last::Include(includes.len() - 1);
                },
                Directive::Main(name) => mains.push(name),
                Directive::Dependency(dep) => dependencies.push(dep),
                Directive::CompilerArg(arg) => compiler_args.push(arg),
                Directive::ExitCode(rc) => exit_code = Some(rc),
                Directive::Error(line) => diagnostics.push(line),
            }
        }

        // the order `write_to` renders them in; stable within a scope
        dependencies.sort_by_key(|d: &Dependency| d.scope);

        // only an unambiguous MAIN counts; several fall back to the file name
        let main = match (mains.len() == 1).then(|| mains.remove(0)).filter(|m| !m.is_empty()) {
            Some(main) => main,
            None => default_main(name_hint).ok_or(Error::MissingMain)?,
        };

        Ok(Manifest {
            version,
            script,
            includes,
            main,
            dependencies,
            compiler_args,
            exit_code,
            diagnostics,
        })
    }

    /// Parses the directives of a loaded source script and records its checksum.
    pub fn from_script(script: &Script) -> Result<Manifest, Error> {
        let name = script.file_name();
        let mut manifest = Manifest::parse(&name, script.data())?;
        manifest.script = Source {
            path: name.into(),
            checksum: Some(script.checksum()),
        };
        Ok(manifest)
    }

    /// Reads every include relative to `base`, in declaration order.
    pub fn load_includes(&self, base: &Path) -> io::Result<Vec<Script>> {
        self.includes
            .iter()
            .map(|inc| Script::load_in(base, &inc.path))
            .collect()
    }

    /// Dependencies of a single scope, in declaration order.
    pub fn dependencies_in(&self, scope: Scope) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(move |d| d.scope == scope)
    }

    /// Whether this manifest records a successful build.
    pub fn succeeded(&self) -> bool {
        self.exit_code.unwrap_or(0) == 0
    }

    /// Renders the manifest in its canonical order, every line ending in `\n`.
    pub fn write_to(&self, mut out: impl Write) -> io::Result<()> {
        let tagged = |out: &mut dyn Write, tag: &str, value: &dyn std::fmt::Display| {
            writeln!(out, "{DIRECTIVE_PREFIX}{tag}={value}")
        };
        if let Some(v) = &self.version {
            tagged(&mut out, "VERSION", v)?;
        }
        tagged(&mut out, "SCRIPT", &self.script.path.display())?;
        if let Some(c) = &self.script.checksum {
            tagged(&mut out, "CHK", c)?;
        }
        for inc in &self.includes {
            tagged(&mut out, "INC", &inc.path.display())?;
            if let Some(c) = &inc.checksum {
                tagged(&mut out, "CHK", c)?;
            }
        }
        tagged(&mut out, "MAIN", &self.main)?;
        for scope in Scope::ALL {
            for dep in self.dependencies_in(scope) {
                tagged(&mut out, scope.tag(), dep)?;
            }
        }
        for arg in &self.compiler_args {
            tagged(&mut out, "CARG", arg)?;
        }
        if let Some(rc) = self.exit_code {
            tagged(&mut out, "RC", &rc)?;
        }
        for line in &self.diagnostics {
            tagged(&mut out, "ERROR", line)?;
        }
        out.flush()
    }

    /// The canonical rendering as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut buf);
        buf
    }

    /// Reads a stored manifest, `None` if the file does not exist.
    pub fn load_from_file(path: &Path) -> Result<Option<Manifest>, Error> {
        let Some(bytes) = script::read_optional(path)? else {
            return Ok(None);
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Manifest::parse(&name, &bytes).map(Some)
    }

    /// Writes the manifest to `path` through a temporary sibling and an atomic rename.
    pub fn store_to_file(&self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.write_to(tmp.as_file_mut())?;
        tmp.persist(path).map_err(|e| e.error)?;
        tracing::trace!(path = %path.display(), "stored manifest");
        Ok(())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Derives the entry point name of a script that declares no `MAIN`.
///
/// Only `.kt` files have one: the first character is capitalized, every remaining `.` becomes
/// `_` and `Kt` is appended, so `hello.kt` yields `HelloKt`.
pub fn default_main(file_name: &str) -> Option<String> {
    let base = file_name.trim().strip_suffix(".kt")?;
    let mut chars = base.chars();
    let first = chars.next()?;
    let mut name: String = first
        .to_uppercase()
        .chain(chars)
        .map(|c| if c == '.' { '_' } else { c })
        .collect();
    name.push_str("Kt");
    Some(name)
}
