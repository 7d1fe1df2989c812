//! The boundary to the external compiler toolchain.
//!
//! A compile run is described by an [`Invocation`] and yields an exit code plus the
//! combined output of the tool. A non-zero exit code is data, not an error: only failing to
//! run the tool at all is reported as `Err`.
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use config::CompilerConfig;

use crate::toolchain;

//================================================================================================
// Types
//================================================================================================

/// Everything the compiler needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Directory the sources are relative to; the compiler runs here.
    pub work_dir: &'a Path,
    /// Source files, relative to `work_dir`.
    pub sources: &'a [PathBuf],
    /// Class path of the compiler itself.
    pub compiler_class_path: &'a [PathBuf],
    /// Compiler plugins.
    pub plugins: &'a [PathBuf],
    /// Compile time class path of the script.
    pub class_path: &'a [PathBuf],
    /// Extra arguments declared by the script.
    pub args: &'a [String],
    /// Directory receiving the class files.
    pub output_dir: &'a Path,
}

/// Result of a compiler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOutput {
    /// Process exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Interleaved stdout and stderr.
    pub output: String,
}

/// Runs the Kotlin compiler on a JVM.
#[derive(Debug, Clone)]
pub struct JvmCompiler {
    java: PathBuf,
    jvm_target: Option<String>,
}

//================================================================================================
// Traits
//================================================================================================

/// Compiles staged sources.
pub trait Compiler {
    /// Runs the compiler to completion.
    fn compile(&self, invocation: &Invocation<'_>) -> io::Result<CompilerOutput>;

    /// The bytecode target, when one is forced; builds for different targets are cached apart.
    fn jvm_target(&self) -> Option<&str> {
        None
    }
}

//================================================================================================
// Impls
//================================================================================================

impl CompilerOutput {
    /// The output split into diagnostic lines.
    pub fn diagnostics(&self) -> Vec<String> {
        self.output.lines().map(String::from).collect()
    }
}

impl JvmCompiler {
    /// A compiler configured from `config`.
    pub fn new(config: &CompilerConfig) -> Self {
        JvmCompiler {
            java: toolchain::java_executable(config),
            jvm_target: config.jvm_target.clone(),
        }
    }

    /// The full command line for `invocation`.
    pub fn command_line(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let mut args = vec![
            self.java.display().to_string(),
            "-Djava.awt.headless=true".into(),
            "-cp".into(),
            join_paths(invocation.compiler_class_path),
            toolchain::COMPILER_MAIN.into(),
        ];
        args.extend(invocation.plugins.iter().map(|p| format!("-Xplugin={}", p.display())));
        if let Some(target) = &self.jvm_target {
            args.extend(["-jvm-target".into(), target.clone()]);
        }
        args.extend(["-no-reflect".into(), "-no-stdlib".into()]);
        args.extend(invocation.args.iter().cloned());
        if !invocation.class_path.is_empty() {
            args.extend(["-cp".into(), join_paths(invocation.class_path)]);
        }
        args.extend(["-d".into(), invocation.output_dir.display().to_string()]);
        args.extend(invocation.sources.iter().map(|s| s.display().to_string()));
        args
    }
}

impl Compiler for JvmCompiler {
    fn compile(&self, invocation: &Invocation<'_>) -> io::Result<CompilerOutput> {
        let args = self.command_line(invocation);
        tracing::debug!(command = %args.join(" "), "compile");

        let mut log = tempfile::tempfile()?;
        let status = Command::new(&args[0])
            .args(&args[1..])
            .current_dir(invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log.try_clone()?)
            .status()?;

        let mut output = Vec::new();
        log.seek(SeekFrom::Start(0))?;
        log.read_to_end(&mut output)?;
        Ok(CompilerOutput {
            exit_code: status.code().unwrap_or(-1),
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }

    fn jvm_target(&self) -> Option<&str> {
        self.jvm_target.as_deref()
    }
}

//================================================================================================
// Functions
//================================================================================================

fn join_paths(paths: &[PathBuf]) -> String {
    let sep = if cfg!(windows) { ";" } else { ":" };
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_layout() {
        let compiler = JvmCompiler {
            java: "/jdk/bin/java".into(),
            jvm_target: Some("17".into()),
        };
        let invocation = Invocation {
            work_dir: Path::new("/tmp/src"),
            sources: &["main.kt".into(), "inc.kt".into()],
            compiler_class_path: &["/m2/c.jar".into(), "/m2/s.jar".into()],
            plugins: &["/m2/p.jar".into()],
            class_path: &["/m2/s.jar".into()],
            args: &["-Xjsr305=strict".into()],
            output_dir: Path::new("/tmp/classes"),
        };
        insta::assert_snapshot!(compiler.command_line(&invocation).join(" "), @"/jdk/bin/java -Djava.awt.headless=true -cp /m2/c.jar:/m2/s.jar org.jetbrains.kotlin.cli.jvm.K2JVMCompiler -Xplugin=/m2/p.jar -jvm-target 17 -no-reflect -no-stdlib -Xjsr305=strict -cp /m2/s.jar -d /tmp/classes main.kt inc.kt");
    }

    /// A `java` that runs `script` whatever it is asked to do.
    #[cfg(unix)]
    fn fake_java(dir: &Path, script: &str) -> anyhow::Result<JvmCompiler> {
        use std::os::unix::fs::PermissionsExt;
        let java_home = dir.join("jdk");
        std::fs::create_dir_all(java_home.join("bin"))?;
        let java = java_home.join("bin/java");
        std::fs::write(&java, format!("#!/bin/sh\n{script}"))?;
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755))?;
        Ok(JvmCompiler::new(&CompilerConfig {
            java_home: Some(java_home),
            jvm_target: None,
        }))
    }

    #[cfg(unix)]
    fn run(compiler: &JvmCompiler, dir: &Path) -> io::Result<CompilerOutput> {
        compiler.compile(&Invocation {
            work_dir: dir,
            sources: &[],
            compiler_class_path: &[],
            plugins: &[],
            class_path: &[],
            args: &[],
            output_dir: dir,
        })
    }

    #[cfg(unix)]
    #[test]
    fn captures_exit_code_and_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let compiler = fake_java(dir.path(), "echo out\necho err >&2\nexit 3\n")?;
        let result = run(&compiler, dir.path())?;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.diagnostics(), vec!["out".to_string(), "err".to_string()]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_output_is_still_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let compiler = fake_java(dir.path(), "printf 'caf\\351: error\\n' >&2\nexit 1\n")?;
        let result = run(&compiler, dir.path())?;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.diagnostics(), vec!["caf\u{FFFD}: error".to_string()]);
        Ok(())
    }

    #[test]
    fn jvm_target_comes_from_config() {
        let compiler = JvmCompiler::new(&CompilerConfig {
            java_home: Some("/jdk".into()),
            jvm_target: Some("11".into()),
        });
        assert_eq!(Compiler::jvm_target(&compiler), Some("11"));
    }
}
