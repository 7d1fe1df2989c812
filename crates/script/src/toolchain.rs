//! The built-in Kotlin compiler toolchain.
use std::path::PathBuf;

use config::CompilerConfig;

use crate::coord::{Dependency, Scope};

/// Kotlin release the toolchain is pinned to.
pub const KOTLIN_VERSION: &str = "1.9.21";

/// Group of the Kotlin artifacts; members declared without a version get [`KOTLIN_VERSION`].
pub const KOTLIN_GROUP: &str = "org.jetbrains.kotlin";

/// Entry point of the command line compiler.
pub const COMPILER_MAIN: &str = "org.jetbrains.kotlin.cli.jvm.K2JVMCompiler";

const STDLIB: &str = "kotlin-stdlib";

const COMPILER_CLASS_PATH: [(&str, &str, &str, &str, u64); 7] = [
    (
        KOTLIN_GROUP,
        STDLIB,
        KOTLIN_VERSION,
        "3b479313ab6caea4e5e25d3dee8ca80c302c89ba73e1af4dafaa100f6ef9296a",
        1718945,
    ),
    (
        KOTLIN_GROUP,
        "kotlin-compiler-embeddable",
        KOTLIN_VERSION,
        "46904b3d3f516560a48e0d93d9c7bfc63650b22d9f68f7a37eab5e5c5f3f785a",
        60150107,
    ),
    (
        KOTLIN_GROUP,
        "kotlin-script-runtime",
        KOTLIN_VERSION,
        "1b1c74d476ffa41985b0b95dbe78ea5052061889f8106f1ae6cb5ee17f323f19",
        43279,
    ),
    (
        KOTLIN_GROUP,
        "kotlin-reflect",
        "1.6.10",
        "3277ac102ae17aad10a55abec75ff5696c8d109790396434b496e75087854203",
        3038560,
    ),
    (
        KOTLIN_GROUP,
        "kotlin-daemon-embeddable",
        KOTLIN_VERSION,
        "01152ffb41b076e9c55083c513e1ef05f303cd5a95cedffcb89e124e340df11e",
        398746,
    ),
    (
        "org.jetbrains.intellij.deps",
        "trove4j",
        "1.0.20200330",
        "c5fd725bffab51846bf3c77db1383c60aaaebfe1b7fe2f00d23fe1b7df0a439d",
        572985,
    ),
    (
        "org.jetbrains",
        "annotations",
        "13.0",
        "ace2a10dc8e2d5fd34925ecac03e4988b2c0f851650c94b8cef49ba1bd111478",
        17536,
    ),
];

/// The default compiler class path, in `Compiler` scope.
pub fn compiler_class_path() -> Vec<Dependency> {
    COMPILER_CLASS_PATH
        .iter()
        .map(|(group, artifact, version, sha256, size)| {
            Dependency::new(*group, *artifact, *version)
                .with_sha256(*sha256)
                .with_size(*size)
                .with_scope(Scope::Compiler)
        })
        .collect()
}

/// The part of a compiler class path every script needs at compile and run time.
pub fn runtime_subset(compiler: &[Dependency]) -> Vec<Dependency> {
    compiler
        .iter()
        .filter(|d| d.group == KOTLIN_GROUP && d.artifact == STDLIB)
        .map(|d| d.clone().with_scope(Scope::Compile))
        .collect()
}

/// Fills in the toolchain version for Kotlin artifacts declared without one.
pub fn with_default_version(mut dep: Dependency) -> Dependency {
    if dep.version.trim().is_empty() && dep.group == KOTLIN_GROUP {
        dep.version = KOTLIN_VERSION.into();
    }
    dep
}

/// The `java` executable: configured home, then `JAVA_HOME`, then whatever is on `PATH`.
pub fn java_executable(config: &CompilerConfig) -> PathBuf {
    let home = config.java_home.clone().or_else(|| {
        std::env::var_os("JAVA_HOME")
            .filter(|v| !v.to_string_lossy().trim().is_empty())
            .map(PathBuf::from)
    });
    match home {
        Some(home) => home.join("bin").join("java"),
        None => PathBuf::from("java"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_class_path() {
        let cp = compiler_class_path();
        assert_eq!(cp.len(), 7);
        assert!(cp.iter().all(|d| d.scope == Scope::Compiler && d.sha256.is_some() && d.size.is_some()));
        let runtime = runtime_subset(&cp);
        assert_eq!(runtime.len(), 1);
        assert_eq!(
            runtime[0].sub_path(),
            "org/jetbrains/kotlin/kotlin-stdlib/1.9.21/kotlin-stdlib-1.9.21.jar"
        );
        assert_eq!(runtime[0].scope, Scope::Compile);
    }

    #[test]
    fn blank_kotlin_version() {
        let dep = Dependency::parse("org.jetbrains.kotlin:kotlin-serialization:").unwrap();
        assert_eq!(with_default_version(dep).version, KOTLIN_VERSION);
        let other = Dependency::parse("org.example:lib:").unwrap();
        assert_eq!(with_default_version(other).version, "");
    }

    #[test]
    fn configured_java_home() {
        let config = CompilerConfig {
            java_home: Some("/opt/jdk".into()),
            jvm_target: None,
        };
        assert_eq!(java_executable(&config), PathBuf::from("/opt/jdk/bin/java"));
    }
}
