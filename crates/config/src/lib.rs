//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object ([`Config`]) that aggregates
//! settings from the embedded defaults, the user's configuration file and the
//! environment. The value is built exactly once at process start and handed to the
//! resolver and build driver explicitly; there is no global instance.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. compiled-in defaults (`kotlin_script.default.toml`, local repository under `$HOME`)
//! 2. `<config dir>/kotlin_script.toml`
//! 3. the legacy `M2_CENTRAL_REPO`, `M2_LOCAL_REPO` and `M2_LOCAL_MIRROR` variables
//! 4. `KOTLIN_SCRIPT_*` variables, nested with `__` (e.g. `KOTLIN_SCRIPT_FETCH__WORKERS=8`)
//!
//! Blank values are treated as unset.

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Metadata, Profile, Provider};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./kotlin_script.default.toml");

/// Name of the user configuration file inside the platform config directory.
const CONFIG_FILE: &str = "kotlin_script.toml";

/// Legacy environment variables and the configuration keys they populate.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("M2_CENTRAL_REPO", "repository.url"),
    ("M2_LOCAL_REPO", "repository.local"),
    ("M2_LOCAL_MIRROR", "repository.mirror"),
];

//================================================================================================
// Types
//================================================================================================

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where artifacts come from and where they are cached.
    pub repository: RepositoryConfig,
    /// Settings for the concurrent fetch engine.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Settings for the external compiler toolchain.
    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Repository locations.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Base url of the remote repository (`http(s)://` or `file://`).
    pub url: Url,
    /// Root of the local repository, which doubles as the build cache.
    pub local: PathBuf,
    /// Optional read-only mirror consulted before the network.
    #[serde(default)]
    pub mirror: Option<PathBuf>,
}

/// Fetch engine settings.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Number of concurrent download workers.
    pub workers: usize,
}

/// Compiler toolchain settings.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Java installation used to run the compiler; falls back to `JAVA_HOME`.
    #[serde(default)]
    pub java_home: Option<PathBuf>,
    /// Value passed as `-jvm-target`; the compiler's own default when unset.
    #[serde(default)]
    pub jvm_target: Option<String>,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for FetchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Config {
    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default settings,
    /// user-specific configuration files, and environment variables.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Toml::string(DEFAULT_TOML_CONFIG)).merge(Serialized::default(
            "repository.local",
            default_local_repository(),
        ));

        if let Ok(c) = etcetera::choose_base_strategy() {
            fig = fig.merge(Toml::file(c.config_dir().join(CONFIG_FILE)));
        }

        for (var, key) in LEGACY_ENV {
            if let Some(value) = non_blank_var(var) {
                fig = fig.merge(Serialized::default(key, value));
            }
        }

        fig.merge(Env::prefixed("KOTLIN_SCRIPT_").split("__"))
    }

    /// Loads the configuration from the default sources.
    pub fn load() -> Result<Config, Box<figment::Error>> {
        Config::from(Config::figment())
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        let config: Config = Figment::from(provider).extract().map_err(Box::new)?;
        Ok(config.normalized())
    }

    /// The mirror directory, if one is configured and non-blank.
    pub fn mirror(&self) -> Option<&PathBuf> {
        self.repository.mirror.as_ref()
    }

    fn normalized(mut self) -> Self {
        if self
            .repository
            .mirror
            .as_ref()
            .is_some_and(|m| m.as_os_str().to_string_lossy().trim().is_empty())
        {
            self.repository.mirror = None;
        }
        if self.fetch.workers == 0 {
            tracing::warn!("fetch.workers must be positive, using 1");
            self.fetch.workers = 1;
        }
        self
    }
}

impl Provider for Config {
    fn metadata(&self) -> Metadata {
        Metadata::named("kotlin_script config")
    }

    fn data(&self) -> Result<figment::value::Map<Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// `~/.m2/repository`, or a directory under the system temp dir without a home.
fn default_local_repository() -> PathBuf {
    if let Ok(home) = etcetera::home_dir() {
        home.join(".m2").join("repository")
    } else {
        std::env::temp_dir().join("kotlin_script").join("repository")
    }
}

fn non_blank_var(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
