use figment::Jail;

use super::*;

/// Runs with nothing but a home inside the jail; the jail restores the environment.
fn isolate(jail: &mut Jail) {
    let dir = jail.directory().to_path_buf();
    jail.clear_env();
    jail.set_env("HOME", dir.display());
    jail.set_env("XDG_CONFIG_HOME", dir.display());
}

#[test]
fn defaults() {
    Jail::expect_with(|jail| {
        isolate(jail);
        let config = Config::load().map_err(|e| *e)?;
        assert_eq!(config.repository.url.as_str(), "https://repo1.maven.org/maven2");
        assert_eq!(
            config.repository.local,
            jail.directory().join(".m2/repository")
        );
        assert_eq!(config.mirror(), None);
        assert_eq!(config.fetch.workers, 4);
        assert_eq!(config.compiler.java_home, None);
        Ok(())
    });
}

#[test]
fn inherited_variables_are_ignored() {
    Jail::expect_with(|jail| {
        jail.set_env("M2_LOCAL_REPO", "/inherited/m2");
        jail.set_env("KOTLIN_SCRIPT_FETCH__WORKERS", "9");
        isolate(jail);
        assert!(std::env::var_os("M2_LOCAL_REPO").is_none());
        let config = Config::load().map_err(|e| *e)?;
        assert_eq!(
            config.repository.local,
            jail.directory().join(".m2/repository")
        );
        assert_eq!(config.fetch.workers, 4);
        Ok(())
    });
}

#[test]
fn legacy_variables() {
    Jail::expect_with(|jail| {
        isolate(jail);
        jail.set_env("M2_CENTRAL_REPO", "file:///srv/maven");
        jail.set_env("M2_LOCAL_REPO", "/var/cache/m2");
        jail.set_env("M2_LOCAL_MIRROR", "   ");
        let config = Config::load().map_err(|e| *e)?;
        assert_eq!(config.repository.url.as_str(), "file:///srv/maven");
        assert_eq!(config.repository.local, PathBuf::from("/var/cache/m2"));
        assert_eq!(config.mirror(), None, "blank mirror is ignored");
        Ok(())
    });
}

#[test]
fn prefixed_env_overrides_file_and_legacy() {
    Jail::expect_with(|jail| {
        isolate(jail);
        jail.create_file(
            CONFIG_FILE,
            r#"
            [repository]
            mirror = "/opt/mirror"

            [fetch]
            workers = 2
            "#,
        )?;
        jail.set_env("M2_LOCAL_REPO", "/var/cache/m2");
        jail.set_env("KOTLIN_SCRIPT_REPOSITORY__LOCAL", "/data/repo");
        jail.set_env("KOTLIN_SCRIPT_FETCH__WORKERS", "0");
        let config = Config::load().map_err(|e| *e)?;
        assert_eq!(config.repository.local, PathBuf::from("/data/repo"));
        assert_eq!(config.mirror(), Some(&PathBuf::from("/opt/mirror")));
        assert_eq!(config.fetch.workers, 1, "zero workers is clamped");
        Ok(())
    });
}

#[test]
fn provider_round_trip() -> anyhow::Result<()> {
    let config = Config {
        repository: RepositoryConfig {
            url: Url::parse("https://example.org/m2/")?,
            local: "/tmp/repo".into(),
            mirror: Some("/tmp/mirror".into()),
        },
        fetch: FetchConfig { workers: 3 },
        compiler: CompilerConfig {
            java_home: Some("/usr/lib/jvm/default".into()),
            jvm_target: Some("17".into()),
        },
    };
    assert_eq!(Config::from(config.clone()).ok(), Some(config));
    Ok(())
}
