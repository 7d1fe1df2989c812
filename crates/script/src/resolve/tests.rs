use config::{CompilerConfig, FetchConfig, RepositoryConfig};
use url::Url;

use super::*;
use crate::fetch::FileTransport;

fn write(path: &Path, data: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(path, data)
}

fn config(local: &Path, mirror: Option<&Path>) -> Config {
    Config {
        repository: RepositoryConfig {
            url: Url::parse("file:///nonexistent").unwrap(),
            local: local.into(),
            mirror: mirror.map(Into::into),
        },
        fetch: FetchConfig { workers: 2 },
        compiler: CompilerConfig::default(),
    }
}

#[test]
fn local_artifact_is_resolved_by_stat() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let dep = Dependency::new("g", "a", "1").with_size(3);
    let path = local.path().join(dep.sub_path());
    write(&path, b"abc")?;

    let out = classify(&[dep.clone()], local.path(), None);
    assert_eq!(out.resolved.get(&dep), Some(&path));
    assert!(out.needs_fetch.is_empty());

    let wrong_size = dep.clone().with_size(4);
    let out = classify(&[wrong_size.clone()], local.path(), None);
    assert!(out.resolved.is_empty());
    assert_eq!(out.needs_fetch, vec![wrong_size]);
    Ok(())
}

#[test]
fn verified_mirror_copy() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let mirror = tempfile::tempdir()?;
    let dep = Dependency::new("g", "a", "1")
        .with_sha256(Checksum::of("abc").hex())
        .with_size(3);
    write(&mirror.path().join(dep.sub_path()), b"abc")?;

    let out = classify(&[dep.clone()], local.path(), Some(mirror.path()));
    let target = local.path().join(dep.sub_path());
    assert_eq!(out.resolved.get(&dep), Some(&target));
    assert_eq!(std::fs::read(&target)?, b"abc");
    Ok(())
}

#[test]
fn mirror_size_mismatch_falls_through() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let mirror = tempfile::tempdir()?;
    let dep = Dependency::new("g", "a", "1").with_size(4);
    write(&mirror.path().join(dep.sub_path()), b"abc")?;

    let out = classify(&[dep.clone()], local.path(), Some(mirror.path()));
    assert_eq!(out.needs_fetch, vec![dep.clone()]);
    assert!(!local.path().join(dep.sub_path()).exists());
    Ok(())
}

#[test]
fn mirror_checksum_mismatch_falls_through() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let mirror = tempfile::tempdir()?;
    let dep = Dependency::new("g", "a", "1").with_sha256(Checksum::of("abc").hex());
    write(&mirror.path().join(dep.sub_path()), b"abd")?;

    let out = classify(&[dep.clone()], local.path(), Some(mirror.path()));
    assert_eq!(out.needs_fetch, vec![dep.clone()]);
    let target = local.path().join(dep.sub_path());
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(target.parent().unwrap())?.count(), 0);
    Ok(())
}

#[test]
fn same_artifact_is_fetched_once() {
    let local = tempfile::tempdir().unwrap();
    let compile = Dependency::new("g", "a", "1");
    let runtime = compile.clone().with_scope(crate::Scope::Runtime);
    let out = classify(&[compile.clone(), runtime], local.path(), None);
    assert_eq!(out.needs_fetch, vec![compile]);
}

#[test]
fn resolve_fetches_missing() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let remote = tempfile::tempdir()?;
    let compile = Dependency::new("g", "a", "1").with_sha256(Checksum::of("abc").hex());
    let runtime = compile.clone().with_scope(crate::Scope::Runtime);
    let cached = Dependency::new("g", "b", "1");
    write(&remote.path().join(compile.sub_path()), b"abc")?;
    write(&local.path().join(cached.sub_path()), b"cached")?;

    let resolver = Resolver::with_transport(
        &config(local.path(), None),
        Box::new(FileTransport::new(remote.path())),
    );
    let deps = [compile.clone(), runtime.clone(), cached.clone()];
    let resolved = resolver.resolve(&deps)?;

    let fetched = local.path().join(compile.sub_path());
    assert_eq!(resolved.len(), 3);
    assert_eq!(resolved.get(&compile), Some(&fetched));
    assert_eq!(resolved.get(&runtime), Some(&fetched));
    assert_eq!(resolved.get(&cached), Some(&local.path().join(cached.sub_path())));
    assert_eq!(std::fs::read(&fetched)?, b"abc");
    Ok(())
}

#[test]
fn unresolvable_coordinate_fails() -> anyhow::Result<()> {
    let local = tempfile::tempdir()?;
    let remote = tempfile::tempdir()?;
    let resolver = Resolver::with_transport(
        &config(local.path(), None),
        Box::new(FileTransport::new(remote.path())),
    );
    let result = resolver.resolve(&[Dependency::parse("nowhere:nothing:1.0")?]);
    assert!(matches!(result, Err(fetch::Error::NotFound(_))));
    Ok(())
}
