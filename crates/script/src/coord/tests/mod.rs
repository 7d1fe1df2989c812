use super::*;

#[test]
fn classifier_with_type() {
    let dep = Dependency::parse("group.id:artifact-id:1.2:classifier@tar").unwrap();
    assert_eq!(dep.group, "group.id");
    assert_eq!(dep.artifact, "artifact-id");
    assert_eq!(dep.version, "1.2");
    assert_eq!(dep.classifier.as_deref(), Some("classifier"));
    assert_eq!(dep.kind, "tar");
    assert_eq!(dep.sha256, None);
    assert_eq!(dep.scope, Scope::Compile);
    assert_eq!(dep.sub_path(), "group/id/artifact-id/1.2/artifact-id-1.2-classifier.tar");
}

#[test]
fn type_on_version() {
    let dep = Dependency::parse("org.example:lib:2.0@pom").unwrap();
    assert_eq!(dep.classifier, None);
    assert_eq!(dep.kind, "pom");
    assert_eq!(dep.sub_path(), "org/example/lib/2.0/lib-2.0.pom");
}

#[test]
fn checksum_segment() {
    let dep = Dependency::parse("g:a:1::sha256=ABCDEF").unwrap();
    assert_eq!(dep.classifier, None, "empty classifier is absent");
    assert_eq!(dep.sha256.as_deref(), Some("abcdef"));

    let dep = Dependency::parse("g:a:1:linux:md5=abcdef").unwrap();
    assert_eq!(dep.classifier.as_deref(), Some("linux"));
    assert_eq!(dep.sha256, None, "unknown digest kinds are ignored");
}

#[test]
fn too_few_segments() {
    assert_eq!(
        Dependency::parse("g:a"),
        Err(Error::Incomplete("g:a".into()))
    );
    assert_eq!(
        Dependency::parse("nonsense"),
        Err(Error::Incomplete("nonsense".into()))
    );
}

#[test]
fn blank_identity() {
    assert_eq!(
        Dependency::parse(":a:1"),
        Err(Error::Empty {
            spec: ":a:1".into(),
            field: "group"
        })
    );
}

#[test]
fn spec_round_trip() {
    let deps = [
        Dependency::new("g", "a", "1"),
        Dependency::parse("org.jetbrains.kotlin:kotlin-stdlib:1.9.21").unwrap(),
        Dependency::parse("g.h:a:1:natives-linux").unwrap(),
        Dependency::parse("g:a:1@tar").unwrap(),
        Dependency::new("g", "a", "1").with_sha256("00ff"),
        Dependency::parse("g:a:1@tar::sha256=00ff").unwrap(),
        Dependency::parse("g:a:1:cls@zip:sha256=00ff").unwrap(),
    ];
    for dep in deps {
        let spec = dep.to_spec();
        assert_eq!(Dependency::parse(&spec), Ok(dep), "round trip of {spec}");
    }
}

#[test]
fn spec_omits_defaults() {
    assert_eq!(Dependency::new("g", "a", "1").to_spec(), "g:a:1");
    assert_eq!(
        Dependency::new("g", "a", "1").with_sha256("ff").to_spec(),
        "g:a:1::sha256=ff"
    );
    assert_eq!(
        Dependency::parse("g:a:1:c@tar:sha256=ff").unwrap().to_string(),
        "g:a:1:c@tar:sha256=ff"
    );
}

#[test]
fn sub_path_ignores_scope_and_checksum() {
    let plain = Dependency::new("com.example", "util", "3.1");
    let other = plain
        .clone()
        .with_scope(Scope::Runtime)
        .with_sha256("abc")
        .with_size(12);
    assert_eq!(plain.sub_path(), other.sub_path());
    assert_eq!(plain.sub_path(), "com/example/util/3.1/util-3.1.jar");
}

#[test]
fn scope_tags() {
    for scope in Scope::ALL {
        assert_eq!(Scope::from_tag(scope.tag()), Some(scope));
    }
    assert_eq!(Scope::from_tag("INC"), None);
}
