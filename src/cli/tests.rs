use clap::{CommandFactory, Parser};
use script::Dependency;

use super::Args;

#[test]
fn fetch_help_matches_the_coordinate_grammar() -> anyhow::Result<()> {
    let cmd = Args::command();
    let fetch = cmd
        .find_subcommand("fetch")
        .ok_or_else(|| anyhow::anyhow!("no fetch command"))?;
    let about = fetch
        .get_long_about()
        .map(ToString::to_string)
        .unwrap_or_default();
    assert!(about.contains("[:classifier][@type][:sha256=<hex>]"), "{about}");

    let sha = "ab".repeat(32);
    let dep: Dependency = format!("org.example:lib:1.0:natives@zip:sha256={sha}").parse()?;
    assert_eq!(dep.classifier.as_deref(), Some("natives"));
    assert_eq!(dep.kind, "zip");
    assert_eq!(dep.sha256, Some(sha));
    Ok(())
}

#[test]
fn arguments_are_consistent() {
    Args::command().debug_assert();
}

#[test]
fn quiet_overrides_verbosity() {
    let args = Args::parse_from(["kotlin_script", "-vv", "-q", "fetch", "g:a:1"]);
    assert_eq!(args.log.level(), tracing_subscriber::filter::LevelFilter::WARN);
}
