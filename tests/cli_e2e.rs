//! End-to-end tests for the `cebcrawl` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_describes_the_tool() {
    Command::cargo_bin("cebcrawl")
        .expect("binary builds")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("exam documents"));
}

#[test]
fn test_version_prints_crate_version() {
    Command::cargo_bin("cebcrawl")
        .expect("binary builds")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_is_an_error() {
    Command::cargo_bin("cebcrawl")
        .expect("binary builds")
        .args(["--config", "/nonexistent/crawler.toml", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("crawler.toml"));
}

#[test]
fn test_unreachable_site_fails_with_partial_report() {
    let data_dir = TempDir::new().expect("failed to create temp dir");
    let config_path = data_dir.path().join("crawler.toml");
    // Port 9 (discard) is closed on CI machines; connection is refused fast
    std::fs::write(
        &config_path,
        format!(
            "base_url = \"http://127.0.0.1:9\"\noutput_dir = \"{}\"\n",
            data_dir.path().join("data").display()
        ),
    )
    .expect("write config");

    Command::cargo_bin("cebcrawl")
        .expect("binary builds")
        .args(["--config", config_path.to_str().expect("utf-8 path"), "--quiet"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("crawl failed"))
        .stdout(predicate::str::contains("fatal:"));
}
