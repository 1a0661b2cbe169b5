// ABOUTME: Integration tests for the bulwark CLI commands.
// ABOUTME: Covers help output, init, config discovery errors and the runtime-free catalog commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn bulwark_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("bulwark"))
}

fn write_config(dir: &Path) {
    fs::write(
        dir.join("bulwark.yml"),
        "project: shop\ncomponents: [app]\nstate_dir: state\ncatalog:\n  dir: backups\n",
    )
    .unwrap();
}

#[test]
fn help_shows_commands() {
    bulwark_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("bulwark.yml");

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--project", "storefront"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created bulwark.yml"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("project: storefront"));
    assert!(content.contains("sources:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("bulwark.yml"), "existing: config").unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_is_a_usage_error() {
    let temp_dir = tempfile::tempdir().unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn invalid_config_is_a_usage_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("bulwark.yml"), "project: shop\ncomponents: []\n").unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .assert()
        .code(2);
}

#[test]
fn list_empty_catalog() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No bundles"));

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn list_marks_unreadable_bundles() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());
    fs::create_dir_all(temp_dir.path().join("backups/nightly-20250101T000000Z")).unwrap();
    fs::create_dir_all(temp_dir.path().join("backups/.staging-nightly-20250102T000000Z")).unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly-20250101T000000Z"))
        .stdout(predicate::str::contains("unreadable"))
        .stdout(predicate::str::contains("staging").not());
}

#[test]
fn prune_keeps_the_only_bundle() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());
    let bundle = temp_dir.path().join("backups/nightly-20200101T000000Z");
    fs::create_dir_all(&bundle).unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["prune", "--retention-days", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 0 bundle(s), kept 1"));

    assert!(bundle.exists());
    assert!(!temp_dir.path().join("state/bulwark.lock").exists());
}

#[test]
fn check_missing_bundle_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["check", "--bundle", "nightly-20250101T000000Z"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed verification"));
}

#[test]
fn explicit_config_path_is_used() {
    let temp_dir = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());

    bulwark_cmd()
        .current_dir(elsewhere.path())
        .args(["list", "--config"])
        .arg(temp_dir.path().join("bulwark.yml"))
        .assert()
        .success();
}

#[test]
fn quiet_and_json_conflict() {
    bulwark_cmd()
        .args(["list", "--quiet", "--json"])
        .assert()
        .failure();
}

/// A complete bundle with no artifacts; valid without any runtime.
fn write_empty_bundle(dir: &Path, id: &str) {
    let bundle = dir.join("backups").join(id);
    fs::create_dir_all(&bundle).unwrap();
    fs::write(
        bundle.join("metadata.json"),
        format!(
            r#"{{"id":"{id}","created_at":"2025-01-01T00:00:00Z","status":"complete","artifacts":[]}}"#
        ),
    )
    .unwrap();
}

#[test]
fn declined_restore_stops_before_connecting() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());
    write_empty_bundle(temp_dir.path(), "nightly-20250101T000000Z");

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["restore", "nightly-20250101T000000Z"])
        .write_stdin("n\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Restore nightly-20250101T000000Z"))
        .stderr(predicate::str::contains("was not confirmed"));

    assert!(!temp_dir.path().join("state/bulwark.lock").exists());
}

#[test]
fn restore_of_invalid_bundle_fails_without_prompting() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path());
    fs::create_dir_all(temp_dir.path().join("backups/nightly-20250101T000000Z")).unwrap();

    bulwark_cmd()
        .current_dir(temp_dir.path())
        .args(["restore", "nightly-20250101T000000Z"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed verification"))
        .stderr(predicate::str::contains("[y/N]").not());
}
