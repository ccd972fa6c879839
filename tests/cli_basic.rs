//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, and each subcommand
//! responds to `--help` with appropriate text.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `mdpress` binary.
fn mdpress() -> Command {
    Command::cargo_bin("mdpress").expect("binary 'mdpress' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    mdpress()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: mdpress"))
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("plugin"));
}

#[test]
fn short_help_flag_shows_usage() {
    mdpress()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: mdpress"));
}

#[test]
fn version_flag_shows_semver() {
    mdpress()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^mdpress \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    mdpress()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: mdpress"));
}

#[test]
fn invalid_subcommand_fails() {
    mdpress()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn convert_help() {
    mdpress()
        .args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Convert a Markdown file"))
        .stdout(predicate::str::contains("<INPUT>"))
        .stdout(predicate::str::contains("--plugin"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn config_help() {
    mdpress()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Show the main configuration"))
        .stdout(predicate::str::contains("--plugin"))
        .stdout(predicate::str::contains("--pure"));
}

#[test]
fn plugin_help() {
    mdpress()
        .args(["plugin", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Inspect registered plugins"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn plugin_list_help() {
    mdpress()
        .args(["plugin", "list", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List every discoverable plugin"));
}

// ─── Subcommand argument validation ──────────────────────────────────────────

#[test]
fn convert_missing_input_fails() {
    mdpress()
        .arg("convert")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<INPUT>"));
}

#[test]
fn config_rejects_unknown_flag() {
    mdpress()
        .args(["config", "--no-such-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}
