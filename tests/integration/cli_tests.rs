//! Integration tests for the CLI binary.
//!
//! Drives the `cdid` binary against a temporary state directory.
//!
//! This test is registered as a [[test]] in the chain-did-cli crate
//! so that CARGO_BIN_EXE_cdid is available.

use std::path::Path;
use std::process::{Command, Output};

/// Get a Command pointing to the `cdid` binary with an isolated home.
fn cdid(home: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cdid"));
    command.arg("--home").arg(home);
    command
}

fn run(home: &Path, args: &[&str]) -> Output {
    cdid(home)
        .args(args)
        .output()
        .expect("failed to execute cdid")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "cdid should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// The DID printed by `cdid init`.
fn init(home: &Path, name: &str) -> String {
    let output = run(home, &["init", "--name", name]);
    assert_success(&output);
    stdout(&output)
        .lines()
        .find_map(|line| line.trim().strip_prefix("DID:").map(|d| d.trim().to_string()))
        .expect("init prints the DID")
}

#[test]
fn cli_responds_to_help() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["--help"]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(
        text.contains("cdid") || text.contains("Usage"),
        "cdid --help output should contain usage information, got: {text}"
    );
}

#[test]
fn cli_responds_to_version() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["--version"]);
    assert_success(&output);
    assert!(stdout(&output).contains("0.1"));
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let home = tempfile::tempdir().unwrap();
    let output = run(home.path(), &["--nonexistent-flag"]);
    assert!(!output.status.success());
}

#[test]
fn init_publishes_and_resolves() {
    let home = tempfile::tempdir().unwrap();
    let did = init(home.path(), "alice");
    assert!(did.starts_with("did:elastos:"));
    assert!(home.path().join("keys/alice.json").exists());
    assert!(home.path().join("ledger.json").exists());

    let output = run(home.path(), &["resolve", &did]);
    assert_success(&output);
    assert!(stdout(&output).contains(&did));

    let output = run(home.path(), &["list"]);
    assert_success(&output);
    assert!(stdout(&output).contains("alice"));

    let again = run(home.path(), &["init", "--name", "alice"]);
    assert!(!again.status.success());
}

#[test]
fn service_update_creates_history() {
    let home = tempfile::tempdir().unwrap();
    let did = init(home.path(), "bob");

    let output = run(
        home.path(),
        &[
            "service",
            "add",
            "--name",
            "bob",
            "--id",
            "vault",
            "--type",
            "Storage",
            "--endpoint",
            "https://vault.example",
        ],
    );
    assert_success(&output);

    let output = run(home.path(), &["show", "bob"]);
    assert_success(&output);
    assert!(stdout(&output).contains("https://vault.example"));

    let output = run(home.path(), &["resolve", &did, "--history"]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("update"));
    assert!(text.contains("create"));
}

#[test]
fn credential_declare_and_revoke() {
    let home = tempfile::tempdir().unwrap();
    let did = init(home.path(), "carol");
    let id = format!("{did}#email");

    let output = run(
        home.path(),
        &[
            "credential",
            "declare",
            "--name",
            "carol",
            "--id",
            "email",
            "--type",
            "EmailCredential",
            "--property",
            "email=carol@example.com",
        ],
    );
    assert_success(&output);

    let output = run(home.path(), &["credential", "list", &did]);
    assert_success(&output);
    assert!(stdout(&output).contains(&id));

    let output = run(home.path(), &["credential", "resolve", &id]);
    assert_success(&output);
    assert!(stdout(&output).contains("carol@example.com"));

    let output = run(
        home.path(),
        &["credential", "revoke", "--name", "carol", "--id", "email"],
    );
    assert_success(&output);

    let output = run(
        home.path(),
        &["credential", "revoke", "--name", "carol", "--id", "email"],
    );
    assert!(!output.status.success());
}

#[test]
fn deactivated_did_cannot_be_updated() {
    let home = tempfile::tempdir().unwrap();
    init(home.path(), "dave");

    let output = run(home.path(), &["deactivate", "--name", "dave"]);
    assert_success(&output);

    let output = run(home.path(), &["show", "dave"]);
    assert_success(&output);
    assert!(stdout(&output).contains("deactivated"));

    let output = run(
        home.path(),
        &[
            "service",
            "add",
            "--name",
            "dave",
            "--id",
            "late",
            "--type",
            "Storage",
            "--endpoint",
            "https://late.example",
        ],
    );
    assert!(!output.status.success());
}
