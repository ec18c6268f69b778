//! Integration tests for the `vitrine` CLI binary.
//!
//! Argument parsing, help output, config handling, and error exit codes,
//! plus a few end-to-end runs against a wiremock backend.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `vitrine` binary with env isolation.
///
/// Clears all `VITRINE_*` env vars and points the config file at
/// `config` so tests never touch the user's real configuration.
fn vitrine_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vitrine");
    cmd.env("VITRINE_CONFIG", config)
        .env("HOME", "/tmp/vitrine-cli-test-nonexistent")
        .env_remove("VITRINE_PROFILE")
        .env_remove("VITRINE_API_URL")
        .env_remove("VITRINE_SESSION")
        .env_remove("VITRINE_OUTPUT")
        .env_remove("VITRINE_INSECURE")
        .env_remove("VITRINE_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn missing_config() -> &'static Path {
    Path::new("/tmp/vitrine-cli-test-nonexistent/config.toml")
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(args: Vec<String>, config: std::path::PathBuf) -> std::process::Output {
    tokio::task::spawn_blocking(move || vitrine_cmd(&config).args(args).output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = vitrine_cmd(missing_config()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    vitrine_cmd(missing_config())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("action")),
        );
}

#[test]
fn test_version_flag() {
    vitrine_cmd(missing_config())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vitrine"));
}

#[test]
fn test_completions_bash() {
    vitrine_cmd(missing_config())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_override() {
    vitrine_cmd(Path::new("/tmp/custom-vitrine.toml"))
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/custom-vitrine.toml"));
}

#[test]
fn test_config_show_redacts_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
[profiles.default]
api_url = "https://admin.example.com/api/"
session = "very-secret-cookie"
"#,
    )
    .unwrap();

    vitrine_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("admin.example.com")
                .and(predicate::str::contains("very-secret-cookie").not()),
        );
}

// ── Errors ──────────────────────────────────────────────────────────

#[test]
fn test_list_without_config_is_usage_error() {
    let output = vitrine_cmd(missing_config())
        .args(["list", "products"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("No API URL configured"));
}

#[test]
fn test_unknown_profile_is_reported() {
    let output = vitrine_cmd(missing_config())
        .args(["--profile", "staging", "list", "products"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("staging"));
}

#[test]
fn test_create_requires_data() {
    let output = vitrine_cmd(missing_config())
        .args(["create", "products"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Against a backend ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_list_prints_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"_id": "p1", "name": "Gold"}, {"_id": "p2", "name": "Silver"}]
        })))
        .mount(&server)
        .await;

    let output = run(
        vec![
            "--api-url".into(),
            format!("{}/api/", server.uri()),
            "--output".into(),
            "json".into(),
            "list".into(),
            "products".into(),
        ],
        missing_config().to_path_buf(),
    )
    .await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let items: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(items.as_array().unwrap().len(), 2);
    assert_eq!(items[1]["name"], "Silver");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_action_prints_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "p1"}])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/products/p1/toggle-visibility"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Product is archived"})),
        )
        .mount(&server)
        .await;

    let output = run(
        vec![
            "--api-url".into(),
            format!("{}/api/", server.uri()),
            "action".into(),
            "products".into(),
            "p1".into(),
            "toggle-visibility".into(),
        ],
        missing_config().to_path_buf(),
    )
    .await;

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Product is archived"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_acknowledged_action_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/products/p1/toggle-visibility"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Visibility updated"
        })))
        .mount(&server)
        .await;

    let output = run(
        vec![
            "--api-url".into(),
            format!("{}/api/", server.uri()),
            "action".into(),
            "products".into(),
            "p1".into(),
            "toggle-visibility".into(),
        ],
        missing_config().to_path_buf(),
    )
    .await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Applied toggle-visibility to p1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthorized_maps_to_auth_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/products/p1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let output = run(
        vec![
            "--api-url".into(),
            format!("{}/api/", server.uri()),
            "delete".into(),
            "products".into(),
            "p1".into(),
        ],
        missing_config().to_path_buf(),
    )
    .await;

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
