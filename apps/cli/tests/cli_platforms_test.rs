//! Integration tests for the `braid platforms` command.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_platforms_lists_configured_entries() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(
        &config_path,
        r#"
[platforms.anthropic]
model = "claude-sonnet-4-20250514"
token = "sk-ant-test"

[platforms.ollama]
enabled = false
model = "llama3"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("anthropic"))
        .stdout(predicate::str::contains("claude-sonnet-4-20250514"))
        .stdout(predicate::str::contains("token set"))
        .stdout(predicate::str::contains("disabled"))
        .stdout(predicate::str::contains("no token; set BRAID_OLLAMA_TOKEN"));
}

#[test]
fn test_platforms_without_config_prints_hint() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("No platforms configured"));
}

#[test]
fn test_platforms_rejects_unknown_provider() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(
        &config_path,
        r#"
[platforms.skynet]
model = "t-800"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("platforms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider 'skynet'"));
}

#[test]
fn test_platforms_requires_api_url_for_custom() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(
        &config_path,
        r#"
[platforms.custom]
model = "local-model"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("platforms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires api_url"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("platforms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_malformed_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(&config_path, "platforms = \"not a table\"").unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("platforms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration file"));
}
