//! Integration tests for the `braid tools` command.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_tools_lists_built_ins() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(&config_path, "").unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("web_search"))
        .stdout(predicate::str::contains("web_fetch"));
}

#[test]
fn test_tools_shows_mcp_server_entries() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("braid.toml");
    std::fs::write(
        &config_path,
        r#"
[mcp.servers.files]
command = "mcp-files"
args = ["--root", "/tmp"]
allowed_tools = ["read_file", "list_directory"]

[mcp.servers.paused]
enabled = false
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("braid-cli").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("MCP servers"))
        .stdout(predicate::str::contains("files"))
        .stdout(predicate::str::contains("command: mcp-files --root /tmp"))
        .stdout(predicate::str::contains("read_file, list_directory"))
        .stdout(predicate::str::contains("disabled"));
}
