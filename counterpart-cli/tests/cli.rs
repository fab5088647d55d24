//! CLI integration tests
//!
//! Runs the counterpart binary using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn counterpart() -> Command {
    let mut cmd = Command::cargo_bin("counterpart")
        .expect("Failed to locate counterpart binary - ensure it's built before running tests");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

#[test]
fn test_cli_help() {
    counterpart()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("relay"))
        .stdout(predicate::str::contains("send"));
}

#[test]
fn test_cli_version() {
    counterpart()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("counterpart"));
}

#[test]
fn test_config_prints_defaults_as_json() {
    let output = counterpart()
        .args(["--config", "/dev/null", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["liveness"]["keep_alive_interval_secs"], 15);
    assert_eq!(json["liveness"]["timeout_multiplier"], 2);
    assert_eq!(json["liveness"]["source"], "messages");
    assert_eq!(json["sender"]["kind"], "mesh");
}

#[test]
fn test_config_reads_file() {
    let file = config_file("[relay]\naddress = \"10.1.2.3:9000\"\n\n[sensor]\nkind = \"scripted\"\nscript = [60]\n");

    counterpart()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("10.1.2.3:9000"))
        .stdout(predicate::str::contains("\"scripted\""));
}

#[test]
fn test_invalid_config_fails() {
    let file = config_file("[liveness]\ntimeout_multiplier = 0\n");

    counterpart()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_multiplier"));
}

#[test]
fn test_missing_config_fails() {
    counterpart()
        .args(["--config", "/nonexistent/counterpart.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_send_to_unreachable_relay_fails() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let file = config_file("[relay]\nconnect_timeout_secs = 2\n");

    counterpart()
        .arg("--config")
        .arg(file.path())
        .args(["send", "--relay", &addr.to_string(), "--count", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect to relay"));
}

#[test]
fn test_demo_reports_connection_and_finishes() {
    let file = config_file("[sensor]\ninterval_ms = 100\n");

    counterpart()
        .arg("--config")
        .arg(file.path())
        .args(["--log-level", "warn", "demo", "--seconds", "2"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Connection: no device found"))
        .stdout(predicate::str::contains("Connection: app installed, active"))
        .stdout(predicate::str::contains("bpm"))
        .stdout(predicate::str::contains("Demo finished"));
}

#[test]
fn test_relay_rejects_bad_address() {
    counterpart()
        .args(["relay", "--listen", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to bind relay"));
}
