//! ---
//! sc_section: "15-testing"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Operator control CLI for the syscheck daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use assert_cmd::Command;

#[test]
fn version_flag_prints_banner() {
    let mut cmd = Command::cargo_bin("syscheckctl").expect("binary built");
    let assert = cmd.arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with("syscheck "), "unexpected banner: {stdout}");
}

#[test]
fn status_without_daemon_fails() {
    let mut cmd = Command::cargo_bin("syscheckctl").expect("binary built");
    // Port 9 (discard) is never serving the API.
    cmd.args(["--endpoint", "http://127.0.0.1:9", "status"])
        .assert()
        .failure();
}
