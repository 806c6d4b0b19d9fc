//! Black-box test of the `--print-config` diagnostic mode: loads a TOML
//! file plus an environment override, prints the resolved configuration,
//! and exits without touching etcd or the control plane.

use std::io::Write;
use std::process::Command;

#[test]
fn print_config_applies_file_and_env_overrides_and_redacts_the_secret() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
        [control_plane]
        url = "https://control.example.com"
        region = "us-east"

        [etcd]
        endpoints = ["http://127.0.0.1:2379"]
        domain_prefix = "/hermes/domains"
        cluster_prefix = "/hermes/clusters"
        instance_prefix = "/hermes/instances"

        [auth]
        access_key = "ak-123"
        secret_key = "super-secret"
        "#
    )
    .unwrap();
    let path = file.path().with_extension("");
    std::fs::rename(file.path(), &path).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_hermes-controller"))
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .env("HERMES_CONTROL_PLANE__POLL_INTERVAL_SECS", "7")
        .output()
        .expect("failed to run hermes-controller");

    std::fs::remove_file(&path).ok();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(printed["control_plane"]["url"], "https://control.example.com");
    assert_eq!(printed["control_plane"]["region"], "us-east");
    assert_eq!(printed["control_plane"]["poll_interval_secs"], 7);
    assert_eq!(printed["control_plane"]["reconcile_interval_secs"], 60);
    assert_eq!(printed["auth"]["access_key"], "ak-123");
    assert_eq!(printed["auth"]["secret_key"], "<redacted>");
    assert_eq!(printed["election"]["prefix"], "/hermes/election");
}
