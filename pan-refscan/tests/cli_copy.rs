use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn copy_replace_rewires_groups_and_rules() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"));
    cmd.env("NO_COLOR", "1")
        .arg("copy")
        .arg(fixture("fixtures/panorama-running.set"))
        .args(["--source", "web-srv", "--name", "web-srv-new", "--ip", "10.1.1.11"])
        .args(["--mode", "replace"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# copy web-srv (shared) to web-srv-new (shared)"))
        .stdout(predicate::str::contains(
            "set shared address web-srv-new ip-netmask 10.1.1.11",
        ))
        .stdout(predicate::str::contains(
            "set shared address web-srv-new description \"Public web server\"",
        ))
        .stdout(predicate::str::contains(
            "set shared address-group web-servers static web-srv-new",
        ))
        .stdout(predicate::str::contains(
            "delete shared address-group web-servers static web-srv",
        ))
        .stdout(predicate::str::contains(
            "set device-group HQ address-group loop-b static web-srv-new",
        ))
        .stdout(predicate::str::contains(
            "set device-group HQ pre-rulebase security rules \"Allow Web\" destination web-srv-new",
        ))
        .stdout(predicate::str::contains(
            "delete device-group HQ pre-rulebase security rules \"Allow Web\" destination web-srv",
        ));
}

#[test]
fn copy_json_reports_summary() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"));
    let output = cmd
        .arg("copy")
        .arg(fixture("fixtures/panorama-running.set"))
        .args(["--source", "db-srv", "--name", "db-srv-b", "--ip", "10.1.2.21/32"])
        .args(["--format", "json"])
        .output()
        .expect("run copy");
    assert!(output.status.success());

    let plan: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(plan["mode"], "add");
    assert_eq!(plan["copy"]["scope"], "device-group:Branch");
    assert_eq!(plan["summary"]["address_groups"], 0);
    assert_eq!(plan["summary"]["security_rules"], 0);
    assert_eq!(plan["commands"].as_array().map(Vec::len), Some(1));
}

#[test]
fn copy_with_bad_address_fails() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"));
    cmd.arg("copy")
        .arg(fixture("fixtures/panorama-running.set"))
        .args(["--source", "web-srv", "--name", "x", "--ip", "not-an-ip"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid ip-netmask value 'not-an-ip'"));
}
