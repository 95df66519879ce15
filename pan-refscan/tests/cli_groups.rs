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
fn groups_reports_roots_loops_and_cross_scope_uses() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"));
    cmd.env("NO_COLOR", "1")
        .arg("groups")
        .arg(fixture("fixtures/panorama-running.set"))
        .assert()
        .success()
        .stdout(predicate::str::contains("address_groups (4) roots=1 max_depth=1"))
        .stdout(predicate::str::contains("- dmz [shared] depth=1 root children=web-servers"))
        .stdout(predicate::str::contains(
            "! address-group 'loop-a' contains itself through loop-a -> loop-b -> loop-a",
        ))
        .stdout(predicate::str::contains("cross_scope (1)"))
        .stdout(predicate::str::contains(
            "- db-access [device-group:HQ] SecurityRule destination db-srv defined in Branch",
        ));
}

#[test]
fn groups_json_matches_text_counts() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"));
    let output = cmd
        .arg("groups")
        .arg(fixture("fixtures/panorama-export.xml"))
        .args(["--format", "json"])
        .output()
        .expect("run groups");
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert!(report["groups"].as_array().is_some());
    assert!(report["cycles"].as_array().is_some());
    assert!(report["max_depth"].as_u64().is_some());
}
