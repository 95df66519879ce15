use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn refscan() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pan-refscan"))
}

#[test]
fn analyze_reports_direct_indirect_and_groups_from_set_lines() {
    refscan()
        .env("NO_COLOR", "1")
        .arg("analyze")
        .arg(fixture("fixtures/panorama-running.set"))
        .arg("-t")
        .arg("web-srv")
        .assert()
        .success()
        .stdout(predicate::str::contains("target web-srv (defined)"))
        .stdout(predicate::str::contains("- Allow Web [device-group:HQ]"))
        .stdout(predicate::str::contains("field=destination"))
        .stdout(predicate::str::contains("- branch-out [device-group:Branch]"))
        .stdout(predicate::str::contains("via=dmz depth=2"))
        .stdout(predicate::str::contains("- web-servers [shared] depth=1 via=web-srv"))
        .stdout(predicate::str::contains("loop-b -> loop-a -> loop-b"))
        .stdout(predicate::str::contains("- web-srv-old [shared] ip-netmask 10.1.1.10"))
        .stdout(predicate::str::contains("- www-branch [device-group:Branch]"));
}

#[test]
fn analyze_json_matches_whole_names_only() {
    let output = refscan()
        .arg("analyze")
        .arg(fixture("fixtures/panorama-running.set"))
        .arg("-t")
        .arg("web-srv")
        .arg("-t")
        .arg("web")
        .arg("--format")
        .arg("json")
        .output()
        .expect("run analyze");
    assert!(output.status.success());

    let reports: Value = serde_json::from_slice(&output.stdout).expect("json output");
    let reports = reports.as_array().expect("array of reports");
    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0]["target"], "web-srv");
    assert_eq!(reports[0]["defined"], true);
    let direct = reports[0]["direct_rules"].as_array().expect("direct rules");
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0]["source"], "Allow Web");
    assert_eq!(direct[0]["context"], "destination");
    assert_eq!(direct[0]["scope"], "device-group:HQ");

    assert_eq!(reports[1]["target"], "web");
    assert_eq!(reports[1]["defined"], false);
    assert_eq!(reports[1]["direct_rules"].as_array().map(Vec::len), Some(0));
    assert_eq!(reports[1]["address_groups"].as_array().map(Vec::len), Some(0));
}

#[test]
fn analyze_reads_markup_exports() {
    let output = refscan()
        .arg("analyze")
        .arg(fixture("fixtures/panorama-export.xml"))
        .arg("--target")
        .arg("web")
        .arg("--cleanup")
        .arg("--format")
        .arg("json")
        .output()
        .expect("run analyze");
    assert!(output.status.success());

    let reports: Value = serde_json::from_slice(&output.stdout).expect("json output");
    let report = &reports[0];
    assert_eq!(report["direct_rules"][0]["source"], "R1");
    assert_eq!(report["redundant"][0]["name"], "web-dup");
    assert_eq!(report["scope_decision"]["scope"], "shared");
    assert_eq!(report["scope_decision"]["reason"]["rule"], "already-shared");

    let commands: Vec<&str> = report["cleanup"]["commands"]
        .as_array()
        .expect("commands")
        .iter()
        .filter_map(|command| command["text"].as_str())
        .collect();
    assert_eq!(
        commands,
        vec![
            "delete shared address web-dup",
            "set shared address-group servers static [ web db ]",
            "set device-group DG2 post-rulebase security rules R2 destination [ web ]",
        ]
    );
}

#[test]
fn analyze_requires_a_target() {
    refscan()
        .arg("analyze")
        .arg(fixture("fixtures/panorama-running.set"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn analyze_missing_file_fails_with_path() {
    let dir = tempdir().expect("tempdir");
    refscan()
        .arg("analyze")
        .arg(dir.path().join("absent.set"))
        .arg("-t")
        .arg("web")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to load"))
        .stderr(predicate::str::contains("absent.set"));
}

#[test]
fn analyze_timeout_exits_with_cancel_status() {
    refscan()
        .arg("analyze")
        .arg(fixture("fixtures/panorama-running.set"))
        .arg("-t")
        .arg("web-srv")
        .arg("--timeout")
        .arg("0")
        .assert()
        .code(130)
        .stderr(predicate::str::contains("deadline"));
}

#[test]
fn analyze_rejects_invalid_settings_file() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("analyzer.toml");
    fs::write(
        &settings,
        "[[rule_pattern]]\nkind = \"security\"\npattern = 'security\\s+rules\\s+(\\S+'\n",
    )
    .expect("write settings");

    refscan()
        .arg("analyze")
        .arg(fixture("fixtures/panorama-running.set"))
        .arg("-t")
        .arg("web-srv")
        .arg("--config")
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load settings"))
        .stderr(predicate::str::contains("invalid rule pattern"));
}

#[test]
fn analyze_honours_custom_rule_patterns() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("analyzer.toml");
    fs::write(
        &settings,
        "progress_every = 1\n\n[[rule_pattern]]\nkind = \"security\"\npattern = 'policy\\s+(\\S+)'\n",
    )
    .expect("write settings");
    let input = dir.path().join("custom.set");
    fs::write(
        &input,
        "set shared address web ip-netmask 10.0.0.1\nset shared policy P1 source web\n",
    )
    .expect("write input");

    refscan()
        .env("NO_COLOR", "1")
        .arg("analyze")
        .arg(&input)
        .arg("-t")
        .arg("web")
        .arg("--config")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("direct_rules (1)"))
        .stdout(predicate::str::contains("- P1 [shared]"));
}
