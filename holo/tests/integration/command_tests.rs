use std::process::Command;

use crate::common::fixtures::{stderr, stdout};
use crate::common::{TestProject, assert_contains, assert_path_exists, init_test_logging};

#[test]
fn test_holo_help_includes_description() {
    init_test_logging();
    crate::test_log!("TEST START: test_holo_help_includes_description");

    let output = Command::new(env!("CARGO_BIN_EXE_holo"))
        .arg("--help")
        .output()
        .expect("Failed to run holo --help");

    assert!(output.status.success(), "holo --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "Hologram Projector");
    assert_contains(&stdout, "repair-headers");
    crate::test_log!("TEST PASS: test_holo_help_includes_description");
}

#[test]
fn test_init_writes_config_and_directories() {
    init_test_logging();
    crate::test_log!("TEST START: test_init_writes_config_and_directories");

    let project = TestProject::new();
    project.init();

    assert_path_exists(&project.project.join("hologram"));
    assert_path_exists(&project.project.join("outside_wall"));
    let config = project.config();
    assert_eq!(config["host_target"], "dev@localhost");
    assert_eq!(config["remote_root"], project.remote.display().to_string());
    assert_eq!(config["transport"], "local");
    crate::test_log!("TEST PASS: test_init_writes_config_and_directories");
}

#[test]
fn test_commands_outside_a_project_report_remediation() {
    init_test_logging();
    crate::test_log!("TEST START: test_commands_outside_a_project_report_remediation");

    let project = TestProject::new();
    let output = project.holo(&["push", "hologram/x.c"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert_contains(&err, "HOLO-E");
    assert_contains(&err, "holo init");
    crate::test_log!("TEST PASS: test_commands_outside_a_project_report_remediation");
}

#[test]
fn test_resolve_prints_report_json() {
    init_test_logging();
    crate::test_log!("TEST START: test_resolve_prints_report_json");

    let project = TestProject::new();
    let target = project.remote.join("src/main.c");
    let root = project.remote.display().to_string();
    let output = project.holo_in(
        &project.remote.join("src"),
        &["resolve", "--full", target.to_str().unwrap(), "--root", &root],
    );
    assert!(output.status.success(), "resolve failed: {}", stderr(&output));

    let report: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("resolve output is not JSON");
    let deps = report["dependencies"].as_array().expect("dependencies array");
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0], project.remote.join("include/api.h").display().to_string());
    assert_eq!(
        report["compile_context"]["file"],
        target.display().to_string()
    );
    assert!(report["warnings"].as_array().is_none_or(|w| w.is_empty()));
    crate::test_log!("TEST PASS: test_resolve_prints_report_json");
}

#[test]
fn test_resolve_mounts_reports_empty_when_all_internal() {
    init_test_logging();
    crate::test_log!("TEST START: test_resolve_mounts_reports_empty_when_all_internal");

    let project = TestProject::new();
    let root = project.remote.display().to_string();
    let output = project.holo_in(&project.remote, &["resolve", "--mounts", "--root", &root]);
    assert!(output.status.success(), "resolve --mounts failed: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["mounts"], serde_json::json!([]));
    crate::test_log!("TEST PASS: test_resolve_mounts_reports_empty_when_all_internal");
}
