use std::fs;

use crate::common::fixtures::{stderr, stdout};
use crate::common::{
    TestProject, assert_contains, assert_path_exists, assert_read_only, init_test_logging,
};

#[test]
fn test_pull_projects_file_and_writes_local_database() {
    init_test_logging();
    crate::test_log!("TEST START: test_pull_projects_file_and_writes_local_database");

    let project = TestProject::new();
    project.init();
    let stale = project.wall(&project.remote.join("src/main.c"));
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "stale").unwrap();

    let output = project.holo(&["pull", "src/main.c"]);
    assert!(output.status.success(), "pull failed: {}", stderr(&output));
    assert_contains(&stdout(&output), "Updated compile_commands.json");

    let local = project.hologram("src/main.c");
    assert_path_exists(&local);
    assert!(!stale.exists(), "wall copy of a pulled file must be ghosted");

    let header = project.wall(&project.remote.join("include/api.h"));
    assert_read_only(&header);

    let db: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(project.hologram("compile_commands.json")).unwrap(),
    )
    .unwrap();
    let entry = &db[0];
    assert_eq!(entry["file"], local.display().to_string());
    let args: Vec<String> = serde_json::from_value(entry["arguments"].clone()).unwrap();
    let wall_include = format!("-I{}", header.parent().unwrap().display());
    assert!(args.contains(&wall_include), "missing {wall_include} in {args:?}");
    assert!(args.contains(&"-DMODE=1".to_string()));
    crate::test_log!("TEST PASS: test_pull_projects_file_and_writes_local_database");
}

#[test]
fn test_pull_missing_remote_file_fails() {
    init_test_logging();
    crate::test_log!("TEST START: test_pull_missing_remote_file_fails");

    let project = TestProject::new();
    project.init();
    let output = project.holo(&["pull", "src/nope.c"]);
    assert_eq!(output.status.code(), Some(1));
    assert_contains(&stderr(&output), "nope.c");
    crate::test_log!("TEST PASS: test_pull_missing_remote_file_fails");
}

#[test]
fn test_push_and_retract_round_trip() {
    init_test_logging();
    crate::test_log!("TEST START: test_push_and_retract_round_trip");

    let project = TestProject::new();
    project.init();
    let output = project.holo(&["pull", "src/main.c"]);
    assert!(output.status.success(), "pull failed: {}", stderr(&output));

    let local = project.hologram("src/main.c");
    fs::write(&local, "int main(void) { return 7; }\n").unwrap();
    let output = project.holo(&["push", "hologram/src/main.c"]);
    assert!(output.status.success(), "push failed: {}", stderr(&output));
    assert_eq!(
        fs::read_to_string(project.remote.join("src/main.c")).unwrap(),
        "int main(void) { return 7; }\n"
    );

    let output = project.holo(&["retract", "hologram/src/main.c"]);
    assert!(output.status.success(), "retract failed: {}", stderr(&output));
    assert!(!local.exists());
    let wall = project.wall(&project.remote.join("src/main.c"));
    assert_read_only(&wall);

    let db = fs::read_to_string(project.hologram("compile_commands.json")).unwrap();
    assert!(!db.contains("main.c"), "entry should be dropped: {db}");
    crate::test_log!("TEST PASS: test_push_and_retract_round_trip");
}

#[test]
fn test_push_refuses_outside_wall() {
    init_test_logging();
    crate::test_log!("TEST START: test_push_refuses_outside_wall");

    let project = TestProject::new();
    project.init();
    let output = project.holo(&["pull", "src/main.c"]);
    assert!(output.status.success(), "pull failed: {}", stderr(&output));

    let header = project.wall(&project.remote.join("include/api.h"));
    let output = project.holo(&["push", header.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_contains(&stderr(&output), "outside wall");
    assert_eq!(
        fs::read_to_string(project.remote.join("include/api.h")).unwrap(),
        "int api(void);\n"
    );
    crate::test_log!("TEST PASS: test_push_refuses_outside_wall");
}

#[test]
fn test_build_wait_exit_code_follows_log() {
    init_test_logging();
    crate::test_log!("TEST START: test_build_wait_exit_code_follows_log");

    let project = TestProject::new();
    project.init();
    project.write_remote_log(
        "[RADIO] {\"event\": \"BUILD_START\", \"message\": \"go\"}\n\
         [RADIO] {\"event\": \"BUILD_FAILURE\", \"message\": \"undefined reference\"}\n",
    );

    let output = project.holo(&["build", "--wait"]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    assert_contains(&stdout(&output), "Build triggered");
    assert_path_exists(&project.remote.join(".ddd/run/build.request"));
    assert_eq!(
        project.config()["last_context"],
        project.remote.display().to_string()
    );

    project.write_remote_log("[RADIO] {\"event\": \"BUILD_SUCCESS\", \"message\": \"done\"}\n");
    let output = project.holo(&["build", "--wait"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    crate::test_log!("TEST PASS: test_build_wait_exit_code_follows_log");
}

#[test]
fn test_log_prints_tail() {
    init_test_logging();
    crate::test_log!("TEST START: test_log_prints_tail");

    let project = TestProject::new();
    project.init();
    project.write_remote_log("one\ntwo\nthree\n");

    let output = project.holo(&["log", "-n", "2"]);
    assert!(output.status.success(), "log failed: {}", stderr(&output));
    assert_eq!(stdout(&output), "two\nthree\n");
    crate::test_log!("TEST PASS: test_log_prints_tail");
}

#[test]
fn test_focus_and_context_after_pull() {
    init_test_logging();
    crate::test_log!("TEST START: test_focus_and_context_after_pull");

    let project = TestProject::new();
    project.init();
    let output = project.holo(&["pull", "src/main.c"]);
    assert!(output.status.success(), "pull failed: {}", stderr(&output));

    let output = project.holo(&["focus", "hologram/src/main.c"]);
    assert!(output.status.success(), "focus failed: {}", stderr(&output));
    let clangd = fs::read_to_string(project.hologram(".clangd")).unwrap();
    assert_contains(&clangd, "CompileFlags:");
    assert_contains(&clangd, "\"-DMODE=1\"");
    assert!(!clangd.contains("main.o"));

    let output = project.holo(&["context", "hologram/src/main.c", "Explain api()"]);
    assert!(output.status.success(), "context failed: {}", stderr(&output));
    let md = stdout(&output);
    assert_contains(&md, "Explain api()");
    assert_contains(&md, "- `MODE=1`");
    assert_contains(&md, "return api();");
    crate::test_log!("TEST PASS: test_focus_and_context_after_pull");
}
