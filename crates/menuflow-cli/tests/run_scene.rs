use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const SCENE: &str = r#"
[[controllers]]
name = "main"
active = true

[[controllers.overlays]]
kind = "home"
default = true

[[controllers.overlays]]
kind = "settings"

[[steps]]
action = "open"
controller = "main"
overlay = "settings"

[[steps]]
action = "tick"
frames = 40

[[steps]]
action = "snapshot"
"#;

#[test]
fn test_run_scene_prints_snapshot() {
    let dir = tempdir().unwrap();
    let scene_path = dir.path().join("scene.toml");
    fs::write(&scene_path, SCENE).unwrap();

    cargo_bin_cmd!("menuflow")
        .env("MENUFLOW_HOME", dir.path())
        .env_remove("MENUFLOW_LOG")
        .args(["run", scene_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("> open settings on main"))
        .stdout(predicate::str::contains("[home, settings]"));
}

#[test]
fn test_run_unknown_controller_fails_with_step_context() {
    let dir = tempdir().unwrap();
    let scene_path = dir.path().join("scene.toml");
    fs::write(
        &scene_path,
        r#"
[[controllers]]
name = "main"

[[steps]]
action = "activate"
controller = "ghost"
"#,
    )
    .unwrap();

    cargo_bin_cmd!("menuflow")
        .env("MENUFLOW_HOME", dir.path())
        .args(["run", scene_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("step 1 (activate)"))
        .stderr(predicate::str::contains("no controller named 'ghost'"));
}

#[test]
fn test_run_missing_scene_fails() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("menuflow")
        .env("MENUFLOW_HOME", dir.path())
        .args(["run", dir.path().join("missing.toml").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scene"));
}

#[test]
fn test_demo_returns_to_settings() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("menuflow")
        .env("MENUFLOW_HOME", dir.path())
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("[settings, confirm]"))
        .stdout(predicate::str::contains("> back input"))
        .stdout(predicate::str::contains("[hud, pause]"));
}

#[test]
fn test_log_file_receives_logs() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("menuflow.log");

    cargo_bin_cmd!("menuflow")
        .env("MENUFLOW_HOME", dir.path())
        .env("MENUFLOW_LOG", "menuflow_core=debug")
        .args(["--log-file", log_path.to_str().unwrap(), "demo"])
        .assert()
        .success();

    let logs = fs::read_to_string(&log_path).unwrap();
    assert!(logs.contains("open_overlay"));
}
