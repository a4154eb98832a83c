// Drives the overseer binary the way an operator would

use assert_cmd::Command;
use overseer::config::Config;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write a config file whose state and logs live inside `temp_dir`
fn write_config(temp_dir: &TempDir) -> PathBuf {
    let mut config = Config::with_root(temp_dir.path());
    config.ui.color_output = false;
    config.services.restart_delay = 0;
    config.process.stop_timeout = 2;
    config.process.kill_timeout = 2;
    config.process.restart_settle_ms = 50;

    let path = temp_dir.path().join("overseer.toml");
    config.save(&path).unwrap();
    path
}

fn overseer(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("overseer").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

fn stderr_of_failure(cmd: &mut Command) -> String {
    let output = cmd.assert().failure().code(1).get_output().stderr.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn test_add_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    let added = stdout_of(
        overseer(&config)
            .args(["add", "sleep 30", "--name", "sleeper", "-w"])
            .arg(temp_dir.path()),
    );
    assert!(added.contains("Service added"));
    assert!(added.contains("sleeper"));

    let listed = stdout_of(overseer(&config).arg("list"));
    assert!(listed.contains("sleeper"));
    assert!(listed.contains("stopped"));
    assert!(listed.contains("Total: 1 service(s)"));

    let state = std::fs::read_to_string(temp_dir.path().join("data").join("services.json")).unwrap();
    assert!(state.contains("\"sleeper\""));
}

#[test]
fn test_duplicate_name_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    overseer(&config)
        .args(["add", "sleep 30", "--name", "web"])
        .assert()
        .success();
    let stderr = stderr_of_failure(overseer(&config).args(["add", "sleep 60", "--name", "web"]));
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_unknown_service_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    for command in ["start", "stop", "status", "remove", "logs"] {
        let stderr = stderr_of_failure(overseer(&config).args([command, "ghost"]));
        assert!(
            stderr.contains("Service not found: ghost"),
            "{}: {}",
            command,
            stderr
        );
    }
}

#[test]
fn test_start_status_stop_remove() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    overseer(&config)
        .args(["add", "sleep 30", "--name", "napper", "-w"])
        .arg(temp_dir.path())
        .assert()
        .success();

    let started = stdout_of(overseer(&config).args(["start", "napper"]));
    assert!(started.contains("Service 'napper' started"));

    // Starting again is refused while the process lives
    let stderr = stderr_of_failure(overseer(&config).args(["start", "napper"]));
    assert!(stderr.contains("already running"));

    let status = stdout_of(overseer(&config).args(["status", "napper"]));
    assert!(status.contains("running"));
    assert!(status.contains("sleep 30"));

    // A live service is not removed without --force
    let stderr = stderr_of_failure(overseer(&config).args(["remove", "napper"]));
    assert!(stderr.contains("--force"));

    overseer(&config).args(["stop", "napper"]).assert().success();
    let status = stdout_of(overseer(&config).args(["status", "napper"]));
    assert!(status.contains("stopped"));

    let removed = stdout_of(overseer(&config).args(["remove", "napper"]));
    assert!(removed.contains("removed"));
    let listed = stdout_of(overseer(&config).arg("list"));
    assert!(listed.contains("No services registered"));
}

#[test]
fn test_force_remove_kills_process() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    overseer(&config)
        .args(["add", "sleep 30", "--name", "doomed", "--start", "-w"])
        .arg(temp_dir.path())
        .assert()
        .success();

    overseer(&config)
        .args(["remove", "doomed", "--force"])
        .assert()
        .success();

    let listed = stdout_of(overseer(&config).arg("list"));
    assert!(!listed.contains("doomed"));
}

#[test]
fn test_logs_show_and_clear_output() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    overseer(&config)
        .args([
            "add",
            "sh -c 'echo hello from echo; echo oops >&2'",
            "--name",
            "echo",
            "--no-auto-restart",
            "--start",
            "-w",
        ])
        .arg(temp_dir.path())
        .assert()
        .success();

    std::thread::sleep(Duration::from_millis(500));

    let logs = stdout_of(overseer(&config).args(["logs", "echo"]));
    assert!(logs.contains("=== service started: "));
    assert!(logs.contains("hello from echo"));
    assert!(logs.contains("oops"));

    let tail = stdout_of(overseer(&config).args(["logs", "echo", "-n", "1"]));
    assert!(!tail.contains("=== service started: "));

    overseer(&config)
        .args(["logs", "echo", "--clear"])
        .assert()
        .success();
    let logs = stdout_of(overseer(&config).args(["logs", "echo"]));
    assert!(logs.contains("No logs available"));
}

#[test]
fn test_invalid_env_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    let stderr = stderr_of_failure(
        overseer(&config).args(["add", "sleep 30", "--name", "bad", "--env", "NOVALUE"]),
    );
    assert!(stderr.contains("KEY=VALUE"));

    let listed = stdout_of(overseer(&config).arg("list"));
    assert!(!listed.contains("bad"));
}

#[test]
fn test_reset_restart_counter() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    overseer(&config)
        .args(["add", "sleep 30", "--name", "counter"])
        .assert()
        .success();

    let reset = stdout_of(overseer(&config).args(["reset", "counter"]));
    assert!(reset.contains("Restart counter of 'counter' reset"));
}

#[test]
fn test_daemon_status_when_not_running() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir);

    let status = stdout_of(overseer(&config).args(["daemon", "status"]));
    assert!(status.contains("Daemon is not running"));

    let stderr = stderr_of_failure(overseer(&config).args(["daemon", "stop"]));
    assert!(stderr.contains("Daemon not running"));
}
