use crate::common::config::{create_temp_file, watchdog_files};
use assert_cmd::Command;
use predicates::prelude::predicate;
use std::time::Duration;
use tempfile::TempDir;

const BINARY: &str = "worker-watchdog";

#[test]
fn print_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "worker-watchdog Version: {}",
            env!("CARGO_PKG_VERSION")
        )));
    Ok(())
}

#[test]
fn print_debug_info() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let files = watchdog_files(&dir, "sleep 60", "")?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config")
        .arg(&files.config)
        .arg("--print-debug-info");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Printing debug info"))
        .stdout(predicate::str::contains("max_restarts_per_hour: 12"));
    Ok(())
}

#[test]
fn preset_is_applied_below_the_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let files = watchdog_files(&dir, "sleep 60", "")?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config")
        .arg(&files.config)
        .args(["--preset", "keeper", "--print-debug-info"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("max_restarts_per_hour: 10"))
        .stdout(predicate::str::contains("failure_threshold: 2"))
        // The file sets it, so the preset value is not used.
        .stdout(predicate::str::contains("main_loop_interval: 1s"));
    Ok(())
}

#[test]
fn check_valid_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let files = watchdog_files(&dir, "sleep 60", "")?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config").arg(&files.config).arg("--check");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
    Ok(())
}

#[test]
fn check_reports_every_problem() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let config = create_temp_file(
        &dir,
        "config.yaml",
        &format!(
            r#"
worker:
  script: {}
  required_env:
    - WORKER_WATCHDOG_TEST_UNSET_TOKEN
log_file: {}
supervisor:
  failure_threshold: 0
"#,
            dir.path().join("missing.sh").display(),
            dir.path().join("worker.log").display()
        ),
    )?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config")
        .arg(&config)
        .arg("--check")
        .env_remove("WORKER_WATCHDOG_TEST_UNSET_TOKEN");
    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("missing.sh"))
        .stdout(predicate::str::contains("WORKER_WATCHDOG_TEST_UNSET_TOKEN"))
        .stdout(predicate::str::contains("supervisor.failure_threshold"));
    Ok(())
}

#[test]
fn environment_overrides_the_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let files = watchdog_files(&dir, "sleep 60", "")?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config")
        .arg(&files.config)
        .arg("--print-debug-info")
        .env("WATCHDOG_RESTART__MAX_RESTARTS_PER_HOUR", "4");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("max_restarts_per_hour: 4"));
    Ok(())
}

#[test]
fn missing_explicit_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config").arg(dir.path().join("absent.yaml"));
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("Could not read watchdog config"));
    Ok(())
}

#[test]
fn worker_that_can_not_start_fails_the_watchdog() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let files = watchdog_files(
        &dir,
        "echo 'token rejected' >&2\nexit 3",
        "  max_startup_attempts: 2",
    )?;

    let mut cmd = Command::cargo_bin(BINARY)?;
    cmd.arg("--config").arg(&files.config);
    cmd.timeout(Duration::from_secs(30));
    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("token rejected"));

    assert!(!files.pid_file.exists());
    Ok(())
}
