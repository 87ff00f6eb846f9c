use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// when the TempDir is dropped, the temporal directory is removed, thus, the its
// ownership must remain on the parent function.
pub fn create_temp_file(
    dir: &TempDir,
    file_name: &str,
    data: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let file_path = dir.path().join(file_name);
    std::fs::create_dir_all(file_path.parent().unwrap())?;
    let mut file = File::create(&file_path)?;
    writeln!(file, "{data}")?;
    Ok(file_path)
}

/// Files of a watchdog run confined to a temporary directory.
pub struct WatchdogFiles {
    pub config: PathBuf,
    pub pid_file: PathBuf,
    pub worker_pid_file: PathBuf,
}

/// Writes a worker script running `body` and a config supervising it with short timings.
///
/// The worker records its pid before running `body`. Leftover detection matches the full
/// script path, which is unique to `dir`. `supervisor_overrides` are extra indented lines
/// of the `supervisor` section.
pub fn watchdog_files(
    dir: &TempDir,
    body: &str,
    supervisor_overrides: &str,
) -> Result<WatchdogFiles, Box<dyn std::error::Error>> {
    let worker_pid_file = dir.path().join("worker.pid");
    let script = create_temp_file(
        dir,
        "worker.sh",
        &format!("echo $$ > {}\n{body}", worker_pid_file.display()),
    )?;
    let pid_file = dir.path().join("run").join("watchdog.pid");

    let config = create_temp_file(
        dir,
        "config.yaml",
        &format!(
            r#"
worker:
  interpreter: /bin/sh
  script: {script}
  match_pattern: {script}
log_file: {log_file}
pid_file: {pid_file}
health:
  interval: 1s
log:
  level: debug
supervisor:
  main_loop_interval: 1s
  startup_grace: 1s
  termination_timeout: 5s
  restart_delay: 1s
{supervisor_overrides}
"#,
            script = script.display(),
            log_file = log_file(dir.path()).display(),
            pid_file = pid_file.display(),
        ),
    )?;

    Ok(WatchdogFiles {
        config,
        pid_file,
        worker_pid_file,
    })
}

pub fn log_file(dir: &Path) -> PathBuf {
    dir.join("worker.log")
}
