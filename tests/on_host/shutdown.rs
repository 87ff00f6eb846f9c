use crate::common::config::{log_file, watchdog_files};
use crate::common::retry::retry;
use assert_cmd::cargo::cargo_bin;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rstest::rstest;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct AutoDropChild(Child);

impl Drop for AutoDropChild {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

impl AutoDropChild {
    fn wait_timeout(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(status) = self.0.try_wait().unwrap() {
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        None
    }
}

fn read_pid(path: &std::path::Path) -> Result<i32, Box<dyn std::error::Error>> {
    Ok(std::fs::read_to_string(path)?.trim().parse()?)
}

fn process_gone(pid: i32) -> Result<(), Box<dyn std::error::Error>> {
    match kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => Ok(()),
        _ => Err(format!("process {pid} is still alive").into()),
    }
}

#[rstest]
#[case::interrupt(Signal::SIGINT)]
#[case::terminate(Signal::SIGTERM)]
fn stop_signal_terminates_worker_and_removes_pid_file(#[case] signal: Signal) {
    let dir = TempDir::new().unwrap();
    // The worker keeps its log fresh and spawns children of its own.
    let files = watchdog_files(
        &dir,
        &format!(
            "while true; do echo alive >> {}; sleep 1; done",
            log_file(dir.path()).display()
        ),
        "",
    )
    .unwrap();

    let mut watchdog = AutoDropChild(
        Command::new(cargo_bin("worker-watchdog"))
            .arg("--config")
            .arg(&files.config)
            .stdout(Stdio::null())
            .spawn()
            .unwrap(),
    );

    let mut worker_pid = 0;
    retry(60, Duration::from_millis(250), || {
        worker_pid = read_pid(&files.worker_pid_file)?;
        let watchdog_pid = read_pid(&files.pid_file)?;
        assert_eq!(watchdog_pid, watchdog.0.id() as i32);
        Ok(())
    });
    // Let the startup grace period pass so the worker is running.
    std::thread::sleep(Duration::from_secs(2));

    kill(Pid::from_raw(watchdog.0.id() as i32), signal).unwrap();

    let status = watchdog
        .wait_timeout(Duration::from_secs(20))
        .expect("watchdog did not stop");
    assert!(status.success(), "unexpected exit status {status}");
    assert!(!files.pid_file.exists());
    retry(20, Duration::from_millis(100), || process_gone(worker_pid));
}

#[test]
fn dead_worker_is_restarted() {
    let dir = TempDir::new().unwrap();
    let launches = dir.path().join("launches");
    let files = watchdog_files(
        &dir,
        &format!("echo $$ >> {}\nsleep 3", launches.display()),
        "  failure_threshold: 1",
    )
    .unwrap();

    let watchdog = AutoDropChild(
        Command::new(cargo_bin("worker-watchdog"))
            .arg("--config")
            .arg(&files.config)
            .stdout(Stdio::null())
            .spawn()
            .unwrap(),
    );

    retry(60, Duration::from_millis(250), || {
        let count = std::fs::read_to_string(&launches)?.lines().count();
        if count < 2 {
            return Err(format!("worker launched {count} times").into());
        }
        Ok(())
    });

    kill(Pid::from_raw(watchdog.0.id() as i32), Signal::SIGTERM).unwrap();
}
