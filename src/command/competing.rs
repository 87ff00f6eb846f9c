use super::command_os::{signal_group, signal_process};
use nix::sys::signal::Signal;
use nix::unistd::{getpgid, Pid};
use sysinfo::{ProcessRefreshKind, RefreshKind, System, UpdateKind};
use tracing::{debug, warn};

/// Kills every process whose command line contains `pattern`, except the watchdog itself.
///
/// Runs before each launch so a worker left behind by an unclean shutdown can not run
/// next to the new one. Returns how many processes were killed.
pub fn kill_competing_instances(pattern: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }

    let system = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new().with_cmd(UpdateKind::Always)),
    );

    let mut killed = 0;
    for (pid, command_line) in matching_processes(&system, pattern, std::process::id()) {
        warn!(pid, "Killing competing worker instance: {command_line}");
        match kill_process(pid) {
            Ok(()) => killed += 1,
            Err(err) => warn!(pid, "Unable to kill competing worker instance: {err}"),
        }
    }

    if killed == 0 {
        debug!("No competing worker instances found for `{pattern}`");
    }
    killed
}

/// Processes whose command line contains `pattern`, with their command line.
///
/// Threads are listed next to processes on Linux and share their command line, they are
/// skipped so each process is reported once.
fn matching_processes(system: &System, pattern: &str, own_pid: u32) -> Vec<(u32, String)> {
    system
        .processes()
        .iter()
        .filter(|(_, process)| process.thread_kind().is_none())
        .map(|(pid, process)| (pid.as_u32(), process.cmd().join(" ")))
        .filter(|(pid, command_line)| *pid != own_pid && command_line.contains(pattern))
        .collect()
}

// Group leaders take their whole group down with them.
fn kill_process(pid: u32) -> Result<(), super::error::CommandError> {
    let is_group_leader = getpgid(Some(Pid::from_raw(pid as i32)))
        .is_ok_and(|pgid| pgid.as_raw() as u32 == pid);

    if is_group_leader {
        signal_group(pid, Signal::SIGKILL)
    } else {
        signal_process(pid, Signal::SIGKILL)
    }
}
