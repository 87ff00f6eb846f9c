use crate::command::error::LaunchError;
use crate::pid_file::PidFileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("pid file: `{0}`")]
    PidFile(#[from] PidFileError),

    #[error("worker could not be started after {attempts} attempts: `{last_error}`")]
    StartupFailed {
        attempts: u32,
        last_error: LaunchError,
    },

    #[error("giving up after {0} consecutive failed restarts")]
    GaveUp(u32),
}
