use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0} not piped")]
    StreamPipeError(String),

    #[error("{0}")]
    IOError(#[from] std::io::Error),

    #[error("signal delivery failed: `{0}`")]
    NixError(String),

    #[error("process `{0}` is still alive after being killed")]
    StillAlive(u32),
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("unable to start worker: `{0}`")]
    Spawn(#[from] CommandError),

    #[error("worker exited during startup ({}), output: {captured_output:?}", describe_exit(.exit_code))]
    ExitedEarly {
        exit_code: Option<i32>,
        captured_output: String,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}
