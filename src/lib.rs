//! Keeps a single long-running worker process alive and healthy.
//!
//! The [supervisor::Supervisor] launches the worker in its own process group, infers its
//! health from liveness and from the log file it writes, and restarts it within the limits
//! of a [supervisor::restart_policy::RestartPolicy] until a stop is requested.

#[cfg(not(target_family = "unix"))]
compile_error!("worker-watchdog relies on unix process groups and signals");

pub mod cli;
pub mod command;
pub mod config;
pub mod defaults;
pub mod event;
pub mod health;
pub mod logging;
pub mod pid_file;
pub mod supervisor;
pub mod utils;
