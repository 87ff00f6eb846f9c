use crate::defaults::{WATCHDOG_NAME, WATCHDOG_VERSION};

pub(crate) const RUST_VERSION: &str = match option_env!("CARGO_PKG_RUST_VERSION") {
    Some(version) if !version.is_empty() => version,
    _ => "unknown",
};
pub(crate) const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "development",
};

pub fn binary_metadata() -> String {
    format!("{WATCHDOG_NAME} Version: {WATCHDOG_VERSION}, Rust Version: {RUST_VERSION}, GitCommit: {GIT_COMMIT}")
}
