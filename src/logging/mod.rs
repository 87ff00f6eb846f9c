pub mod config;
pub mod file_logging;
pub mod format;
