mod one_shot_operation;

use crate::config::presets::Preset;
use crate::config::store::{ConfigStore, ConfigStoreError};
use crate::config::{WatchdogConfig, WatchdogConfigError};
use crate::defaults::WATCHDOG_CONFIG_PATH;
use crate::logging::config::{FileLoggerGuard, LoggingError};
use crate::utils::binary_metadata::binary_metadata;
use clap::Parser;
pub use one_shot_operation::OneShotOperation;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Represents all the data structures that can be created from the CLI
#[derive(Debug)]
pub struct WatchdogCliConfig {
    pub config: WatchdogConfig,
    pub file_logger_guard: FileLoggerGuard,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not read watchdog config: `{0}`")]
    ConfigRead(#[from] ConfigStoreError),
    #[error("Could not initialize logging: `{0}`")]
    LoggingInit(#[from] LoggingError),
    #[error("{0}")]
    Invalid(#[from] WatchdogConfigError),
}

/// What action was requested from the CLI?
#[derive(Debug)]
pub enum CliCommand {
    /// Normal operation requested. Get the required config and continue.
    Run(WatchdogCliConfig),
    /// Do an "one-shot" operation and exit.
    Quit(OneShotOperation),
}

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Configuration file. When omitted `/etc/worker-watchdog/config.yaml` is read if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set of supervision defaults the configuration is layered on.
    #[arg(long, value_enum, default_value_t = Preset::Watchdog)]
    preset: Preset,

    /// Validate the configuration and the worker environment, then exit.
    #[arg(long)]
    check: bool,

    #[arg(long)]
    print_debug_info: bool,

    #[arg(long)]
    version: bool,
}

impl Cli {
    /// Parses command line arguments and decides how the application runs
    pub fn init() -> Result<CliCommand, CliError> {
        Self::parse().into_command()
    }

    fn into_command(self) -> Result<CliCommand, CliError> {
        // If the version flag is set, print the version and exit
        if self.version {
            return Ok(CliCommand::Quit(OneShotOperation::PrintVersion));
        }

        let config_store = self.config_store();
        let config = config_store.load().inspect_err(|err| {
            println!(
                "Could not read watchdog config from {}: {}",
                config_store.config_path().to_string_lossy(),
                err
            )
        })?;

        if self.check {
            return Ok(CliCommand::Quit(OneShotOperation::Check(config)));
        }

        if self.print_debug_info {
            return Ok(CliCommand::Quit(OneShotOperation::PrintDebugInfo(
                self, config,
            )));
        }

        config.validate()?;

        let file_logger_guard = config.log.try_init()?;
        info!("{}", binary_metadata());
        info!(
            "Starting worker watchdog with config '{}'",
            config_store.config_path().to_string_lossy()
        );

        Ok(CliCommand::Run(WatchdogCliConfig {
            config,
            file_logger_guard,
        }))
    }

    /// An explicitly given file must exist, the default location is optional.
    fn config_store(&self) -> ConfigStore {
        match &self.config {
            Some(path) => ConfigStore::new(path).required(true),
            None => ConfigStore::new(&PathBuf::from(WATCHDOG_CONFIG_PATH)),
        }
        .with_preset(self.preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config_in;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("worker-watchdog").chain(args.iter().copied()))
            .unwrap()
    }

    fn write_config(dir: &TempDir) -> PathBuf {
        let config = config_in(dir.path());
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            format!(
                "worker:\n  script: {}\nlog_file: {}\npid_file: {}\n",
                config.worker.script.display(),
                config.log_file.display(),
                config.pid_file.display()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.config, None);
        assert_eq!(cli.preset, Preset::Watchdog);
        assert!(!cli.check);
        assert!(!cli.print_debug_info);
        assert!(!cli.version);
    }

    #[test]
    fn preset_is_parsed() {
        assert_eq!(cli(&["--preset", "keeper"]).preset, Preset::Keeper);
        assert!(Cli::try_parse_from(["worker-watchdog", "--preset", "other"]).is_err());
    }

    #[test]
    fn version_does_not_need_a_config() {
        let command = cli(&["--version", "--config", "/does/not/exist.yaml"])
            .into_command()
            .unwrap();
        assert_matches!(command, CliCommand::Quit(OneShotOperation::PrintVersion));
    }

    #[test]
    fn explicit_config_must_exist() {
        let result = cli(&["--config", "/does/not/exist.yaml"]).into_command();
        assert_matches!(result, Err(CliError::ConfigRead(_)));
    }

    #[test]
    fn check_returns_the_loaded_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir);

        let command = cli(&["--check", "--config", path.to_str().unwrap()])
            .into_command()
            .unwrap();
        assert_matches!(
            command,
            CliCommand::Quit(OneShotOperation::Check(config)) if config.log_file == dir.path().join("worker.log")
        );
    }

    #[test]
    fn debug_info_keeps_the_cli() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir);

        let command = cli(&["--print-debug-info", "--config", path.to_str().unwrap()])
            .into_command()
            .unwrap();
        assert_matches!(
            command,
            CliCommand::Quit(OneShotOperation::PrintDebugInfo(cli, _)) if cli.print_debug_info
        );
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            format!(
                "worker:\n  script: {}\nlog_file: {}\n",
                dir.path().join("missing.sh").display(),
                dir.path().join("worker.log").display()
            ),
        )
        .unwrap();

        let result = cli(&["--config", path.to_str().unwrap()]).into_command();
        assert_matches!(result, Err(CliError::Invalid(WatchdogConfigError::Invalid(problems))) if problems.len() == 1);
    }
}
