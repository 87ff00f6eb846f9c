use super::{Cli, CliError};
use crate::config::{WatchdogConfig, WatchdogConfigError};
use crate::utils::binary_metadata::binary_metadata;

#[derive(Debug)]
pub enum OneShotOperation {
    PrintVersion,
    PrintDebugInfo(Cli, WatchdogConfig),
    /// Validates the configuration and the worker environment, reporting every problem.
    Check(WatchdogConfig),
}

impl OneShotOperation {
    /// Runs the one-shot operation
    pub fn run_one_shot(&self) -> Result<(), CliError> {
        match self {
            OneShotOperation::PrintVersion => {
                println!("{}", binary_metadata());
                Ok(())
            }
            OneShotOperation::PrintDebugInfo(cli, config) => {
                println!("Printing debug info");
                println!("CLI: {:#?}", cli);
                println!("Config: {:#?}", config);

                #[cfg(feature = "multiple-instances")]
                println!("Feature: multiple-instances");
                Ok(())
            }
            OneShotOperation::Check(config) => match config.validate() {
                Ok(()) => {
                    println!("Configuration is valid");
                    Ok(())
                }
                Err(err) => {
                    let WatchdogConfigError::Invalid(problems) = &err;
                    problems.iter().for_each(|problem| println!("{problem}"));
                    Err(err.into())
                }
            },
        }
    }
}
