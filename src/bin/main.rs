//! Entry point of the worker watchdog.
//!
//! Parses the command line and either performs a one-shot action or supervises the
//! configured worker until SIGINT or SIGTERM is received.
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error, info};
use worker_watchdog::cli::{Cli, CliCommand, WatchdogCliConfig};
use worker_watchdog::event::channel::{pub_sub, EventPublisher};
use worker_watchdog::event::ApplicationEvent;
use worker_watchdog::supervisor::Supervisor;

fn main() -> ExitCode {
    let cli_command = match Cli::init() {
        Ok(cli_command) => cli_command,
        Err(err) => {
            // Logging may not be initialized yet.
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let cli_config = match cli_command {
        CliCommand::Run(cli_config) => cli_config,
        CliCommand::Quit(one_shot_op) => {
            return match one_shot_op.run_one_shot() {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
    };

    match _main(cli_config) {
        Ok(()) => {
            info!("Exiting gracefully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("The watchdog finished with an error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the supervisor once logging is in place.
///
/// The file logger guard lives until this returns, so nothing logged while stopping is lost.
fn _main(cli_config: WatchdogCliConfig) -> Result<(), Box<dyn Error>> {
    let WatchdogCliConfig {
        config,
        file_logger_guard: _file_logger_guard,
    } = cli_config;

    let (application_event_publisher, application_event_consumer) = pub_sub();

    debug!("Creating the signal handler");
    create_shutdown_signal_handler(application_event_publisher)?;

    Supervisor::from_config(&config, application_event_consumer).run()?;
    Ok(())
}

/// Publishes a stop request on SIGINT or SIGTERM.
pub fn create_shutdown_signal_handler(
    publisher: EventPublisher<ApplicationEvent>,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received SIGINT/SIGTERM. Stopping the watchdog");
        let _ = publisher
            .publish(ApplicationEvent::StopRequested)
            .inspect_err(|e| error!("Could not send watchdog stop request: {}", e));
    })
    .inspect_err(|e| error!("Could not set signal handler: {e}"))
}
