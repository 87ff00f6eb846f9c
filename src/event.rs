pub mod cancellation;
pub mod channel;

/// Events addressed to the whole watchdog process, as opposed to the worker it supervises.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplicationEvent {
    StopRequested,
}
