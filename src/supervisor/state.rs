use std::fmt::Display;

/// Lifecycle of the supervised worker as seen by the supervisor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    #[default]
    Stopped,
    Starting,
    Running,
    Unhealthy,
    Restarting,
    Cooldown,
}

impl Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            SupervisorState::Stopped => "STOPPED",
            SupervisorState::Starting => "STARTING",
            SupervisorState::Running => "RUNNING",
            SupervisorState::Unhealthy => "UNHEALTHY",
            SupervisorState::Restarting => "RESTARTING",
            SupervisorState::Cooldown => "COOLDOWN",
        };
        write!(f, "{state}")
    }
}
