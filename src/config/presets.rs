use clap::ValueEnum;

/// Named sets of supervision settings.
///
/// A preset is the lowest priority configuration source, anything set in the
/// configuration file or the environment takes precedence over it.
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Frequent checks, three strikes before restarting.
    #[default]
    Watchdog,
    /// Slower, more tolerant supervision for long-lived keep-alive setups.
    Keeper,
}

// The watchdog preset is the set of built-in defaults.
const WATCHDOG_PRESET: &str = "{}";

const KEEPER_PRESET: &str = r#"
supervisor:
  main_loop_interval: 30s
  failure_threshold: 2
  startup_grace: 10s
  termination_timeout: 15s
  restart_delay: 60s
restart:
  max_restarts_per_hour: 10
  rate_limit_cooldown: 10m
  backoff_base: 60s
  backoff_cap_exponent: 4
  backoff_max: 600s
"#;

impl Preset {
    pub(super) fn as_yaml(&self) -> &'static str {
        match self {
            Preset::Watchdog => WATCHDOG_PRESET,
            Preset::Keeper => KEEPER_PRESET,
        }
    }
}
