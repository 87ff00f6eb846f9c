use super::presets::Preset;
use super::WatchdogConfig;
use crate::defaults::WATCHDOG_CONFIG_ENV_VAR_PREFIX;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, Map};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("error loading config: `{0}`")]
    Load(#[from] config::ConfigError),
}

/// Loads the watchdog configuration from its layered sources.
///
/// From lowest to highest priority: the selected preset, the YAML file and
/// `WATCHDOG_` prefixed environment variables.
pub struct ConfigStore {
    config_path: PathBuf,
    required: bool,
    preset: Preset,
    env_source: Option<Map<String, String>>,
}

impl ConfigStore {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            required: false,
            preset: Preset::default(),
            env_source: None,
        }
    }

    /// Fail when the file does not exist instead of relying on the other sources.
    pub fn required(self, required: bool) -> Self {
        Self { required, ..self }
    }

    pub fn with_preset(self, preset: Preset) -> Self {
        Self { preset, ..self }
    }

    /// Replaces the process environment as the source of overrides.
    pub fn with_env_source(self, env_source: Map<String, String>) -> Self {
        Self {
            env_source: Some(env_source),
            ..self
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> Result<WatchdogConfig, ConfigStoreError> {
        Ok(self
            .builder()
            .build()?
            .try_deserialize::<WatchdogConfig>()?)
    }

    fn builder(&self) -> ConfigBuilder<DefaultState> {
        Config::builder()
            .add_source(File::from_str(self.preset.as_yaml(), FileFormat::Yaml))
            .add_source(
                File::new(&self.config_path.to_string_lossy(), FileFormat::Yaml)
                    .required(self.required),
            )
            // Eg. `WATCHDOG_RESTART__MAX_RESTARTS_PER_HOUR=5` sets `restart.max_restarts_per_hour`.
            // Double underscore because the keys are already snake_case.
            .add_source(
                Environment::with_prefix(WATCHDOG_CONFIG_ENV_VAR_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("worker.required_env")
                    .source(self.env_source.clone()),
            )
    }
}
