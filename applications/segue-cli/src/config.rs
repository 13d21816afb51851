/// Simulator configuration
use crate::error::{CliError, Result};
use segue_playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "segue.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Virtual clock step
    #[serde(default = "default_tick_secs")]
    pub tick_secs: f64,
    /// Time a simulated sink takes to become playable after a load
    #[serde(default = "default_load_latency_secs")]
    pub load_latency_secs: f64,
    /// Real length of resources the scenario does not describe
    #[serde(default = "default_media_duration_secs")]
    pub default_media_duration_secs: f64,
    /// Hard stop for scenarios without their own length
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,
    /// Spacing between the engine's retries of a failing fetch
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            load_latency_secs: default_load_latency_secs(),
            default_media_duration_secs: default_media_duration_secs(),
            max_duration_secs: default_max_duration_secs(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

fn default_tick_secs() -> f64 {
    0.25
}

fn default_load_latency_secs() -> f64 {
    0.2
}

fn default_media_duration_secs() -> f64 {
    10.0
}

fn default_max_duration_secs() -> f64 {
    600.0
}

fn default_retry_interval_secs() -> f64 {
    0.5
}

impl CliConfig {
    /// Load configuration from file and environment
    ///
    /// Priority: environment variables > config file > defaults.
    /// Nested keys use a double underscore, e.g.
    /// `SEGUE_PLAYBACK__PRELOAD_THRESHOLD_SECS=2`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`CliConfig::load`], reading variables from `env` instead of
    /// the process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                builder = builder
                    .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SEGUE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CliError::Config(e.to_string()))?;

        config.validate()
    }

    /// Check the simulation settings and normalise the playback section
    pub fn validate(mut self) -> Result<Self> {
        let sim = &self.simulation;
        if !(sim.tick_secs.is_finite() && sim.tick_secs > 0.0) {
            return Err(CliError::Config(format!(
                "simulation.tick_secs must be positive, got {}",
                sim.tick_secs
            )));
        }

        for (name, value) in [
            ("load_latency_secs", sim.load_latency_secs),
            ("default_media_duration_secs", sim.default_media_duration_secs),
            ("max_duration_secs", sim.max_duration_secs),
            ("retry_interval_secs", sim.retry_interval_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CliError::Config(format!(
                    "simulation.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        self.playback = self.playback.validate()?;
        Ok(self)
    }
}
