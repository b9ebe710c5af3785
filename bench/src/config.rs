use crate::actors::publisher::DEFAULT_PUBLISH_WORKERS;
use crate::error::BenchError;
use crate::utils::duration::BenchDuration;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "PUBSUB_BENCH_";
/// Read without prefix, for compatibility with existing deployment scripts.
pub const SUBSCRIBER_CPU_MULTIPLIER: &str = "SUBSCRIBER_CPU_MULTIPLIER";

const DEFAULT_CONSUMERS: u32 = 1;
const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 5;
const DEFAULT_SUBSCRIBER_CPU_MULTIPLIER: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    pub publish_workers: u32,
    pub consumers: u32,
    pub progress_interval: BenchDuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consume_timeout: Option<BenchDuration>,
    pub subscriber_cpu_multiplier: u32,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            publish_workers: DEFAULT_PUBLISH_WORKERS as u32,
            consumers: DEFAULT_CONSUMERS,
            progress_interval: BenchDuration::from_secs(DEFAULT_PROGRESS_INTERVAL_SECS),
            consume_timeout: None,
            subscriber_cpu_multiplier: DEFAULT_SUBSCRIBER_CPU_MULTIPLIER,
        }
    }
}

impl BenchSettings {
    /// Defaults, then the optional TOML file, then `PUBSUB_BENCH_*` variables, then
    /// the bare `SUBSCRIBER_CPU_MULTIPLIER` variable.
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        let mut figment = Figment::from(Serialized::defaults(BenchSettings::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(BenchError::InvalidConfiguration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let settings: BenchSettings = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(
                Env::raw()
                    .only(&[SUBSCRIBER_CPU_MULTIPLIER])
                    .map(|_| "subscriber_cpu_multiplier".into()),
            )
            .extract()
            .map_err(|error| BenchError::InvalidConfiguration(error.to_string()))?;
        settings.validate()?;
        debug!("Loaded benchmark settings: {settings:?}");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.publish_workers == 0 {
            return Err(BenchError::InvalidConfiguration(
                "publish_workers must be greater than 0".to_owned(),
            ));
        }
        if self.consumers == 0 {
            return Err(BenchError::InvalidConfiguration(
                "consumers must be greater than 0".to_owned(),
            ));
        }
        if self.subscriber_cpu_multiplier == 0 {
            return Err(BenchError::InvalidConfiguration(format!(
                "{SUBSCRIBER_CPU_MULTIPLIER} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Number of children for multiplexed backends: available parallelism times the
    /// configured multiplier.
    pub fn subscribers_count(&self) -> usize {
        let parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        parallelism * self.subscriber_cpu_multiplier as usize
    }
}
