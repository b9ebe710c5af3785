pub mod defaults;

use crate::config::BenchSettings;
use crate::error::BenchError;
use crate::utils::duration::BenchDuration;
use crate::utils::payload::parse_message_sizes;
use clap::Parser;
use defaults::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct BenchArgs {
    /// Backend to benchmark, see --list
    #[arg(long, default_value = DEFAULT_PUBSUB)]
    pub pubsub: String,

    /// Messages to publish and consume per size, 0 uses the backend default
    #[arg(long, default_value_t = 0)]
    pub count: u64,

    /// Comma separated payload sizes in bytes
    #[arg(long, default_value = DEFAULT_MESSAGE_SIZES)]
    pub size: String,

    /// Publish workers, overrides the configuration
    #[arg(long)]
    pub workers: Option<u32>,

    /// Consumer loops reading the subscription, overrides the configuration
    #[arg(long)]
    pub consumers: Option<u32>,

    /// Interval between progress logs (e.g. 5s), 0 disables them
    #[arg(long, value_parser = parse_duration)]
    pub progress_interval: Option<BenchDuration>,

    /// Fail the run when consuming takes longer than this (e.g. 10m)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<BenchDuration>,

    /// TOML file with benchmark settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for report.json and bench.log
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Identifier for the benchmark run (e.g., machine name), defaults to the hostname
    #[arg(long)]
    pub identifier: Option<String>,

    /// Additional remark stored in the report
    #[arg(long)]
    pub remark: Option<String>,

    /// List registered backends and exit
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

fn parse_duration(value: &str) -> Result<BenchDuration, String> {
    value.parse::<BenchDuration>().map_err(|error| error.to_string())
}

impl BenchArgs {
    pub fn message_sizes(&self) -> Result<Vec<u64>, BenchError> {
        parse_message_sizes(&self.size)
    }

    /// Flags given on the command line win over the loaded settings.
    pub fn apply_to(&self, settings: &mut BenchSettings) -> Result<(), BenchError> {
        if let Some(workers) = self.workers {
            settings.publish_workers = workers;
        }
        if let Some(consumers) = self.consumers {
            settings.consumers = consumers;
        }
        if let Some(interval) = self.progress_interval {
            settings.progress_interval = interval;
        }
        if let Some(timeout) = self.timeout {
            settings.consume_timeout = Some(timeout);
        }
        settings.validate()
    }

    pub fn identifier(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn command_should_be_well_formed() {
        BenchArgs::command().debug_assert();
    }

    #[test]
    fn defaults_should_match_the_documented_values() {
        let args = BenchArgs::parse_from(["pubsub-bench"]);
        assert_eq!(args.pubsub, "memory");
        assert_eq!(args.count, 0);
        assert_eq!(args.message_sizes().unwrap(), vec![16, 64, 256]);
        assert!(!args.list);
    }

    #[test]
    fn flags_should_override_settings() {
        let args = BenchArgs::parse_from([
            "pubsub-bench",
            "--workers",
            "8",
            "--consumers",
            "2",
            "--progress-interval",
            "1s",
            "--timeout",
            "30s",
        ]);
        let mut settings = BenchSettings::default();

        args.apply_to(&mut settings).unwrap();

        assert_eq!(settings.publish_workers, 8);
        assert_eq!(settings.consumers, 2);
        assert_eq!(
            settings.progress_interval.get_duration(),
            Duration::from_secs(1)
        );
        assert_eq!(
            settings.consume_timeout.map(|timeout| timeout.get_duration()),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn zero_consumers_flag_should_be_rejected() {
        let args = BenchArgs::parse_from(["pubsub-bench", "--consumers", "0"]);
        let mut settings = BenchSettings::default();
        assert!(matches!(
            args.apply_to(&mut settings),
            Err(BenchError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn explicit_identifier_should_win_over_hostname() {
        let args = BenchArgs::parse_from(["pubsub-bench", "--identifier", "bench-box"]);
        assert_eq!(args.identifier(), "bench-box");
    }
}
