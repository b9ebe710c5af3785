use crate::error::BenchError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOG_FILE_NAME: &str = "bench.log";

/// Logs go to stderr so stdout only carries the results table. With an output
/// directory, a copy is also written to `bench.log` in it; keep the returned guard
/// alive until the end of `main` so the file gets flushed.
pub fn init_logging(output_dir: Option<&Path>) -> Result<Option<WorkerGuard>, BenchError> {
    let mut layers = vec![fmt::layer().with_writer(std::io::stderr).boxed()];

    let mut file_guard = None;
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        file_guard = Some(guard);
    }

    Registry::default()
        .with(layers)
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")))
        .try_init()
        .map_err(|error| BenchError::CannotInitializeLogging(error.to_string()))?;
    Ok(file_guard)
}
