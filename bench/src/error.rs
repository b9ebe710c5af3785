use crate::runner::BenchmarkStage;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Unknown PubSub: {0}")]
    UnknownBackend(String),
    #[error("Invalid message size: {0}")]
    InvalidMessageSize(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cannot initialize logging: {0}")]
    CannotInitializeLogging(String),
    #[error("Cannot initialize topic {topic}: {source}")]
    Initialization {
        topic: String,
        #[source]
        source: Box<BenchError>,
    },
    #[error("Cannot publish to topic {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("Cannot subscribe to topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
    #[error("Cannot acknowledge message {0}")]
    Acknowledge(String),
    #[error("Delivery stream for topic {topic} ended after {received} of {expected} messages")]
    StreamClosed {
        topic: String,
        received: u64,
        expected: u64,
    },
    #[error("Cannot close {resource}: {reason}")]
    Close { resource: String, reason: String },
    #[error("Consuming timed out after {timeout:?}, received {received} of {expected} messages")]
    ConsumeTimeout {
        timeout: Duration,
        received: u64,
        expected: u64,
    },
    #[error("Invalid benchmark stage transition from {from} to {to}")]
    InvalidStageTransition {
        from: BenchmarkStage,
        to: BenchmarkStage,
    },
    #[error("Benchmark was cancelled")]
    Cancelled,
    #[error("Benchmark task failed")]
    TaskFailed(#[from] tokio::task::JoinError),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

impl BenchError {
    /// Configuration errors abort before any run is started.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BenchError::UnknownBackend(_)
                | BenchError::InvalidMessageSize(_)
                | BenchError::InvalidConfiguration(_)
        )
    }
}
