use super::results::BenchmarkResults;
use serde::{Deserialize, Serialize};

/// Publish and consume results of a single (backend, message size) run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, derive_new::new)]
pub struct BenchmarkOutcome {
    pub backend: String,
    pub topic: String,
    pub publish: BenchmarkResults,
    pub consume: BenchmarkResults,
}

impl BenchmarkOutcome {
    pub fn message_size(&self) -> u64 {
        self.consume.message_size
    }
}
