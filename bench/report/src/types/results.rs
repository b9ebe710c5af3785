use crate::utils::round_float;
use serde::{Deserialize, Serialize};

/// Mean rate and throughput measured for one side (publish or consume) of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default, derive_new::new)]
pub struct BenchmarkResults {
    pub count: u64,
    pub message_size: u64,
    #[serde(serialize_with = "round_float")]
    pub mean_rate: f64,
    #[serde(serialize_with = "round_float")]
    pub mean_throughput: f64,
}

impl BenchmarkResults {
    /// Builds results from a messages/s rate; throughput is derived from the payload size.
    pub fn from_rate(count: u64, message_size: u64, mean_rate: f64) -> Self {
        Self {
            count,
            message_size,
            mean_rate,
            mean_throughput: mean_rate * message_size as f64,
        }
    }

    pub fn table_row(&self) -> String {
        format!(
            "{}\t{}\t{:.6}\t{:.6}",
            self.count, self.message_size, self.mean_rate, self.mean_throughput
        )
    }
}
