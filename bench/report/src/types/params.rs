use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, derive_new::new)]
pub struct BenchmarkParams {
    /// Backend identifier as registered in the backend registry
    pub backend: String,
    /// Requested message count, 0 means the backend default
    pub requested_messages: u64,
    pub message_sizes: Vec<u64>,
    pub publish_workers: u32,
    pub consumers: u32,
    pub subscriber_cpu_multiplier: u32,
    pub remark: Option<String>,
}

impl BenchmarkParams {
    pub fn format_sizes(&self) -> String {
        self.message_sizes
            .iter()
            .map(|size| format!("{size} B"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
