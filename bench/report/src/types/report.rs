use super::hardware::BenchmarkHardware;
use super::outcome::BenchmarkOutcome;
use super::params::BenchmarkParams;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const REPORT_FILE_NAME: &str = "report.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BenchmarkReport {
    /// Benchmark unique identifier
    pub uuid: Uuid,

    /// Timestamp when the benchmark was finished
    pub timestamp: String,

    /// Benchmark hardware
    pub hardware: BenchmarkHardware,

    /// Benchmark parameters
    pub params: BenchmarkParams,

    /// Results per message size, in execution order
    pub outcomes: Vec<BenchmarkOutcome>,
}

impl BenchmarkReport {
    pub fn new(
        hardware: BenchmarkHardware,
        params: BenchmarkParams,
        outcomes: Vec<BenchmarkOutcome>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            hardware,
            params,
            outcomes,
        }
    }

    /// Writes `report.json` into `output_dir`, creating the directory when missing.
    pub fn dump_to_json(&self, output_dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let report_path = output_dir.join(REPORT_FILE_NAME);
        let report_json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(&report_path, report_json)?;
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::BenchmarkResults;

    #[test]
    fn report_should_be_dumped_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = BenchmarkOutcome::new(
            "memory".to_owned(),
            "benchmark_abc".to_owned(),
            BenchmarkResults::from_rate(100, 16, 50.0),
            BenchmarkResults::from_rate(100, 16, 25.0),
        );
        let params = BenchmarkParams::new("memory".to_owned(), 100, vec![16], 200, 1, 1, None);
        let report = BenchmarkReport::new(BenchmarkHardware::default(), params, vec![outcome]);

        let path = report.dump_to_json(&dir.path().join("nested")).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let loaded: BenchmarkReport = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded, report);
    }
}
