use crate::{outcome::BenchmarkOutcome, report::BenchmarkReport};
use colored::{Color, ColoredString, Colorize};
use human_repr::{HumanCount, HumanThroughput};
use tracing::info;

pub const RESULTS_TABLE_HEADER: &str =
    "messages\tmessage size\trate (messages/s)\tthroughput (b/s)";

/// Renders the consume-side results as the tab-separated table printed by the binary.
pub fn results_table(outcomes: &[BenchmarkOutcome]) -> String {
    let mut table = String::from(RESULTS_TABLE_HEADER);
    for outcome in outcomes {
        table.push('\n');
        table.push_str(&outcome.consume.table_row());
    }
    table
}

impl BenchmarkReport {
    pub fn print_summary(&self) {
        let params = &self.params;
        let params_print = format!(
            "Benchmark: {}, requested messages: {}, message sizes: {}, {} publish workers, {} consumers, subscriber multiplier: {}\n",
            params.backend,
            params.requested_messages,
            params.format_sizes(),
            params.publish_workers,
            params.consumers,
            params.subscriber_cpu_multiplier,
        )
        .blue();

        info!("{}", params_print);

        self.outcomes
            .iter()
            .for_each(|outcome| info!("{}\n", outcome.formatted_string()));
    }
}

impl BenchmarkOutcome {
    pub fn formatted_string(&self) -> ColoredString {
        let color = if self.consume.mean_rate > 0.0 {
            Color::Green
        } else {
            Color::Red
        };

        format!(
            "{} results for {} messages of {}: publish rate: {}, consume rate: {}, consume throughput: {}",
            self.backend,
            self.consume.count.human_count_bare(),
            self.consume.message_size.human_count_bytes(),
            self.publish.mean_rate.human_throughput("msg"),
            self.consume.mean_rate.human_throughput("msg"),
            self.consume.mean_throughput.human_throughput_bytes(),
        )
        .color(color)
    }
}
