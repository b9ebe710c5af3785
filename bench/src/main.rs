use clap::Parser;
use figlet_rs::FIGfont;
use pubsub_bench::args::BenchArgs;
use pubsub_bench::backends::default_registry;
use pubsub_bench::config::BenchSettings;
use pubsub_bench::error::BenchError;
use pubsub_bench::logging::init_logging;
use pubsub_bench::runner::{BenchmarkOptions, BenchmarkRunner};
use pubsub_bench_report::hardware::BenchmarkHardware;
use pubsub_bench_report::params::BenchmarkParams;
use pubsub_bench_report::report::BenchmarkReport;
use pubsub_bench_report::results_table;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), BenchError> {
    let args = BenchArgs::parse();

    if let Ok(font) = FIGfont::standard() {
        if let Some(banner) = font.convert("PubSub Bench") {
            eprintln!("{banner}");
        }
    }

    let _log_guard = init_logging(args.output_dir.as_deref())?;
    run(args)
        .await
        .inspect_err(|error| error!("Benchmark failed: {error}"))
}

async fn run(args: BenchArgs) -> Result<(), BenchError> {
    let mut settings = BenchSettings::load(args.config.as_deref())?;
    args.apply_to(&mut settings)?;
    let message_sizes = args.message_sizes()?;

    let registry = default_registry(&settings);
    if args.list {
        registry.names().for_each(|name| println!("{name}"));
        return Ok(());
    }
    registry.get(&args.pubsub)?;

    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, stopping the benchmark...");
                cancellation.cancel();
            }
        });
    }

    info!(
        "Starting the benchmark of {} with message sizes {:?}...",
        args.pubsub, message_sizes
    );
    let runner = BenchmarkRunner::new(registry, BenchmarkOptions::from(&settings))
        .with_cancellation(cancellation);
    let outcomes = runner
        .run_sizes(&args.pubsub, args.count, &message_sizes)
        .await?;

    println!("{}", results_table(&outcomes));

    let params = BenchmarkParams::new(
        args.pubsub.clone(),
        args.count,
        message_sizes,
        settings.publish_workers,
        settings.consumers,
        settings.subscriber_cpu_multiplier,
        args.remark.clone(),
    );
    let report = BenchmarkReport::new(
        BenchmarkHardware::collect(Some(args.identifier())),
        params,
        outcomes,
    );
    report.print_summary();
    if let Some(output_dir) = &args.output_dir {
        let report_path = report.dump_to_json(output_dir)?;
        info!("Benchmark report saved to {}", report_path.display());
    }

    info!("Finished the benchmark.");
    Ok(())
}
