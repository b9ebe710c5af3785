use crate::actors::consumer::Consumer;
use crate::actors::progress::spawn_progress_reporter;
use crate::actors::publisher::PublishPipeline;
use crate::backends::{BackendDefinition, BackendRegistry};
use crate::config::BenchSettings;
use crate::counter::MessageCounter;
use crate::error::BenchError;
use crate::pubsub::message::IdGenerator;
use crate::pubsub::{BackendPair, DeliveryStream};
use crate::utils::payload::create_payload;
use derive_more::derive::Display;
use human_repr::HumanCount;
use pubsub_bench_report::outcome::BenchmarkOutcome;
use pubsub_bench_report::results::BenchmarkResults;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TOPIC_PREFIX: &str = "benchmark_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BenchmarkStage {
    #[display("idle")]
    Idle,
    #[display("initializing")]
    Initializing,
    #[display("publishing")]
    Publishing,
    #[display("consuming")]
    Consuming,
    #[display("reporting")]
    Reporting,
    #[display("closed")]
    Closed,
}

impl BenchmarkStage {
    /// Stages only move forward one step at a time, except that a run may be closed
    /// from any stage once it failed.
    pub fn can_advance_to(self, next: BenchmarkStage) -> bool {
        use BenchmarkStage::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Publishing)
                | (Publishing, Consuming)
                | (Consuming, Reporting)
                | (Idle | Initializing | Publishing | Consuming | Reporting, Closed)
        )
    }
}

struct StageTracker<'a> {
    topic: &'a str,
    stage: BenchmarkStage,
}

impl<'a> StageTracker<'a> {
    fn new(topic: &'a str) -> Self {
        Self {
            topic,
            stage: BenchmarkStage::Idle,
        }
    }

    fn advance(&mut self, next: BenchmarkStage) -> Result<(), BenchError> {
        if !self.stage.can_advance_to(next) {
            return Err(BenchError::InvalidStageTransition {
                from: self.stage,
                to: next,
            });
        }
        info!("Benchmark on topic {}: {} → {}", self.topic, self.stage, next);
        self.stage = next;
        Ok(())
    }
}

/// A single run: one backend, one message size.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct BenchmarkConfig {
    pub backend: String,
    /// 0 falls back to the backend default.
    pub messages_count: u64,
    pub message_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOptions {
    pub publish_workers: usize,
    pub consumers: usize,
    pub progress_interval: Duration,
    pub consume_timeout: Option<Duration>,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self::from(&BenchSettings::default())
    }
}

impl From<&BenchSettings> for BenchmarkOptions {
    fn from(settings: &BenchSettings) -> Self {
        Self {
            publish_workers: settings.publish_workers as usize,
            consumers: settings.consumers as usize,
            progress_interval: settings.progress_interval.get_duration(),
            consume_timeout: settings
                .consume_timeout
                .map(|timeout| timeout.get_duration()),
        }
    }
}

pub struct BenchmarkRunner {
    registry: BackendRegistry,
    options: BenchmarkOptions,
    cancellation: CancellationToken,
}

impl BenchmarkRunner {
    pub fn new(registry: BackendRegistry, options: BenchmarkOptions) -> Self {
        Self {
            registry,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Runs abort with `BenchError::Cancelled` once `cancellation` is cancelled.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Publish and consume results of a single run.
    pub async fn run(
        &self,
        config: &BenchmarkConfig,
    ) -> Result<(BenchmarkResults, BenchmarkResults), BenchError> {
        let outcome = self.run_outcome(config).await?;
        Ok((outcome.publish, outcome.consume))
    }

    /// Runs every size in order, stopping at the first failure.
    pub async fn run_sizes(
        &self,
        backend: &str,
        messages_count: u64,
        message_sizes: &[u64],
    ) -> Result<Vec<BenchmarkOutcome>, BenchError> {
        self.registry.get(backend)?;
        let mut outcomes = Vec::with_capacity(message_sizes.len());
        for &message_size in message_sizes {
            let config = BenchmarkConfig::new(backend.to_owned(), messages_count, message_size);
            let outcome = self.run_outcome(&config).await.inspect_err(|error| {
                error!("Benchmark of {backend} with {message_size} B messages failed: {error}")
            })?;
            info!("{}", outcome.formatted_string());
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn run_outcome(&self, config: &BenchmarkConfig) -> Result<BenchmarkOutcome, BenchError> {
        let definition = self.registry.get(&config.backend)?;
        let topic = format!("{TOPIC_PREFIX}{}", IdGenerator::ShortUuid.generate());
        let mut stage = StageTracker::new(&topic);

        stage.advance(BenchmarkStage::Initializing)?;
        if let Err(error) = self.initialize(definition, &topic).await {
            stage.advance(BenchmarkStage::Closed)?;
            return Err(BenchError::Initialization {
                topic,
                source: Box::new(error),
            });
        }

        stage.advance(BenchmarkStage::Publishing)?;
        let pair = match definition.create().await {
            Ok(pair) => pair,
            Err(error) => {
                stage.advance(BenchmarkStage::Closed)?;
                return Err(error);
            }
        };
        let measured = self
            .measure(definition, &pair, &topic, config, &mut stage)
            .await;
        let closed = pair.close().await;
        stage.advance(BenchmarkStage::Closed)?;

        let (publish, consume) = measured?;
        closed?;
        Ok(BenchmarkOutcome::new(
            config.backend.clone(),
            topic.clone(),
            publish,
            consume,
        ))
    }

    /// Makes sure messages published to `topic` are retained until the real
    /// subscription starts, using a pair of its own.
    async fn initialize(
        &self,
        definition: &BackendDefinition,
        topic: &str,
    ) -> Result<(), BenchError> {
        let pair = definition.create().await?;
        let initialized: Result<(), BenchError> = async {
            if definition.initialize_subscription() {
                pair.subscriber.initialize_subscription(topic).await?;
            }
            drop(pair.subscriber.subscribe(topic).await?);
            Ok(())
        }
        .await;
        let closed = pair.close().await;
        initialized.and(closed)
    }

    async fn measure(
        &self,
        definition: &BackendDefinition,
        pair: &BackendPair,
        topic: &str,
        config: &BenchmarkConfig,
        stage: &mut StageTracker<'_>,
    ) -> Result<(BenchmarkResults, BenchmarkResults), BenchError> {
        let messages_count = definition.resolve_messages_count(config.messages_count);
        let payload = create_payload(config.message_size)?;
        info!(
            "Publishing {} messages of {} B to topic {topic}",
            messages_count.human_count_bare(),
            config.message_size
        );
        let summary = PublishPipeline::new(
            pair.publisher.clone(),
            self.options.publish_workers,
            definition.id_generator(),
        )
        .with_cancellation(self.cancellation.clone())
        .publish(topic, payload, messages_count)
        .await?;

        stage.advance(BenchmarkStage::Consuming)?;
        let counter = self
            .consume(definition, pair, topic, messages_count)
            .await?;

        stage.advance(BenchmarkStage::Reporting)?;
        let publish =
            BenchmarkResults::from_rate(summary.count, config.message_size, summary.rate);
        let consume = BenchmarkResults::from_rate(
            counter.count(),
            config.message_size,
            counter.mean_per_second(),
        );
        Ok((publish, consume))
    }

    async fn consume(
        &self,
        definition: &BackendDefinition,
        pair: &BackendPair,
        topic: &str,
        messages_count: u64,
    ) -> Result<Arc<MessageCounter>, BenchError> {
        let mut counter = MessageCounter::new(messages_count);
        if definition.at_least_once() {
            counter = counter.with_deduplication();
        }
        let counter = Arc::new(counter);
        let stop_reporter = self.cancellation.child_token();
        let reporter = spawn_progress_reporter(
            counter.clone(),
            self.options.progress_interval,
            stop_reporter.clone(),
        );

        let consumed = match pair.subscriber.subscribe(topic).await {
            Ok(stream) => self.drain(topic, stream, &counter).await,
            Err(error) => Err(error),
        };
        stop_reporter.cancel();
        reporter.await?;
        consumed?;

        info!(
            "Consumed {} messages from topic {topic} in {:.2?}, {:.2} msg/s",
            counter.count().human_count_bare(),
            counter.elapsed(),
            counter.mean_per_second()
        );
        Ok(counter)
    }

    async fn drain(
        &self,
        topic: &str,
        stream: DeliveryStream,
        counter: &Arc<MessageCounter>,
    ) -> Result<(), BenchError> {
        let mut consumers = JoinSet::new();
        for consumer_id in 1..=self.options.consumers.max(1) {
            consumers.spawn(Consumer::new(consumer_id, stream.clone(), counter.clone()).run());
        }
        drop(stream);

        let completed = self
            .wait_for_completion(topic, counter, &mut consumers)
            .await;
        consumers.shutdown().await;
        completed
    }

    async fn wait_for_completion(
        &self,
        topic: &str,
        counter: &MessageCounter,
        consumers: &mut JoinSet<Result<u64, BenchError>>,
    ) -> Result<(), BenchError> {
        let timeout = async {
            match self.options.consume_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => pending().await,
            }
        };
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                biased;
                _ = counter.completed() => return Ok(()),
                _ = self.cancellation.cancelled() => return Err(BenchError::Cancelled),
                _ = &mut timeout => {
                    return Err(BenchError::ConsumeTimeout {
                        timeout: self.options.consume_timeout.unwrap_or_default(),
                        received: counter.count(),
                        expected: counter.expected(),
                    });
                }
                joined = consumers.join_next() => match joined {
                    Some(Ok(Ok(_))) => continue,
                    Some(Ok(Err(error))) => return Err(error),
                    Some(Err(error)) => return Err(error.into()),
                    None if counter.is_completed() => return Ok(()),
                    None => {
                        return Err(BenchError::StreamClosed {
                            topic: topic.to_owned(),
                            received: counter.count(),
                            expected: counter.expected(),
                        });
                    }
                },
            }
        }
    }
}
