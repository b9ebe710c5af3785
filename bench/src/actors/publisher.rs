use crate::error::BenchError;
use crate::pubsub::message::{IdGenerator, Message};
use crate::pubsub::Publisher;
use bytes::Bytes;
use human_repr::{HumanCount, HumanDuration};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_PUBLISH_WORKERS: usize = 200;
const PROGRESS_STEPS: u64 = 10;

/// A message ready to be published; consumed by exactly one worker.
#[derive(Debug)]
pub struct PublishJob {
    pub topic: Arc<str>,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishSummary {
    pub count: u64,
    pub elapsed: Duration,
    /// Messages per second over the whole publish phase.
    pub rate: f64,
}

impl PublishSummary {
    fn new(count: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let rate = if seconds > 0.0 {
            count as f64 / seconds
        } else {
            0.0
        };
        Self {
            count,
            elapsed,
            rate,
        }
    }
}

/// Publishes `count` copies of one payload through a fixed pool of workers fed by a
/// rendezvous channel, so the dispatcher blocks whenever all workers are busy.
pub struct PublishPipeline {
    publisher: Arc<dyn Publisher>,
    workers: usize,
    id_generator: IdGenerator,
    cancellation: CancellationToken,
}

impl PublishPipeline {
    pub fn new(publisher: Arc<dyn Publisher>, workers: usize, id_generator: IdGenerator) -> Self {
        Self {
            publisher,
            workers: workers.max(1),
            id_generator,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Fails with the first publish error reported by any worker. Nothing is retried.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        count: u64,
    ) -> Result<PublishSummary, BenchError> {
        if count == 0 {
            return Ok(PublishSummary::new(0, Duration::ZERO));
        }

        let topic: Arc<str> = Arc::from(topic);
        let (jobs_tx, jobs_rx) = flume::bounded::<PublishJob>(0);
        let failure = Arc::new(OnceLock::new());
        let abort = self.cancellation.child_token();
        let mut workers = JoinSet::new();
        for worker_id in 1..=self.workers {
            workers.spawn(run_worker(
                worker_id,
                self.publisher.clone(),
                jobs_rx.clone(),
                failure.clone(),
                abort.clone(),
            ));
        }
        drop(jobs_rx);

        let progress_step = (count / PROGRESS_STEPS).max(1);
        let start = Instant::now();
        let mut messages_left = count;
        while messages_left > 0 {
            if messages_left % progress_step == 0 {
                info!("{} messages left", messages_left.human_count_bare());
            }

            let job = PublishJob {
                topic: topic.clone(),
                message: Message::new(self.id_generator.generate(), payload.clone()),
            };
            tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                sent = jobs_tx.send_async(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
            messages_left -= 1;
        }
        drop(jobs_tx);

        while let Some(joined) = workers.join_next().await {
            joined?;
        }
        let elapsed = start.elapsed();

        if let Some(error) = Arc::into_inner(failure).and_then(OnceLock::into_inner) {
            return Err(error);
        }
        if self.cancellation.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        let summary = PublishSummary::new(count, elapsed);
        info!(
            "added {} messages in {}, {:.2} msg/s",
            count,
            elapsed.human_duration(),
            summary.rate
        );
        Ok(summary)
    }
}

async fn run_worker(
    worker_id: usize,
    publisher: Arc<dyn Publisher>,
    jobs: flume::Receiver<PublishJob>,
    failure: Arc<OnceLock<BenchError>>,
    abort: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            job = jobs.recv_async() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let PublishJob { topic, mut message } = job;
        message.set_correlation_id(IdGenerator::ShortUuid.generate().to_string());
        let message_id = message.id.clone();
        if let Err(error) = publisher.publish(&topic, message).await {
            error!("Publish worker #{worker_id} → cannot publish message {message_id}: {error}");
            let _ = failure.set(error);
            abort.cancel();
            break;
        }
    }
    debug!("Publish worker #{worker_id} finished");
}
