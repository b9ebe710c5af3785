use async_trait::async_trait;
use pubsub_bench::backends::{BackendDefinition, BackendRegistry};
use pubsub_bench::error::BenchError;
use pubsub_bench::pubsub::message::{Delivery, Message};
use pubsub_bench::pubsub::{BackendPair, DeliveryStream, Publisher, Subscriber};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Collects published messages; every subscription replays them, optionally
/// stopping early or stalling forever.
#[derive(Default)]
pub struct ScriptedBackend {
    pub published: Mutex<Vec<Message>>,
    pub publish_calls: AtomicU64,
    pub fail_publish_at: Option<u64>,
    /// 1-based index of the subscriber close call that fails.
    pub fail_subscriber_close_on: Option<u64>,
    pub subscriber_closes: AtomicU64,
    pub deliver_at_most: Option<usize>,
    pub duplicate_every_message: bool,
    pub stall: bool,
    pub initialize_subscription: bool,
    pub initialize_calls: AtomicU64,
    pub subscriber_closed: AtomicBool,
    pub publisher_closed: AtomicBool,
}

impl ScriptedBackend {
    pub fn registry(self: &Arc<Self>, name: &str) -> BackendRegistry {
        let backend = self.clone();
        let definition = BackendDefinition::new(move || {
            let backend = backend.clone();
            async move {
                Ok::<_, BenchError>(BackendPair::new(
                    Arc::new(ScriptedPublisher(backend.clone())),
                    Arc::new(ScriptedSubscriber(backend)),
                ))
            }
        })
        .with_at_least_once(self.duplicate_every_message)
        .with_initialize_subscription(self.initialize_subscription);
        BackendRegistry::new().with(name, definition)
    }
}

pub struct ScriptedPublisher(Arc<ScriptedBackend>);

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BenchError> {
        let call = self.0.publish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.fail_publish_at == Some(call) {
            return Err(BenchError::Publish {
                topic: topic.to_owned(),
                reason: "connection reset".to_owned(),
            });
        }
        if let Ok(mut published) = self.0.published.lock() {
            published.push(message);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.0.publisher_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedSubscriber(Arc<ScriptedBackend>);

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    async fn subscribe(&self, _topic: &str) -> Result<DeliveryStream, BenchError> {
        let mut messages = self
            .0
            .published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default();
        if let Some(limit) = self.0.deliver_at_most {
            messages.truncate(limit);
        }
        let duplicate = self.0.duplicate_every_message;
        let stall = self.0.stall;
        let (tx, rx) = flume::unbounded();
        tokio::spawn(async move {
            if stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            for message in messages {
                if duplicate && tx.send(Delivery::auto_acked(message.clone())).is_err() {
                    return;
                }
                if tx.send(Delivery::auto_acked(message)).is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn initialize_subscription(&self, _topic: &str) -> Result<(), BenchError> {
        self.0.initialize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.0.subscriber_closed.store(true, Ordering::SeqCst);
        let call = self.0.subscriber_closes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.fail_subscriber_close_on == Some(call) {
            return Err(BenchError::Close {
                resource: "subscriber".to_owned(),
                reason: "still draining".to_owned(),
            });
        }
        Ok(())
    }
}
