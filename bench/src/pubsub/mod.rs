pub mod message;
pub mod multiplexer;

use crate::error::BenchError;
use async_trait::async_trait;
use message::{Delivery, Message};
use std::sync::Arc;
use tracing::error;

/// Stream of deliveries returned by a subscription. Multi-consumer, so several
/// consumer loops can drain the same subscription.
pub type DeliveryStream = flume::Receiver<Delivery>;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BenchError>;
    async fn close(&self) -> Result<(), BenchError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, BenchError>;

    /// Provisions whatever the backend needs before messages published to `topic`
    /// become retrievable. Most backends need nothing.
    async fn initialize_subscription(&self, _topic: &str) -> Result<(), BenchError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BenchError>;
}

/// Publisher and subscriber built together by a backend constructor.
#[derive(Clone)]
pub struct BackendPair {
    pub publisher: Arc<dyn Publisher>,
    pub subscriber: Arc<dyn Subscriber>,
}

impl BackendPair {
    pub fn new(publisher: Arc<dyn Publisher>, subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            publisher,
            subscriber,
        }
    }

    /// Closes the publisher, then the subscriber. Both are always attempted and the
    /// first failure is returned.
    pub async fn close(&self) -> Result<(), BenchError> {
        let publisher = self.publisher.close().await;
        if let Err(error) = &publisher {
            error!("Cannot close publisher: {error}");
        }
        let subscriber = self.subscriber.close().await;
        if let Err(error) = &subscriber {
            error!("Cannot close subscriber: {error}");
        }
        publisher.and(subscriber)
    }
}
