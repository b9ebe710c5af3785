use super::{DeliveryStream, Subscriber};
use crate::error::BenchError;
use crate::pubsub::message::Delivery;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub type SubscriberFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Box<dyn Subscriber>, BenchError>> + Send + Sync>;

/// Exposes K independently constructed subscribers as a single subscriber.
///
/// Every `subscribe` call builds K children through the factory and merges their
/// streams into one rendezvous channel, one forwarding task per child. The merged
/// stream ends once all child streams ended. Ordering across children is arrival
/// order only.
pub struct MultiplexedSubscriber {
    factory: SubscriberFactory,
    multiplicity: usize,
    children: Mutex<Vec<Box<dyn Subscriber>>>,
    forwarders: Mutex<JoinSet<()>>,
}

impl MultiplexedSubscriber {
    pub fn new(factory: SubscriberFactory, multiplicity: usize) -> Self {
        Self {
            factory,
            multiplicity: multiplicity.max(1),
            children: Mutex::new(Vec::new()),
            forwarders: Mutex::new(JoinSet::new()),
        }
    }

    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    async fn subscribe_children(
        &self,
        topic: &str,
    ) -> Result<(Vec<Box<dyn Subscriber>>, Vec<DeliveryStream>), BenchError> {
        let mut children = Vec::with_capacity(self.multiplicity);
        let mut streams = Vec::with_capacity(self.multiplicity);
        for index in 0..self.multiplicity {
            let child = match (self.factory)().await {
                Ok(child) => child,
                Err(error) => {
                    error!("Cannot create subscriber #{index} for topic {topic}: {error}");
                    let _ = close_all(children).await;
                    return Err(error);
                }
            };
            match child.subscribe(topic).await {
                Ok(stream) => {
                    children.push(child);
                    streams.push(stream);
                }
                Err(error) => {
                    error!("Subscriber #{index} cannot subscribe to topic {topic}: {error}");
                    children.push(child);
                    let _ = close_all(children).await;
                    return Err(error);
                }
            }
        }
        Ok((children, streams))
    }
}

#[async_trait]
impl Subscriber for MultiplexedSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, BenchError> {
        let (children, streams) = self.subscribe_children(topic).await?;
        let (sink, merged) = flume::bounded(0);
        {
            let mut forwarders = self.forwarders.lock().await;
            for (index, stream) in streams.into_iter().enumerate() {
                forwarders.spawn(forward(index, stream, sink.clone()));
            }
        }
        self.children.lock().await.extend(children);
        info!(
            "Subscribed {} multiplexed subscribers to topic {topic}",
            self.multiplicity
        );
        Ok(merged)
    }

    async fn initialize_subscription(&self, topic: &str) -> Result<(), BenchError> {
        let child = (self.factory)().await?;
        let initialized = child.initialize_subscription(topic).await;
        let closed = child.close().await;
        initialized.and(closed)
    }

    /// Closes every child even when some of them fail, returning the first error.
    async fn close(&self) -> Result<(), BenchError> {
        let children = std::mem::take(&mut *self.children.lock().await);
        let result = close_all(children).await;
        self.forwarders.lock().await.shutdown().await;
        result
    }
}

async fn forward(index: usize, stream: DeliveryStream, sink: flume::Sender<Delivery>) {
    while let Ok(delivery) = stream.recv_async().await {
        if sink.send_async(delivery).await.is_err() {
            debug!("Merged stream dropped, stopping forwarder #{index}");
            return;
        }
    }
    debug!("Stream of subscriber #{index} ended");
}

async fn close_all(children: Vec<Box<dyn Subscriber>>) -> Result<(), BenchError> {
    let mut first_error = None;
    for (index, child) in children.iter().enumerate() {
        if let Err(error) = child.close().await {
            error!("Cannot close subscriber #{index}: {error}");
            first_error.get_or_insert(error);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
