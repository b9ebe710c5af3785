use crate::error::BenchError;
use crate::pubsub::message::{AckOutcome, Delivery, Message};
use crate::pubsub::{DeliveryStream, Publisher, Subscriber};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// In-process broker with one persistent queue per topic.
///
/// Messages published before anyone subscribed are kept. Subscriptions on the same
/// topic compete for messages, each subscription hands out one message at a time
/// and waits for its acknowledgement; a nack or a dropped delivery puts the message
/// back on the queue.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: DashMap<String, TopicQueue>,
}

#[derive(Debug, Clone)]
struct TopicQueue {
    sender: flume::Sender<Message>,
    receiver: flume::Receiver<Message>,
}

impl TopicQueue {
    fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    fn requeue(&self, message: Message) {
        trace!("Requeueing message {}", message.id);
        // The queue owns a receiver, so sending cannot fail.
        let _ = self.sender.send(message);
    }
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn topic(&self, topic: &str) -> TopicQueue {
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(TopicQueue::new)
            .clone()
    }

    /// Messages waiting in the topic queue, not counting in-flight deliveries.
    pub fn pending(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|queue| queue.receiver.len())
            .unwrap_or(0)
    }
}

pub struct MemoryPublisher {
    broker: Arc<MemoryBroker>,
    closed: AtomicBool,
}

impl MemoryPublisher {
    pub fn new(broker: Arc<MemoryBroker>) -> Self {
        Self {
            broker,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BenchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BenchError::Publish {
                topic: topic.to_owned(),
                reason: "publisher is closed".to_owned(),
            });
        }
        self.broker.topic(topic).requeue(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

pub struct MemorySubscriber {
    broker: Arc<MemoryBroker>,
    shutdown: CancellationToken,
    subscriptions: Mutex<JoinSet<()>>,
}

impl MemorySubscriber {
    pub fn new(broker: Arc<MemoryBroker>) -> Self {
        Self {
            broker,
            shutdown: CancellationToken::new(),
            subscriptions: Mutex::new(JoinSet::new()),
        }
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream, BenchError> {
        if self.shutdown.is_cancelled() {
            return Err(BenchError::Subscribe {
                topic: topic.to_owned(),
                reason: "subscriber is closed".to_owned(),
            });
        }
        let queue = self.broker.topic(topic);
        let (output, stream) = flume::bounded(0);
        self.subscriptions
            .lock()
            .await
            .spawn(deliver(queue, output, self.shutdown.child_token()));
        debug!("Subscribed to in-memory topic {topic}");
        Ok(stream)
    }

    async fn initialize_subscription(&self, topic: &str) -> Result<(), BenchError> {
        self.broker.topic(topic);
        Ok(())
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.shutdown.cancel();
        // Deliver tasks put unacknowledged messages back before exiting.
        let mut subscriptions = self.subscriptions.lock().await;
        while let Some(joined) = subscriptions.join_next().await {
            joined?;
        }
        Ok(())
    }
}

async fn deliver(
    queue: TopicQueue,
    output: flume::Sender<Delivery>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            message = queue.receiver.recv_async() => match message {
                Ok(message) => message,
                Err(_) => return,
            },
        };

        let (acker, mut acknowledgement) = oneshot::channel();
        let delivery = Delivery::new(message.clone(), acker);
        let sent = tokio::select! {
            biased;
            sent = output.send_async(delivery) => sent.is_ok(),
            _ = shutdown.cancelled() => false,
        };
        if !sent {
            queue.requeue(message);
            return;
        }

        let acknowledged = tokio::select! {
            biased;
            outcome = &mut acknowledgement => Some(outcome),
            _ = shutdown.cancelled() => None,
        };
        let outcome = match acknowledged {
            Some(outcome) => outcome,
            // An ack may have landed right as the subscriber was closed.
            None => match acknowledgement.try_recv() {
                Ok(outcome) => Ok(outcome),
                Err(_) => {
                    queue.requeue(message);
                    return;
                }
            },
        };
        match outcome {
            Ok(AckOutcome::Ack) => {}
            Ok(AckOutcome::Nack) | Err(_) => queue.requeue(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::message::MessageId;
    use bytes::Bytes;

    fn message(id: &str) -> Message {
        Message::new(MessageId::from(id), Bytes::from_static(b"payload"))
    }

    #[tokio::test]
    async fn messages_published_before_subscribing_should_be_delivered() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker.clone());
        publisher.publish("topic", message("a")).await.unwrap();
        publisher.publish("topic", message("b")).await.unwrap();

        let stream = subscriber.subscribe("topic").await.unwrap();
        let first = stream.recv_async().await.unwrap().ack().unwrap();
        let second = stream.recv_async().await.unwrap().ack().unwrap();

        assert_eq!(first.id, MessageId::from("a"));
        assert_eq!(second.id, MessageId::from("b"));
        subscriber.close().await.unwrap();
    }

    #[tokio::test]
    async fn nacked_message_should_be_redelivered() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker.clone());
        publisher.publish("topic", message("a")).await.unwrap();
        let stream = subscriber.subscribe("topic").await.unwrap();

        stream.recv_async().await.unwrap().nack().unwrap();
        let redelivered = stream.recv_async().await.unwrap().ack().unwrap();

        assert_eq!(redelivered.id, MessageId::from("a"));
        subscriber.close().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_subscription_should_requeue_message() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker.clone());
        publisher.publish("topic", message("a")).await.unwrap();

        drop(subscriber.subscribe("topic").await.unwrap());
        subscriber.close().await.unwrap();

        assert_eq!(broker.pending("topic"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn acknowledged_message_should_not_be_requeued_on_close() {
        for _ in 0..200 {
            let broker = MemoryBroker::new();
            let publisher = MemoryPublisher::new(broker.clone());
            let subscriber = MemorySubscriber::new(broker.clone());
            publisher.publish("topic", message("a")).await.unwrap();
            let stream = subscriber.subscribe("topic").await.unwrap();

            stream.recv_async().await.unwrap().ack().unwrap();
            subscriber.close().await.unwrap();

            assert_eq!(broker.pending("topic"), 0);
        }
    }

    #[tokio::test]
    async fn unacknowledged_message_should_be_requeued_on_close() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let subscriber = MemorySubscriber::new(broker.clone());
        publisher.publish("topic", message("a")).await.unwrap();
        let stream = subscriber.subscribe("topic").await.unwrap();

        let delivery = stream.recv_async().await.unwrap();
        subscriber.close().await.unwrap();

        assert_eq!(broker.pending("topic"), 1);
        assert!(delivery.ack().is_err());
    }

    #[tokio::test]
    async fn closed_publisher_should_reject_messages() {
        let publisher = MemoryPublisher::new(MemoryBroker::new());
        publisher.close().await.unwrap();

        let result = publisher.publish("topic", message("a")).await;

        assert!(matches!(result, Err(BenchError::Publish { .. })));
    }

    #[tokio::test]
    async fn closed_subscriber_should_reject_subscriptions() {
        let subscriber = MemorySubscriber::new(MemoryBroker::new());
        subscriber.close().await.unwrap();

        let result = subscriber.subscribe("topic").await;

        assert!(matches!(result, Err(BenchError::Subscribe { .. })));
    }

    #[tokio::test]
    async fn initialize_subscription_should_provision_topic() {
        let broker = MemoryBroker::new();
        let subscriber = MemorySubscriber::new(broker.clone());

        subscriber.initialize_subscription("topic").await.unwrap();

        assert!(broker.topics.contains_key("topic"));
        assert_eq!(broker.pending("topic"), 0);
    }

    #[tokio::test]
    async fn competing_subscriptions_should_share_messages() {
        let broker = MemoryBroker::new();
        let publisher = MemoryPublisher::new(broker.clone());
        let first = MemorySubscriber::new(broker.clone());
        let second = MemorySubscriber::new(broker.clone());
        for i in 0..10 {
            publisher
                .publish("topic", message(&i.to_string()))
                .await
                .unwrap();
        }
        let streams = [
            first.subscribe("topic").await.unwrap(),
            second.subscribe("topic").await.unwrap(),
        ];

        let mut received = 0;
        while received < 10 {
            let delivery = tokio::select! {
                delivery = streams[0].recv_async() => delivery.unwrap(),
                delivery = streams[1].recv_async() => delivery.unwrap(),
            };
            delivery.ack().unwrap();
            received += 1;
        }

        assert_eq!(broker.pending("topic"), 0);
        first.close().await.unwrap();
        second.close().await.unwrap();
    }
}
