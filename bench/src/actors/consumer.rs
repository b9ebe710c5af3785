use crate::counter::MessageCounter;
use crate::error::BenchError;
use crate::pubsub::DeliveryStream;
use std::sync::Arc;
use tracing::debug;

/// Drains a delivery stream, acknowledging every delivery before counting it.
pub struct Consumer {
    consumer_id: usize,
    stream: DeliveryStream,
    counter: Arc<MessageCounter>,
}

impl Consumer {
    pub fn new(consumer_id: usize, stream: DeliveryStream, counter: Arc<MessageCounter>) -> Self {
        Self {
            consumer_id,
            stream,
            counter,
        }
    }

    /// Returns the number of messages this consumer counted. Stops once the counter
    /// is completed or the stream ends; an acknowledgement failure is fatal.
    pub async fn run(self) -> Result<u64, BenchError> {
        let mut consumed = 0;
        while let Ok(delivery) = self.stream.recv_async().await {
            let message = delivery.ack()?;
            if self.counter.increment_unique(&message.id) {
                consumed += 1;
            }
            if self.counter.is_completed() {
                break;
            }
        }
        debug!(
            "Consumer #{} → counted {} messages",
            self.consumer_id, consumed
        );
        Ok(consumed)
    }
}
