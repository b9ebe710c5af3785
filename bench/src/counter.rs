use crate::pubsub::message::MessageId;
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Counts consumed messages and releases waiters once the expected total is reached.
///
/// The mean rate is measured from the counter creation to the moment the expected
/// total was observed (or to now, while the total is not reached yet).
#[derive(Debug)]
pub struct MessageCounter {
    count: AtomicU64,
    expected: u64,
    started_at: Instant,
    completed_at: OnceLock<Instant>,
    seen: Option<DashSet<MessageId>>,
    completion: watch::Sender<bool>,
}

impl MessageCounter {
    pub fn new(expected: u64) -> Self {
        Self::started_at(expected, Instant::now())
    }

    pub fn started_at(expected: u64, started_at: Instant) -> Self {
        let counter = Self {
            count: AtomicU64::new(0),
            expected,
            started_at,
            completed_at: OnceLock::new(),
            seen: None,
            completion: watch::Sender::new(false),
        };
        if expected == 0 {
            counter.complete(started_at);
        }
        counter
    }

    /// Makes `increment_unique` ignore identifiers that were already counted.
    pub fn with_deduplication(mut self) -> Self {
        self.seen = Some(DashSet::new());
        self
    }

    /// Returns the count after this increment.
    pub fn increment(&self) -> u64 {
        let current = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if current == self.expected {
            self.complete(Instant::now());
        }
        current
    }

    /// Counts the message unless deduplication is enabled and `id` was seen before.
    pub fn increment_unique(&self, id: &MessageId) -> bool {
        if let Some(seen) = &self.seen {
            if !seen.insert(id.clone()) {
                return false;
            }
        }
        self.increment();
        true
    }

    fn complete(&self, at: Instant) {
        if self.completed_at.set(at).is_ok() {
            self.completion.send_replace(true);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn is_completed(&self) -> bool {
        *self.completion.borrow()
    }

    /// Resolves once the expected number of messages was counted.
    pub async fn completed(&self) {
        let mut completion = self.completion.subscribe();
        let _ = completion.wait_for(|completed| *completed).await;
    }

    pub fn elapsed(&self) -> Duration {
        self.measured_until().saturating_duration_since(self.started_at)
    }

    pub fn mean_per_second(&self) -> f64 {
        self.mean_per_second_at(self.measured_until())
    }

    pub fn mean_per_second_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.count() as f64 / elapsed
    }

    fn measured_until(&self) -> Instant {
        self.completed_at
            .get()
            .copied()
            .unwrap_or_else(Instant::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_increments_should_not_lose_updates() {
        const TASKS: u64 = 64;
        const PER_TASK: u64 = 10_000;
        let counter = Arc::new(MessageCounter::new(TASKS * PER_TASK));

        let handles = (0..TASKS)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move {
                    for _ in 0..PER_TASK {
                        counter.increment();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.count(), TASKS * PER_TASK);
        assert!(counter.is_completed());
    }

    #[test]
    fn mean_should_halve_when_elapsed_time_doubles() {
        let start = Instant::now();
        let counter = MessageCounter::started_at(100, start);
        for _ in 0..10 {
            counter.increment();
        }

        let after_one_second = counter.mean_per_second_at(start + Duration::from_secs(1));
        let after_two_seconds = counter.mean_per_second_at(start + Duration::from_secs(2));

        assert_eq!(after_one_second, 10.0);
        assert_eq!(after_two_seconds, 5.0);
    }

    #[test]
    fn mean_should_be_zero_without_elapsed_time() {
        let start = Instant::now();
        let counter = MessageCounter::started_at(10, start);
        counter.increment();
        assert_eq!(counter.mean_per_second_at(start), 0.0);
    }

    #[tokio::test]
    async fn completed_should_resolve_once_expected_count_is_reached() {
        let counter = Arc::new(MessageCounter::new(3));
        let waiter = {
            let counter = counter.clone();
            tokio::spawn(async move { counter.completed().await })
        };

        counter.increment();
        counter.increment();
        assert!(!counter.is_completed());
        counter.increment();

        waiter.await.unwrap();
        assert!(counter.is_completed());
    }

    #[tokio::test]
    async fn zero_expected_messages_should_be_completed_immediately() {
        let counter = MessageCounter::new(0);
        counter.completed().await;
        assert_eq!(counter.mean_per_second(), 0.0);
    }

    #[test]
    fn elapsed_should_stop_at_completion() {
        let start = Instant::now();
        let counter = MessageCounter::started_at(1, start);
        counter.increment();
        let elapsed = counter.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(counter.elapsed(), elapsed);
    }

    #[test]
    fn duplicates_should_be_counted_once_with_deduplication() {
        let counter = MessageCounter::new(2).with_deduplication();
        let first = MessageId::from("first");

        assert!(counter.increment_unique(&first));
        assert!(!counter.increment_unique(&first));
        assert!(!counter.is_completed());
        assert!(counter.increment_unique(&MessageId::from("second")));

        assert_eq!(counter.count(), 2);
        assert!(counter.is_completed());
    }

    #[test]
    fn duplicates_should_be_counted_without_deduplication() {
        let counter = MessageCounter::new(2);
        let id = MessageId::from("same");
        counter.increment_unique(&id);
        counter.increment_unique(&id);
        assert_eq!(counter.count(), 2);
    }
}
