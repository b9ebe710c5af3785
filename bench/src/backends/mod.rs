pub mod memory;

use crate::config::BenchSettings;
use crate::error::BenchError;
use crate::pubsub::message::IdGenerator;
use crate::pubsub::multiplexer::{MultiplexedSubscriber, SubscriberFactory};
use crate::pubsub::{BackendPair, Subscriber};
use futures::future::BoxFuture;
use futures::FutureExt;
use memory::{MemoryBroker, MemoryPublisher, MemorySubscriber};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

/// Used when neither the run nor the backend specify how many messages to send.
pub const DEFAULT_MESSAGES_COUNT: u64 = 1_000_000;

pub const MEMORY: &str = "memory";
pub const MEMORY_MULTIPLEXED: &str = "memory-multiplexed";

pub type BackendConstructor =
    Arc<dyn Fn() -> BoxFuture<'static, Result<BackendPair, BenchError>> + Send + Sync>;

/// How to build and drive one backend.
#[derive(Clone)]
pub struct BackendDefinition {
    constructor: BackendConstructor,
    messages_count: Option<u64>,
    id_generator: IdGenerator,
    initialize_subscription: bool,
    at_least_once: bool,
}

impl BackendDefinition {
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BackendPair, BenchError>> + Send + 'static,
    {
        Self {
            constructor: Arc::new(move || constructor().boxed()),
            messages_count: None,
            id_generator: IdGenerator::default(),
            initialize_subscription: false,
            at_least_once: false,
        }
    }

    /// Default message count for runs that do not request one.
    pub fn with_messages_count(mut self, messages_count: u64) -> Self {
        self.messages_count = Some(messages_count);
        self
    }

    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Call `Subscriber::initialize_subscription` before the first publish.
    pub fn with_initialize_subscription(mut self, initialize_subscription: bool) -> Self {
        self.initialize_subscription = initialize_subscription;
        self
    }

    /// The backend may redeliver messages; consumed messages are then deduplicated
    /// by identifier.
    pub fn with_at_least_once(mut self, at_least_once: bool) -> Self {
        self.at_least_once = at_least_once;
        self
    }

    pub async fn create(&self) -> Result<BackendPair, BenchError> {
        (self.constructor)().await
    }

    pub fn resolve_messages_count(&self, requested: u64) -> u64 {
        if requested > 0 {
            return requested;
        }
        self.messages_count.unwrap_or(DEFAULT_MESSAGES_COUNT)
    }

    pub fn id_generator(&self) -> IdGenerator {
        self.id_generator
    }

    pub fn initialize_subscription(&self) -> bool {
        self.initialize_subscription
    }

    pub fn at_least_once(&self) -> bool {
        self.at_least_once
    }
}

impl Debug for BackendDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDefinition")
            .field("messages_count", &self.messages_count)
            .field("id_generator", &self.id_generator)
            .field("initialize_subscription", &self.initialize_subscription)
            .field("at_least_once", &self.at_least_once)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, BackendDefinition>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any backend previously registered under `name`.
    pub fn register(&mut self, name: impl Into<String>, definition: BackendDefinition) {
        self.backends.insert(name.into(), definition);
    }

    pub fn with(mut self, name: impl Into<String>, definition: BackendDefinition) -> Self {
        self.register(name, definition);
        self
    }

    pub fn get(&self, name: &str) -> Result<&BackendDefinition, BenchError> {
        self.backends
            .get(name)
            .ok_or_else(|| BenchError::UnknownBackend(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

/// Registry with the in-memory backends. Each backend keeps a single broker for all
/// the pairs it builds, so what one pair provisions is visible to the next.
pub fn default_registry(settings: &BenchSettings) -> BackendRegistry {
    let memory_broker = MemoryBroker::new();
    let memory = BackendDefinition::new(move || {
        let broker = memory_broker.clone();
        async move {
            Ok::<_, BenchError>(BackendPair::new(
                Arc::new(MemoryPublisher::new(broker.clone())),
                Arc::new(MemorySubscriber::new(broker)),
            ))
        }
    });

    let multiplexed_broker = MemoryBroker::new();
    let subscribers_count = settings.subscribers_count();
    let memory_multiplexed = BackendDefinition::new(move || {
        let broker = multiplexed_broker.clone();
        async move {
            let factory: SubscriberFactory = {
                let broker = broker.clone();
                Arc::new(move || {
                    let subscriber: Box<dyn Subscriber> =
                        Box::new(MemorySubscriber::new(broker.clone()));
                    async move { Ok::<_, BenchError>(subscriber) }.boxed()
                })
            };
            Ok::<_, BenchError>(BackendPair::new(
                Arc::new(MemoryPublisher::new(broker)),
                Arc::new(MultiplexedSubscriber::new(factory, subscribers_count)),
            ))
        }
    })
    .with_id_generator(IdGenerator::TimeOrdered)
    .with_initialize_subscription(true)
    .with_at_least_once(true);

    BackendRegistry::new()
        .with(MEMORY, memory)
        .with(MEMORY_MULTIPLEXED, memory_multiplexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn unknown_backend_should_be_a_configuration_error() {
        let registry = default_registry(&BenchSettings::default());
        let error = registry.get("kafka").unwrap_err();
        assert!(error.is_configuration_error());
        assert_eq!(error.to_string(), "Unknown PubSub: kafka");
    }

    #[test]
    fn default_registry_should_list_memory_backends() {
        let registry = default_registry(&BenchSettings::default());
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![MEMORY, MEMORY_MULTIPLEXED]
        );
    }

    #[test_case(500, None, 500; "requested count wins")]
    #[test_case(0, Some(1_000), 1_000; "backend default")]
    #[test_case(0, None, DEFAULT_MESSAGES_COUNT; "global default")]
    fn messages_count_should_be_resolved(requested: u64, backend: Option<u64>, expected: u64) {
        let mut definition = BackendDefinition::new(|| async {
            Err::<BackendPair, _>(BenchError::InvalidConfiguration("unused".to_owned()))
        });
        if let Some(count) = backend {
            definition = definition.with_messages_count(count);
        }
        assert_eq!(definition.resolve_messages_count(requested), expected);
    }

    #[tokio::test]
    async fn memory_pairs_should_share_one_broker() {
        let registry = default_registry(&BenchSettings::default());
        let definition = registry.get(MEMORY).unwrap();
        let first = definition.create().await.unwrap();
        let second = definition.create().await.unwrap();

        first
            .publisher
            .publish(
                "topic",
                crate::pubsub::message::Message::new("id".into(), bytes::Bytes::new()),
            )
            .await
            .unwrap();
        let stream = second.subscriber.subscribe("topic").await.unwrap();
        let delivery = stream.recv_async().await.unwrap();

        assert_eq!(delivery.ack().unwrap().id.to_string(), "id");
        first.close().await.unwrap();
        second.close().await.unwrap();
    }
}
