//! In-process event bus with one unbounded queue per subscription.
//!
//! `emit` fans the event out to every subscription whose [`KindPattern`]
//! matches, in emission order. Queues are unbounded, so a slow subscriber
//! never loses events: every matching emit is delivered exactly once.
//! Subscriptions whose stream was dropped are pruned on the next emit.

use async_lifecycle_core::event::DispatchedEvent;
use async_lifecycle_core::event_bus::{EventBus, EventBusError, EventStream, KindPattern};
use futures::future::BoxFuture;
use futures::stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

type Subscribers = Vec<(KindPattern, mpsc::UnboundedSender<DispatchedEvent>)>;

/// In-process event bus.
///
/// Cheap to clone; clones share the same subscriptions.
///
/// # Example
///
/// ```
/// use async_lifecycle_core::prelude::*;
/// use async_lifecycle_runtime::InMemoryEventBus;
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let ping: Lifecycle<(), ()> = create_lifecycle("ping").unwrap();
///
/// let mut events = bus.subscribe(KindPattern::Lifecycle(ping.name().clone())).await.unwrap();
/// bus.emit_event(&ping.trigger.create_empty()).await.unwrap();
///
/// let received = events.next().await.unwrap();
/// assert_eq!(received.kind.as_str(), "ping/trigger");
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryEventBus {
    subscribers: Arc<Mutex<Subscribers>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl InMemoryEventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Close the bus
    ///
    /// Later emits and subscribes fail with [`EventBusError::Closed`], and
    /// every open event stream ends, including events still queued.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closing event bus");
            self.shutdown.send_replace(true);
            self.subscribers().clear();
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of open subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers.len()
    }

    // A panic while holding the lock cannot leave the list half-updated.
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, event: &DispatchedEvent) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(pattern, sender)| {
            if pattern.matches(&event.kind) {
                sender.send(event.clone()).is_ok()
            } else {
                !sender.is_closed()
            }
        });
    }

    fn event_stream(&self, pattern: KindPattern) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers().push((pattern, sender));

        Box::pin(stream::unfold(
            (receiver, self.shutdown.subscribe()),
            |(mut receiver, mut shutdown)| async move {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|closed| *closed) => None,
                    received = receiver.recv() => received,
                };
                received.map(|event| (event, (receiver, shutdown)))
            },
        ))
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, event: DispatchedEvent) -> BoxFuture<'_, Result<(), EventBusError>> {
        let result = if self.is_closed() {
            Err(EventBusError::Closed)
        } else {
            tracing::trace!(kind = %event.kind, "Emitting event");
            // No matching subscribers is not an error: the event is simply dropped.
            self.deliver(&event);
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }

    fn subscribe(&self, pattern: KindPattern) -> BoxFuture<'_, Result<EventStream, EventBusError>> {
        let result = if self.is_closed() {
            Err(EventBusError::Closed)
        } else {
            tracing::trace!(?pattern, "Registering subscription");
            Ok(self.event_stream(pattern))
        };
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use async_lifecycle_core::event::{EventKind, LifecycleName, Role};
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn event(kind: &str, payload: serde_json::Value) -> DispatchedEvent {
        DispatchedEvent::new(EventKind::from_raw(kind), payload)
    }

    #[tokio::test]
    async fn emit_without_subscribers_succeeds() {
        let bus = InMemoryEventBus::new();
        assert!(bus.emit(event("a/trigger", json!(1))).await.is_ok());
    }

    #[tokio::test]
    async fn subscription_is_active_once_subscribe_returns() {
        let bus = InMemoryEventBus::new();
        // Registration happens synchronously inside subscribe(); the future
        // resolves immediately.
        let mut stream = bus.subscribe(KindPattern::Any).await.unwrap();
        bus.emit(event("a/trigger", json!(1))).await.unwrap();
        assert_eq!(stream.next().await.unwrap().payload, json!(1));
    }

    #[tokio::test]
    async fn streams_filter_by_pattern() {
        let bus = InMemoryEventBus::new();
        let name = LifecycleName::new("a").unwrap();
        let mut triggers = bus
            .subscribe(KindPattern::Exact(name.kind(Role::Trigger)))
            .await
            .unwrap();

        bus.emit(event("a/pending", json!(null))).await.unwrap();
        bus.emit(event("b/trigger", json!(0))).await.unwrap();
        bus.emit(event("a/trigger", json!(2))).await.unwrap();

        let received = triggers.next().await.unwrap();
        assert_eq!(received.kind, "a/trigger");
        assert_eq!(received.payload, json!(2));
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_event_in_order() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe(KindPattern::Any).await.unwrap();
        let mut second = bus.subscribe(KindPattern::Any).await.unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        for i in 0..3 {
            bus.emit(event("a/trigger", json!(i))).await.unwrap();
        }

        for stream in [&mut first, &mut second] {
            let payloads: Vec<_> = stream.take(3).map(|e| e.payload).collect().await;
            assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
        }
    }

    #[tokio::test]
    async fn slow_subscriber_receives_every_event() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(KindPattern::Any).await.unwrap();

        // Nobody reads while the burst is emitted.
        for i in 0..5_000 {
            bus.emit(event("a/trigger", json!(i))).await.unwrap();
        }

        let payloads: Vec<_> = stream.take(5_000).map(|e| e.payload).collect().await;
        assert_eq!(payloads.len(), 5_000);
        assert_eq!(payloads[0], json!(0));
        assert_eq!(payloads[4_999], json!(4_999));
    }

    #[tokio::test]
    async fn dropped_streams_are_pruned() {
        let bus = InMemoryEventBus::new();
        let kept = bus.subscribe(KindPattern::Any).await.unwrap();
        let dropped = bus.subscribe(KindPattern::Any).await.unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.emit(event("a/trigger", json!(1))).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_emits() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(KindPattern::Any).await.unwrap();

        bus.close();
        assert!(bus.is_closed());

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should end after close");
        assert!(next.is_none());

        assert_eq!(
            bus.emit(event("a/trigger", json!(1))).await,
            Err(EventBusError::Closed)
        );
        assert!(matches!(
            bus.subscribe(KindPattern::Any).await,
            Err(EventBusError::Closed)
        ));
    }
}
