//! Event bus decorators for deterministic tests
//!
//! - [`RecordingEventBus`]: records every emitted event in emission order
//! - [`FailingEventBus`]: rejects emits or subscriptions on demand

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning is the only panic source

use async_lifecycle_core::event::{DispatchedEvent, EventKind, LifecycleName, Role};
use async_lifecycle_core::event_bus::{EventBus, EventBusError, EventStream, KindPattern};
use async_lifecycle_runtime::InMemoryEventBus;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Event bus that records every accepted emit before delivering it.
///
/// Recording happens inside `emit`, so the log reflects the exact order
/// in which events reached the bus, independent of subscriber scheduling.
///
/// # Example
///
/// ```
/// use async_lifecycle_core::prelude::*;
/// use async_lifecycle_testing::RecordingEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = RecordingEventBus::new();
/// let ping: Lifecycle<(), ()> = create_lifecycle("ping").unwrap();
///
/// bus.emit_event(&ping.trigger.create_empty()).await.unwrap();
/// assert_eq!(bus.kinds(), vec!["ping/trigger".to_string()]);
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct RecordingEventBus {
    inner: InMemoryEventBus,
    log: Arc<RwLock<Vec<DispatchedEvent>>>,
    changed: Arc<watch::Sender<usize>>,
}

impl RecordingEventBus {
    /// Create a recorder over a fresh in-memory bus
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(InMemoryEventBus::new())
    }

    /// Record emits going to `inner`
    #[must_use]
    pub fn wrap(inner: InMemoryEventBus) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner,
            log: Arc::new(RwLock::new(Vec::new())),
            changed: Arc::new(changed),
        }
    }

    /// The wrapped bus
    #[must_use]
    pub const fn inner(&self) -> &InMemoryEventBus {
        &self.inner
    }

    /// Every recorded event, in emission order
    #[must_use]
    pub fn events(&self) -> Vec<DispatchedEvent> {
        self.log.read().unwrap().clone()
    }

    /// Kind strings of every recorded event, in emission order
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.log
            .read()
            .unwrap()
            .iter()
            .map(|event| event.kind.to_string())
            .collect()
    }

    /// Recorded events of one lifecycle
    #[must_use]
    pub fn events_of(&self, name: &LifecycleName) -> Vec<DispatchedEvent> {
        let pattern = KindPattern::Lifecycle(name.clone());
        self.log
            .read()
            .unwrap()
            .iter()
            .filter(|event| pattern.matches(&event.kind))
            .cloned()
            .collect()
    }

    /// Number of recorded events of one kind
    #[must_use]
    pub fn count(&self, kind: &EventKind) -> usize {
        self.log
            .read()
            .unwrap()
            .iter()
            .filter(|event| &event.kind == kind)
            .count()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().unwrap().len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.read().unwrap().is_empty()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.log.write().unwrap().clear();
        self.changed.send_replace(0);
    }

    /// Wait until `predicate` holds for the recorded log
    ///
    /// Returns the log at that point, or `None` on timeout.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> Option<Vec<DispatchedEvent>>
    where
        F: Fn(&[DispatchedEvent]) -> bool,
    {
        let mut changed = self.changed.subscribe();
        let wait = async {
            loop {
                {
                    let log = self.log.read().unwrap();
                    if predicate(&log) {
                        return Some(log.clone());
                    }
                }
                if changed.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Wait until at least `count` events of `kind` have been recorded
    pub async fn wait_for_count(&self, kind: &EventKind, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| {
            log.iter().filter(|event| &event.kind == kind).count() >= count
        })
        .await
        .is_some()
    }

    /// Wait until `terminals` success or failed events of `name` have been recorded
    pub async fn wait_for_terminals(&self, name: &LifecycleName, terminals: usize, timeout: Duration) -> bool {
        let success = name.kind(Role::Success);
        let failed = name.kind(Role::Failed);
        self.wait_until(timeout, |log| {
            log.iter()
                .filter(|event| event.kind == success || event.kind == failed)
                .count()
                >= terminals
        })
        .await
        .is_some()
    }
}

impl Default for RecordingEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for RecordingEventBus {
    fn emit(&self, event: DispatchedEvent) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            if self.inner.is_closed() {
                return Err(EventBusError::Closed);
            }
            let len = {
                let mut log = self.log.write().unwrap();
                log.push(event.clone());
                log.len()
            };
            self.changed.send_replace(len);
            self.inner.emit(event).await
        })
    }

    fn subscribe(&self, pattern: KindPattern) -> BoxFuture<'_, Result<EventStream, EventBusError>> {
        self.inner.subscribe(pattern)
    }
}

/// Event bus that rejects selected operations.
///
/// Used to exercise substrate failures: emits of chosen kinds fail with
/// [`EventBusError::EmitFailed`], and subscriptions can be refused.
///
/// # Example
///
/// ```
/// use async_lifecycle_core::prelude::*;
/// use async_lifecycle_testing::FailingEventBus;
///
/// # tokio_test::block_on(async {
/// let ping: Lifecycle<(), ()> = create_lifecycle("ping").unwrap();
/// let bus = FailingEventBus::new().fail_emits_of(ping.pending.kind().clone());
///
/// let result = bus.emit_event(&ping.pending.create_empty()).await;
/// assert!(matches!(result, Err(EventBusError::EmitFailed { .. })));
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct FailingEventBus {
    recorder: RecordingEventBus,
    failing_kinds: Arc<RwLock<Vec<EventKind>>>,
    refuse_subscriptions: Arc<AtomicBool>,
}

impl FailingEventBus {
    /// A bus that fails nothing until configured
    #[must_use]
    pub fn new() -> Self {
        Self {
            recorder: RecordingEventBus::new(),
            failing_kinds: Arc::new(RwLock::new(Vec::new())),
            refuse_subscriptions: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reject every emit of `kind`
    #[must_use]
    pub fn fail_emits_of(self, kind: EventKind) -> Self {
        self.failing_kinds.write().unwrap().push(kind);
        self
    }

    /// Refuse (or accept again) new subscriptions
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::Release);
    }

    /// Recorder of the emits that were accepted
    #[must_use]
    pub const fn recorder(&self) -> &RecordingEventBus {
        &self.recorder
    }
}

impl Default for FailingEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for FailingEventBus {
    fn emit(&self, event: DispatchedEvent) -> BoxFuture<'_, Result<(), EventBusError>> {
        let rejected = self.failing_kinds.read().unwrap().contains(&event.kind);
        if rejected {
            let error = EventBusError::EmitFailed {
                kind: event.kind.to_string(),
                reason: "rejected by test".to_string(),
            };
            return Box::pin(std::future::ready(Err(error)));
        }
        self.recorder.emit(event)
    }

    fn subscribe(&self, pattern: KindPattern) -> BoxFuture<'_, Result<EventStream, EventBusError>> {
        if self.refuse_subscriptions.load(Ordering::Acquire) {
            let error = EventBusError::SubscribeFailed("refused by test".to_string());
            return Box::pin(std::future::ready(Err(error)));
        }
        self.recorder.subscribe(pattern)
    }
}
