//! Supervised execution of lifecycle workers.
//!
//! [`attach_worker`] subscribes to a lifecycle's trigger kind and spawns one
//! listener task. Every trigger it receives becomes an independent
//! occurrence task running the execution wrapper:
//!
//! ```text
//! Idle ──emit pending──► Pending ──worker Ok(r)──► Success(r)
//!                           │
//!                           └─────worker Err / panic──► Failed(message)
//! ```
//!
//! The wrapper never lets a worker failure escape: errors, undecodable
//! trigger payloads, unserializable results and panics all become a failed
//! event. Only a failing bus aborts an occurrence, since there is nowhere
//! left to report the outcome; that is logged, counted and surfaced through
//! [`Subscription::substrate_failures`].
//!
//! Overlapping triggers are neither serialized nor de-duplicated. Callers
//! that need at most one occurrence in flight must check before emitting.

use crate::error::SupervisorError;
use crate::metrics::{self, Outcome};
use crate::subscription::{Shared, Subscription};
use crate::SupervisorConfig;
use async_lifecycle_core::event::{DispatchedEvent, Event};
use async_lifecycle_core::event_bus::{EventBus, EventBusError, EventBusExt, EventStream, KindPattern};
use async_lifecycle_core::lifecycle::{FailurePayload, Lifecycle};
use async_lifecycle_core::worker::{Worker, WorkerError};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Attach `worker` to every trigger of `lifecycle` using the default configuration.
///
/// The subscription is registered before this function returns, so a
/// trigger emitted afterwards is always picked up.
///
/// # Errors
///
/// Returns the bus error if the subscription cannot be registered.
///
/// # Example
///
/// ```ignore
/// let subscription = attach_worker(
///     Arc::clone(&bus),
///     fetch_user.clone(),
///     |trigger: Event<UserQuery>| async move { api.fetch(trigger.payload.id).await },
/// )
/// .await?;
/// ```
pub async fn attach_worker<T, R, F, P, W>(
    bus: Arc<dyn EventBus>,
    lifecycle: Lifecycle<T, R, F, P>,
    worker: W,
) -> Result<Subscription, EventBusError>
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: FailurePayload + Serialize + Send + 'static,
    P: Default + Serialize + Send + 'static,
    W: Worker<T, R>,
{
    attach_worker_with_config(bus, lifecycle, worker, &SupervisorConfig::default()).await
}

/// Attach `worker` to every trigger of `lifecycle`.
///
/// # Errors
///
/// Returns the bus error if the subscription cannot be registered.
#[tracing::instrument(skip_all, fields(lifecycle = %lifecycle.name()))]
pub async fn attach_worker_with_config<T, R, F, P, W>(
    bus: Arc<dyn EventBus>,
    lifecycle: Lifecycle<T, R, F, P>,
    worker: W,
    config: &SupervisorConfig,
) -> Result<Subscription, EventBusError>
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: FailurePayload + Serialize + Send + 'static,
    P: Default + Serialize + Send + 'static,
    W: Worker<T, R>,
{
    let triggers = bus
        .subscribe(KindPattern::Exact(lifecycle.trigger.kind().clone()))
        .await?;

    let shared = Shared::new(lifecycle.name().clone());
    let runner = Arc::new(Runner {
        bus,
        lifecycle,
        worker,
        record_metrics: config.record_metrics,
    });

    tokio::spawn(listen(runner, triggers, Arc::clone(&shared)));
    tracing::debug!("Worker attached");

    Ok(Subscription::new(shared))
}

/// Standing listener: one occurrence per received trigger.
async fn listen<T, R, F, P, W>(
    runner: Arc<Runner<T, R, F, P, W>>,
    mut triggers: EventStream,
    shared: Arc<Shared>,
) where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: FailurePayload + Serialize + Send + 'static,
    P: Default + Serialize + Send + 'static,
    W: Worker<T, R>,
{
    loop {
        let trigger = tokio::select! {
            biased;
            () = shared.cancelled() => break,
            next = triggers.next() => match next {
                Some(trigger) => trigger,
                None => {
                    tracing::debug!(lifecycle = %runner.lifecycle.name(), "Trigger stream ended");
                    break;
                },
            },
        };

        // cancel() may have raced with delivery of this trigger.
        if shared.is_cancelled() {
            break;
        }

        let guard = shared.start_occurrence();
        let runner = Arc::clone(&runner);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(error) = runner.execute(trigger).await {
                shared.record_substrate_failure();
                tracing::error!(
                    lifecycle = %runner.lifecycle.name(),
                    error = %error,
                    "Occurrence aborted: event bus rejected an emit"
                );
            }
            // Released only after the failure is counted, so drain() observes it.
            drop(guard);
        });
    }

    shared.listener_stopped();
    tracing::debug!(lifecycle = %runner.lifecycle.name(), "Listener stopped");
}

/// Everything one occurrence needs, shared by all occurrences of a registration.
struct Runner<T, R, F, P, W> {
    bus: Arc<dyn EventBus>,
    lifecycle: Lifecycle<T, R, F, P>,
    worker: W,
    record_metrics: bool,
}

impl<T, R, F, P, W> Runner<T, R, F, P, W>
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: FailurePayload + Serialize + Send + 'static,
    P: Default + Serialize + Send + 'static,
    W: Worker<T, R>,
{
    /// The execution wrapper for one trigger occurrence.
    #[tracing::instrument(skip_all, name = "lifecycle_occurrence", fields(lifecycle = %self.lifecycle.name()))]
    async fn execute(&self, trigger: DispatchedEvent) -> Result<(), EventBusError> {
        let name = self.lifecycle.name().as_str();
        let started = Instant::now();

        self.bus
            .emit_event(&self.lifecycle.pending.create(P::default()))
            .await
            .inspect_err(|_| self.record(name, Outcome::Aborted, started.elapsed()))?;
        if self.record_metrics {
            metrics::record_started(name);
        }
        tracing::trace!("Pending emitted, invoking worker");

        let result = match self.lifecycle.trigger.decode(&trigger) {
            Ok(event) => self.invoke(event).await,
            Err(error) => Err(WorkerError::msg(error.to_string())),
        };

        let terminal = match result {
            Ok(payload) => self.lifecycle.success.create(payload).to_dispatched().map_err(|error| {
                tracing::warn!(error = %error, "Worker result could not be serialized");
                WorkerError::msg(error.to_string())
            }),
            Err(error) => Err(error),
        };

        let (event, outcome) = match terminal {
            Ok(success) => (success, Outcome::Succeeded),
            Err(error) => {
                tracing::warn!(error = %error, "Worker failed");
                let failed = self
                    .lifecycle
                    .failed
                    .create(F::from_message(error.into_message()))
                    .to_dispatched()
                    .map_err(EventBusError::from)
                    .inspect_err(|_| self.record(name, Outcome::Aborted, started.elapsed()))?;
                (failed, Outcome::Failed)
            },
        };

        self.bus
            .emit(event)
            .await
            .inspect_err(|_| self.record(name, Outcome::Aborted, started.elapsed()))?;
        self.record(name, outcome, started.elapsed());
        tracing::trace!(?outcome, "Terminal event emitted");
        Ok(())
    }

    /// Run the worker, turning a panic into a worker error.
    async fn invoke(&self, trigger: Event<T>) -> Result<R, WorkerError> {
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| self.worker.run(trigger))) {
            Ok(future) => future,
            Err(panic) => return Err(panic_error(panic.as_ref())),
        };

        AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic.as_ref())))
    }

    fn record(&self, name: &str, outcome: Outcome, elapsed: Duration) {
        if self.record_metrics {
            metrics::record_finished(name, outcome, elapsed);
        }
    }
}

/// Best-effort message from a panic payload.
fn panic_error(panic: &(dyn Any + Send)) -> WorkerError {
    tracing::warn!("Worker panicked");
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(WorkerError::without_message, WorkerError::msg)
}

/// A set of worker registrations sharing one event bus.
///
/// # Example
///
/// ```ignore
/// let supervisor = Supervisor::new(Arc::clone(&bus));
/// supervisor.attach(fetch_user, fetch_user_worker).await?;
/// supervisor.attach(save_user, save_user_worker).await?;
///
/// // On shutdown: stop listening, then wait for running occurrences.
/// supervisor.shutdown(Duration::from_secs(10)).await?;
/// ```
pub struct Supervisor {
    bus: Arc<dyn EventBus>,
    config: SupervisorConfig,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Supervisor {
    /// Create a supervisor with the default configuration
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self::with_config(bus, SupervisorConfig::default())
    }

    /// Create a supervisor with custom configuration
    #[must_use]
    pub fn with_config(bus: Arc<dyn EventBus>, config: SupervisorConfig) -> Self {
        Self {
            bus,
            config,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The bus workers are attached to
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Attach a worker and keep its registration
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Bus`] if the subscription cannot be registered.
    pub async fn attach<T, R, F, P, W>(
        &self,
        lifecycle: Lifecycle<T, R, F, P>,
        worker: W,
    ) -> Result<Subscription, SupervisorError>
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: FailurePayload + Serialize + Send + 'static,
        P: Default + Serialize + Send + 'static,
        W: Worker<T, R>,
    {
        let subscription =
            attach_worker_with_config(Arc::clone(&self.bus), lifecycle, worker, &self.config).await?;
        self.registrations().push(subscription.clone());
        Ok(subscription)
    }

    /// Handles to every registration made through this supervisor
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.registrations().clone()
    }

    /// Total number of occurrences running across all registrations
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.registrations().iter().map(Subscription::in_flight).sum()
    }

    /// Cancel every registration
    pub fn cancel_all(&self) {
        for subscription in self.registrations().iter() {
            subscription.cancel();
        }
    }

    /// Cancel every registration and wait for running occurrences
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::DrainTimeout`] with the total number of
    /// occurrences still running if `timeout` expires first.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SupervisorError> {
        tracing::info!("Initiating supervisor shutdown");
        self.cancel_all();

        let deadline = Instant::now() + timeout;
        for subscription in self.subscriptions() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if subscription.drain(remaining).await.is_err() {
                let running = self.in_flight();
                tracing::error!(running, "Shutdown timeout: {} occurrences still running", running);
                return Err(SupervisorError::DrainTimeout(running));
            }
        }

        tracing::info!("All occurrences completed, shutdown successful");
        Ok(())
    }

    /// [`shutdown`](Self::shutdown) with the configured drain timeout
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_default(&self) -> Result<(), SupervisorError> {
        self.shutdown(self.config.drain_timeout).await
    }

    // Poisoning only happens if a panic occurred while pushing or cloning
    // handles; the Vec is still valid in that case.
    fn registrations(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("subscriptions", &self.registrations().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::bus::InMemoryEventBus;
    use async_lifecycle_core::lifecycle::create_lifecycle;
    use serde_json::json;

    type Double = Lifecycle<u32, u32>;

    async fn collect(stream: &mut EventStream, count: usize) -> Vec<DispatchedEvent> {
        tokio::time::timeout(Duration::from_secs(1), stream.take(count).collect())
            .await
            .expect("events should arrive")
    }

    #[tokio::test]
    async fn panicking_worker_becomes_failed_event() {
        let bus = Arc::new(InMemoryEventBus::new());
        let double: Double = create_lifecycle("double").unwrap();
        let mut events = bus.subscribe(KindPattern::Lifecycle(double.name().clone())).await.unwrap();

        let _subscription = attach_worker(bus.clone(), double.clone(), |_: Event<u32>| async move {
            if true {
                panic!("worker exploded");
            }
            Ok::<u32, WorkerError>(0)
        })
        .await
        .unwrap();

        bus.emit_event(&double.trigger.create(1)).await.unwrap();
        let received = collect(&mut events, 3).await;
        assert_eq!(received[1].kind, "double/pending");
        assert_eq!(received[2].kind, "double/failed");
        assert_eq!(received[2].payload, json!("worker exploded"));
    }

    #[tokio::test]
    async fn panic_while_building_future_is_caught() {
        let bus = Arc::new(InMemoryEventBus::new());
        let double: Double = create_lifecycle("double").unwrap();
        let mut events = bus.subscribe(KindPattern::Exact(double.failed.kind().clone())).await.unwrap();

        let worker = |_: Event<u32>| -> futures::future::Ready<Result<u32, WorkerError>> {
            panic!("{}", String::from("eager panic"));
        };
        let _subscription = attach_worker(bus.clone(), double.clone(), worker).await.unwrap();

        bus.emit_event(&double.trigger.create(1)).await.unwrap();
        let failed = collect(&mut events, 1).await;
        assert_eq!(failed[0].payload, json!("eager panic"));
    }

    #[tokio::test]
    async fn undecodable_trigger_still_gets_pending_and_failed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let double: Double = create_lifecycle("double").unwrap();
        let mut events = bus.subscribe(KindPattern::Lifecycle(double.name().clone())).await.unwrap();

        let _subscription = attach_worker(bus.clone(), double.clone(), |event: Event<u32>| async move {
            Ok::<_, WorkerError>(event.payload * 2)
        })
        .await
        .unwrap();

        bus.emit(DispatchedEvent::new(double.trigger.kind().clone(), json!("not a number")))
            .await
            .unwrap();

        let received = collect(&mut events, 3).await;
        assert_eq!(received[1].kind, "double/pending");
        assert_eq!(received[2].kind, "double/failed");
        assert!(received[2].payload.as_str().unwrap().contains("double/trigger"));
    }

    #[tokio::test]
    async fn unserializable_result_becomes_failed_event() {
        use std::collections::HashMap;

        let bus = Arc::new(InMemoryEventBus::new());
        let lookup: Lifecycle<u32, HashMap<(u8, u8), u8>> = create_lifecycle("lookup").unwrap();
        let mut events = bus.subscribe(KindPattern::Lifecycle(lookup.name().clone())).await.unwrap();

        let _subscription = attach_worker(bus.clone(), lookup.clone(), |_: Event<u32>| async move {
            Ok::<_, WorkerError>(HashMap::from([((1, 2), 3)]))
        })
        .await
        .unwrap();

        bus.emit_event(&lookup.trigger.create(1)).await.unwrap();
        let received = collect(&mut events, 3).await;
        assert_eq!(received[2].kind, "lookup/failed");
        assert!(received[2].payload.is_string());
    }

    #[tokio::test]
    async fn string_failure_payloads() {
        let bus = Arc::new(InMemoryEventBus::new());
        let op: Lifecycle<(), (), String> = create_lifecycle("op").unwrap();
        let mut failed = bus.subscribe(KindPattern::Exact(op.failed.kind().clone())).await.unwrap();

        let _subscription = attach_worker(bus.clone(), op.clone(), |_: Event<()>| async move {
            Err::<(), _>(WorkerError::without_message())
        })
        .await
        .unwrap();

        bus.emit_event(&op.trigger.create_empty()).await.unwrap();
        assert_eq!(collect(&mut failed, 1).await[0].payload, json!(""));
    }

    #[tokio::test]
    async fn supervisor_shutdown_cancels_and_drains() {
        let bus = Arc::new(InMemoryEventBus::new());
        let supervisor = Supervisor::with_config(
            bus.clone(),
            SupervisorConfig::default().with_metrics(false),
        );
        let slow: Double = create_lifecycle("slow").unwrap();
        let mut events = bus.subscribe(KindPattern::Exact(slow.pending.kind().clone())).await.unwrap();

        let subscription = supervisor
            .attach(slow.clone(), |event: Event<u32>| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, WorkerError>(event.payload)
            })
            .await
            .unwrap();

        bus.emit_event(&slow.trigger.create(1)).await.unwrap();
        collect(&mut events, 1).await;
        assert_eq!(supervisor.in_flight(), 1);

        supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(subscription.is_cancelled());
        assert_eq!(supervisor.in_flight(), 0);
        assert_eq!(supervisor.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_times_out_on_stuck_worker() {
        let bus = Arc::new(InMemoryEventBus::new());
        let supervisor = Supervisor::new(bus.clone());
        let stuck: Double = create_lifecycle("stuck").unwrap();
        let mut events = bus.subscribe(KindPattern::Exact(stuck.pending.kind().clone())).await.unwrap();

        supervisor
            .attach(stuck.clone(), |_: Event<u32>| async move {
                futures::future::pending::<()>().await;
                Ok::<u32, WorkerError>(0)
            })
            .await
            .unwrap();

        bus.emit_event(&stuck.trigger.create(1)).await.unwrap();
        collect(&mut events, 1).await;

        assert_eq!(
            supervisor.shutdown(Duration::from_millis(20)).await,
            Err(SupervisorError::DrainTimeout(1))
        );
    }

    #[test]
    fn panic_payload_messages() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_error(text.as_ref()).message(), Some("static"));

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_error(owned.as_ref()).message(), Some("owned"));

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_error(other.as_ref()).message(), None);
    }
}
