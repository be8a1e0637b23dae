//! Registration handle for a supervised worker.
//!
//! A [`Subscription`] controls the standing listener created by
//! [`attach_worker`](crate::supervisor::attach_worker) and observes the
//! occurrences it has spawned. Cancelling stops new triggers from being
//! picked up; occurrences already running are left alone and still emit
//! their terminal event.

use crate::error::SupervisorError;
use async_lifecycle_core::event::LifecycleName;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};

/// State shared between a subscription handle, its listener and its occurrences.
pub(crate) struct Shared {
    name: LifecycleName,
    cancelled: AtomicBool,
    listening: AtomicBool,
    wake: Notify,
    in_flight: AtomicUsize,
    idle: watch::Sender<()>,
    substrate_failures: AtomicUsize,
}

impl Shared {
    pub(crate) fn new(name: LifecycleName) -> Arc<Self> {
        let (idle, _) = watch::channel(());
        Arc::new(Self {
            name,
            cancelled: AtomicBool::new(false),
            listening: AtomicBool::new(true),
            wake: Notify::new(),
            in_flight: AtomicUsize::new(0),
            idle,
            substrate_failures: AtomicUsize::new(0),
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called.
    pub(crate) async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.notified().await;
        }
    }

    pub(crate) fn listener_stopped(&self) {
        self.listening.store(false, Ordering::Release);
    }

    pub(crate) fn record_substrate_failure(&self) {
        self.substrate_failures.fetch_add(1, Ordering::AcqRel);
    }

    /// Count a new occurrence; the guard uncounts it on drop.
    pub(crate) fn start_occurrence(self: &Arc<Self>) -> OccurrenceGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        OccurrenceGuard(Arc::clone(self))
    }
}

/// RAII guard that marks an occurrence finished on drop
///
/// Dropped even if the occurrence task is aborted, so the in-flight count
/// never leaks.
pub(crate) struct OccurrenceGuard(Arc<Shared>);

impl Drop for OccurrenceGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.send_replace(());
        }
    }
}

/// Handle to a standing worker registration.
///
/// Cloning yields another handle to the same registration. Dropping every
/// handle does not cancel the registration; call [`cancel`](Self::cancel).
///
/// # Example
///
/// ```ignore
/// let subscription = attach_worker(bus, fetch_user, worker).await?;
///
/// // Stop picking up new triggers, then let running occurrences finish.
/// subscription.cancel();
/// subscription.drain(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Name of the supervised lifecycle
    #[must_use]
    pub fn lifecycle_name(&self) -> &LifecycleName {
        &self.shared.name
    }

    /// Stop picking up new trigger events
    ///
    /// Idempotent. Triggers emitted after this call never reach the worker;
    /// occurrences already running complete normally.
    pub fn cancel(&self) {
        if !self.shared.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(lifecycle = %self.shared.name, "Cancelling worker registration");
            self.shared.wake.notify_one();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Whether the listener task is still receiving triggers
    ///
    /// Becomes `false` after cancellation or when the bus closes the stream.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::Acquire)
    }

    /// Number of occurrences currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Number of occurrences aborted because the bus rejected an emit
    #[must_use]
    pub fn substrate_failures(&self) -> usize {
        self.shared.substrate_failures.load(Ordering::Acquire)
    }

    /// Wait until no occurrence is running
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::DrainTimeout`] with the number of running
    /// occurrences if they do not finish within `timeout`.
    pub async fn drain(&self, timeout: Duration) -> Result<(), SupervisorError> {
        // Subscribe before reading the counter so a completion in between is
        // seen as a change.
        let mut idle = self.shared.idle.subscribe();

        let wait = async {
            while self.in_flight() > 0 {
                if idle.changed().await.is_err() {
                    break;
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            let remaining = self.in_flight();
            tracing::warn!(
                lifecycle = %self.shared.name,
                remaining,
                "Drain timed out with {} occurrences still running", remaining
            );
            SupervisorError::DrainTimeout(remaining)
        })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("lifecycle", &self.shared.name)
            .field("cancelled", &self.is_cancelled())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
