//! # Async Lifecycle Runtime
//!
//! Runtime for lifecycle workers.
//!
//! This crate runs caller-supplied workers against an event bus and turns
//! every trigger occurrence into a pending event followed by exactly one
//! success or failed event.
//!
//! ## Core Components
//!
//! - **`InMemoryEventBus`**: in-process dispatch substrate with lossless per-subscriber queues
//! - **`attach_worker`**: registers a listener on a lifecycle's trigger kind
//! - **Execution wrapper**: runs one occurrence, translating every worker
//!   failure (including panics) into a failed event
//! - **`Subscription`**: cancels the registration and tracks in-flight occurrences
//! - **`Supervisor`**: owns several registrations against one bus
//! - **`request`**: emit a trigger and await its terminal event
//!
//! ## Example
//!
//! ```ignore
//! use async_lifecycle_core::prelude::*;
//! use async_lifecycle_runtime::{InMemoryEventBus, attach_worker};
//! use std::sync::Arc;
//!
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
//! let fetch_user: Lifecycle<u32, User> = create_lifecycle("fetchUser")?;
//!
//! let subscription = attach_worker(Arc::clone(&bus), fetch_user.clone(), |trigger: Event<u32>| async move {
//!     api::fetch_user(trigger.payload).await
//! })
//! .await?;
//!
//! bus.emit_event(&fetch_user.trigger.create(1)).await?;
//! // fetchUser/pending, then fetchUser/success or fetchUser/failed
//! ```

use std::time::Duration;

/// In-process event bus
pub mod bus;

/// Metric names and recording helpers
pub mod metrics;

/// Trigger-and-await helper
pub mod request;

/// Registration handle and in-flight tracking
pub mod subscription;

/// Listener registration and the per-occurrence execution wrapper
pub mod supervisor;

/// Error types for the runtime
pub mod error {
    use async_lifecycle_core::event_bus::EventBusError;
    use thiserror::Error;

    /// Errors that can occur while supervising or awaiting lifecycles
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum SupervisorError {
        /// The event bus rejected an emit or subscribe
        ///
        /// Substrate failures are not recoverable by the runtime; they are
        /// handed back to whoever owns the bus.
        #[error("Event bus failure: {0}")]
        Bus(#[from] EventBusError),

        /// In-flight occurrences did not finish before the drain timeout
        #[error("Drain timed out with {0} occurrences still running")]
        DrainTimeout(usize),

        /// Timeout waiting for a terminal event
        ///
        /// Returned by [`request`](crate::request::request) when no success or
        /// failed event arrives in time.
        #[error("Timeout waiting for terminal event")]
        Timeout,

        /// The event stream ended before a terminal event arrived
        #[error("Event stream closed")]
        StreamClosed,

        /// A terminal event arrived but its payload could not be decoded
        #[error("Failed to decode terminal event: {0}")]
        Decode(String),
    }
}

pub use bus::InMemoryEventBus;
pub use error::SupervisorError;
pub use request::request;
pub use subscription::Subscription;
pub use supervisor::{Supervisor, attach_worker, attach_worker_with_config};

/// Configuration for supervised workers
///
/// # Example
///
/// ```
/// use async_lifecycle_runtime::SupervisorConfig;
/// use std::time::Duration;
///
/// let config = SupervisorConfig::default()
///     .with_drain_timeout(Duration::from_secs(5))
///     .with_metrics(false);
///
/// assert_eq!(config.drain_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long `Supervisor::shutdown_default` waits for in-flight occurrences
    pub drain_timeout: Duration,
    /// Whether occurrences record metrics
    pub record_metrics: bool,
}

impl SupervisorConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(drain_timeout: Duration, record_metrics: bool) -> Self {
        Self {
            drain_timeout,
            record_metrics,
        }
    }

    /// Set the drain timeout
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Enable or disable metrics recording
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.record_metrics = enabled;
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            record_metrics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert!(config.record_metrics);
    }

    #[test]
    fn config_builder() {
        let config = SupervisorConfig::new(Duration::from_secs(1), true).with_metrics(false);
        assert!(!config.record_metrics);
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
    }
}
