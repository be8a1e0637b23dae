//! # Async Lifecycle Testing
//!
//! Testing utilities for lifecycle workers.
//!
//! This crate provides:
//! - [`RecordingEventBus`]: captures every emitted event in order
//! - [`FailingEventBus`]: simulates a failing dispatch substrate
//! - Lifecycle contract checks over recorded logs
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use async_lifecycle_testing::{RecordingEventBus, assert_lifecycle};
//!
//! #[tokio::test]
//! async fn fetch_user_emits_pending_then_success() {
//!     let bus = Arc::new(RecordingEventBus::new());
//!     attach_worker(bus.clone(), fetch_user.clone(), worker).await?;
//!
//!     bus.emit_event(&fetch_user.trigger.create(UserQuery { id: 1 })).await?;
//!     bus.wait_for_terminals(fetch_user.name(), 1, Duration::from_secs(1)).await;
//!
//!     assert_lifecycle(&bus.events(), fetch_user.name());
//! }
//! ```

/// Lifecycle contract checks
pub mod assertions;

/// Recording and failing event bus decorators
pub mod recording;

/// Tracing setup for tests
pub mod tracing_setup {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber
    ///
    /// Honors `RUST_LOG` (default `warn`). Safe to call from every test: only
    /// the first call installs a subscriber.
    pub fn init_test_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use assertions::{LifecycleTally, assert_lifecycle, check_lifecycle, roles_of};
pub use recording::{FailingEventBus, RecordingEventBus};
pub use tracing_setup::init_test_tracing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
