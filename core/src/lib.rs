//! # Async Lifecycle Core
//!
//! Core traits and types for modelling an asynchronous operation as a family
//! of observable events.
//!
//! ## Core Concepts
//!
//! - **Lifecycle**: four event kinds derived from one name
//!   (`<name>/trigger`, `<name>/pending`, `<name>/success`, `<name>/failed`)
//! - **Event**: an immutable `{ kind, payload }` record
//! - **Event bus**: the injected dispatch substrate (`emit`, `subscribe`)
//! - **Worker**: the caller-supplied routine that performs the operation
//! - **Status**: UI state folded from a lifecycle's events
//!
//! Running workers against a bus lives in `async-lifecycle-runtime`.
//!
//! ## Example
//!
//! ```
//! use async_lifecycle_core::prelude::*;
//!
//! let fetch_user: Lifecycle<u32, String> = create_lifecycle("fetchUser").unwrap();
//!
//! let trigger = fetch_user.trigger.create(1);
//! assert_eq!(trigger.kind.as_str(), "fetchUser/trigger");
//!
//! let failed = fetch_user.failed.create(Some("boom".to_string()));
//! assert_eq!(failed.kind.as_str(), "fetchUser/failed");
//! ```

pub mod event;
pub mod event_bus;
pub mod lifecycle;
pub mod status;
pub mod worker;

/// Commonly used items.
pub mod prelude {
    pub use crate::event::{
        DispatchedEvent, Event, EventCreator, EventError, EventKind, LifecycleError,
        LifecycleName, Role,
    };
    pub use crate::event_bus::{EventBus, EventBusError, EventBusExt, EventStream, KindPattern};
    pub use crate::lifecycle::{FailurePayload, Lifecycle, create_lifecycle};
    pub use crate::status::{LifecycleStatus, Phase};
    pub use crate::worker::{Worker, WorkerError};
}
