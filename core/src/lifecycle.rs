//! The lifecycle factory.
//!
//! A [`Lifecycle`] bundles the four typed event creators of one asynchronous
//! operation. Deriving all four from one name keeps them structurally tied
//! together: a success kind cannot exist without its trigger kind.
//!
//! # Example
//!
//! ```
//! use async_lifecycle_core::lifecycle::{Lifecycle, create_lifecycle};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct UserQuery { id: u32 }
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct User { id: u32, name: String }
//!
//! let fetch_user: Lifecycle<UserQuery, User> = create_lifecycle("fetchUser").unwrap();
//!
//! assert_eq!(fetch_user.trigger.kind().as_str(), "fetchUser/trigger");
//! assert_eq!(fetch_user.pending.kind().as_str(), "fetchUser/pending");
//! assert_eq!(fetch_user.success.kind().as_str(), "fetchUser/success");
//! assert_eq!(fetch_user.failed.kind().as_str(), "fetchUser/failed");
//! ```

use crate::event::{EventCreator, EventKind, LifecycleError, LifecycleName, Role};
use std::fmt;

/// Payload types usable for the failed event.
///
/// The supervisor only knows an optional message; this trait turns it into
/// the lifecycle's failed payload.
pub trait FailurePayload: Sized {
    /// Build the failed payload from an optional error message.
    fn from_message(message: Option<String>) -> Self;

    /// The message carried by this payload, if any.
    fn message(&self) -> Option<&str>;
}

impl FailurePayload for Option<String> {
    fn from_message(message: Option<String>) -> Self {
        message
    }

    fn message(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl FailurePayload for String {
    fn from_message(message: Option<String>) -> Self {
        message.unwrap_or_default()
    }

    fn message(&self) -> Option<&str> {
        if self.is_empty() { None } else { Some(self) }
    }
}

/// The event family of one asynchronous operation.
///
/// # Type Parameters
///
/// - `T`: trigger payload (the operation's input)
/// - `R`: success payload (the operation's result)
/// - `F`: failed payload (defaults to an optional message)
/// - `P`: pending payload (defaults to unit)
///
/// Never mutated after creation. Cloning is cheap; share it with every
/// module that triggers or observes the operation.
pub struct Lifecycle<T, R, F = Option<String>, P = ()> {
    name: LifecycleName,
    /// Creator for the trigger event
    pub trigger: EventCreator<T>,
    /// Creator for the pending event
    pub pending: EventCreator<P>,
    /// Creator for the success event
    pub success: EventCreator<R>,
    /// Creator for the failed event
    pub failed: EventCreator<F>,
}

impl<T, R, F, P> Lifecycle<T, R, F, P> {
    /// Derive the four event creators for `name`.
    #[must_use]
    pub fn new(name: LifecycleName) -> Self {
        Self {
            trigger: EventCreator::new(&name, Role::Trigger),
            pending: EventCreator::new(&name, Role::Pending),
            success: EventCreator::new(&name, Role::Success),
            failed: EventCreator::new(&name, Role::Failed),
            name,
        }
    }

    /// The lifecycle's name.
    #[must_use]
    pub const fn name(&self) -> &LifecycleName {
        &self.name
    }

    /// The kind used for `role`.
    #[must_use]
    pub const fn kind(&self, role: Role) -> &EventKind {
        match role {
            Role::Trigger => self.trigger.kind(),
            Role::Pending => self.pending.kind(),
            Role::Success => self.success.kind(),
            Role::Failed => self.failed.kind(),
        }
    }

    /// All four kinds, in lifecycle order.
    #[must_use]
    pub fn kinds(&self) -> [EventKind; 4] {
        Role::ALL.map(|role| self.kind(role).clone())
    }

    /// The role `kind` plays in this lifecycle, if it belongs to it.
    #[must_use]
    pub fn role_of(&self, kind: &EventKind) -> Option<Role> {
        Role::ALL.into_iter().find(|role| self.kind(*role) == kind)
    }
}

impl<T, R, F, P> Clone for Lifecycle<T, R, F, P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            trigger: self.trigger.clone(),
            pending: self.pending.clone(),
            success: self.success.clone(),
            failed: self.failed.clone(),
        }
    }
}

impl<T, R, F, P> fmt::Debug for Lifecycle<T, R, F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle").field("name", &self.name).finish()
    }
}

/// Build the lifecycle for `name`.
///
/// # Errors
///
/// Returns [`LifecycleError::EmptyName`] if `name` is empty. Name
/// collisions are not detected.
pub fn create_lifecycle<T, R, F, P>(
    name: impl Into<String>,
) -> Result<Lifecycle<T, R, F, P>, LifecycleError> {
    LifecycleName::new(name).map(Lifecycle::new)
}
