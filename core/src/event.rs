//! Lifecycle names, event kinds and event records.
//!
//! Every asynchronous operation is identified by a [`LifecycleName`]. From that
//! name four event kinds are derived, one per [`Role`]:
//!
//! ```text
//! fetchUser/trigger   request that the operation begin
//! fetchUser/pending   execution has started
//! fetchUser/success   execution completed normally
//! fetchUser/failed    execution terminated abnormally
//! ```
//!
//! The suffixes are a stable contract: code outside this crate is expected
//! to match on the exact kind strings.
//!
//! # Typed vs. dispatched events
//!
//! [`Event<P>`] is the typed record a caller constructs and a worker receives.
//! [`DispatchedEvent`] is the type-erased form carried by an
//! [`EventBus`](crate::event_bus::EventBus): the payload is plain data
//! (`serde_json::Value`), so one bus can carry the events of every lifecycle.
//! [`EventCreator<P>`] converts between the two for a single kind.
//!
//! # Example
//!
//! ```
//! use async_lifecycle_core::event::{EventCreator, LifecycleName, Role};
//!
//! let name = LifecycleName::new("fetchUser").unwrap();
//! let trigger: EventCreator<u32> = EventCreator::new(&name, Role::Trigger);
//!
//! let event = trigger.create(7);
//! assert_eq!(event.kind.as_str(), "fetchUser/trigger");
//! assert_eq!(event.payload, 7);
//! ```

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while constructing a lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The lifecycle name was empty.
    #[error("Lifecycle name must not be empty")]
    EmptyName,
}

/// Errors raised while converting between typed and dispatched events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The payload could not be converted to plain data.
    #[error("Failed to serialize payload for '{kind}': {reason}")]
    Serialization {
        /// Kind of the event being serialized
        kind: String,
        /// Underlying serializer message
        reason: String,
    },

    /// The payload did not have the shape expected for this kind.
    #[error("Failed to deserialize payload for '{kind}': {reason}")]
    Deserialization {
        /// Kind of the event being deserialized
        kind: String,
        /// Underlying deserializer message
        reason: String,
    },

    /// A dispatched event was decoded with a creator for another kind.
    #[error("Expected event kind '{expected}', found '{found}'")]
    KindMismatch {
        /// Kind of the creator
        expected: String,
        /// Kind of the dispatched event
        found: String,
    },
}

/// Unique name of one asynchronous operation.
///
/// Cheap to clone. Uniqueness is the caller's responsibility: two lifecycles
/// built from the same name produce indistinguishable event kinds.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LifecycleName(Arc<str>);

impl LifecycleName {
    /// Create a lifecycle name.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::EmptyName`] if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, LifecycleError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LifecycleError::EmptyName);
        }
        Ok(Self(Arc::from(name)))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The event kind this lifecycle uses for `role`.
    #[must_use]
    pub fn kind(&self, role: Role) -> EventKind {
        EventKind::new(self, role)
    }
}

impl fmt::Display for LifecycleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LifecycleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LifecycleName").field(&&*self.0).finish()
    }
}

/// The four roles an event can play in a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Request that the operation begin
    Trigger,
    /// Execution has started
    Pending,
    /// Execution completed normally
    Success,
    /// Execution terminated abnormally
    Failed,
}

impl Role {
    /// All roles, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Trigger, Self::Pending, Self::Success, Self::Failed];

    /// The kind suffix for this role.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse a kind suffix.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.suffix() == suffix)
    }

    /// Whether this role ends an occurrence.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// An event kind string such as `"fetchUser/success"`.
///
/// Kinds built by this crate always have the form `"<name>/<suffix>"`.
/// Kinds read off the wire are accepted verbatim; [`EventKind::role`] and
/// [`EventKind::lifecycle_name`] return `None` for strings that do not
/// follow the scheme.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(Arc<str>);

impl EventKind {
    /// Derive the kind of `role` for lifecycle `name`.
    #[must_use]
    pub fn new(name: &LifecycleName, role: Role) -> Self {
        Self(Arc::from(format!("{name}/{}", role.suffix())))
    }

    /// Wrap an arbitrary kind string.
    #[must_use]
    pub fn from_raw(kind: impl Into<String>) -> Self {
        Self(Arc::from(kind.into()))
    }

    /// The kind as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split at the last `/` into lifecycle name and role.
    ///
    /// Names may themselves contain `/` (`"users/fetch/pending"` is the
    /// pending kind of lifecycle `"users/fetch"`).
    #[must_use]
    pub fn parse(&self) -> Option<(&str, Role)> {
        let (name, suffix) = self.0.rsplit_once('/')?;
        if name.is_empty() {
            return None;
        }
        Role::from_suffix(suffix).map(|role| (name, role))
    }

    /// The role encoded in this kind, if any.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.parse().map(|(_, role)| role)
    }

    /// The lifecycle name encoded in this kind, if any.
    #[must_use]
    pub fn lifecycle_name(&self) -> Option<&str> {
        self.parse().map(|(name, _)| name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({:?})", &*self.0)
    }
}

impl PartialEq<str> for EventKind {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for EventKind {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_raw)
    }
}

/// A typed event record.
///
/// Immutable once built: consumed by the bus and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    /// The kind of this event
    pub kind: EventKind,
    /// The payload carried by this event
    pub payload: P,
}

impl<P> Event<P> {
    /// Build an event of `kind` carrying `payload`.
    pub const fn new(kind: EventKind, payload: P) -> Self {
        Self { kind, payload }
    }

    /// Convert into the type-erased form carried by an event bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be
    /// represented as plain data (for example a map with non-string keys).
    pub fn to_dispatched(&self) -> Result<DispatchedEvent, EventError>
    where
        P: Serialize,
    {
        let payload =
            serde_json::to_value(&self.payload).map_err(|e| EventError::Serialization {
                kind: self.kind.to_string(),
                reason: e.to_string(),
            })?;
        Ok(DispatchedEvent::new(self.kind.clone(), payload))
    }
}

/// The type-erased event carried by an event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedEvent {
    /// The kind of this event
    pub kind: EventKind,
    /// The payload as plain data
    pub payload: serde_json::Value,
}

impl DispatchedEvent {
    /// Build a dispatched event directly.
    #[must_use]
    pub const fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }
}

impl fmt::Display for DispatchedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.payload)
    }
}

/// Typed constructor for one event kind.
///
/// The payload type is fixed per creator, so a `success` creator for a
/// `User` result can only build `Event<User>`.
pub struct EventCreator<P> {
    kind: EventKind,
    _payload: PhantomData<fn(P) -> P>,
}

impl<P> EventCreator<P> {
    /// A creator for the `role` kind of lifecycle `name`.
    #[must_use]
    pub fn new(name: &LifecycleName, role: Role) -> Self {
        Self::for_kind(EventKind::new(name, role))
    }

    /// A creator for an arbitrary kind.
    #[must_use]
    pub const fn for_kind(kind: EventKind) -> Self {
        Self {
            kind,
            _payload: PhantomData,
        }
    }

    /// The kind produced by this creator.
    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Build an event carrying `payload`.
    pub fn create(&self, payload: P) -> Event<P> {
        Event::new(self.kind.clone(), payload)
    }

    /// Whether `event` has this creator's kind.
    #[must_use]
    pub fn matches(&self, event: &DispatchedEvent) -> bool {
        event.kind == self.kind
    }

    /// Recover the typed event from its dispatched form.
    ///
    /// # Errors
    ///
    /// - [`EventError::KindMismatch`] if `event` is of another kind
    /// - [`EventError::Deserialization`] if the payload has the wrong shape
    pub fn decode(&self, event: &DispatchedEvent) -> Result<Event<P>, EventError>
    where
        P: DeserializeOwned,
    {
        if !self.matches(event) {
            return Err(EventError::KindMismatch {
                expected: self.kind.to_string(),
                found: event.kind.to_string(),
            });
        }
        let payload = P::deserialize(&event.payload).map_err(|e| EventError::Deserialization {
            kind: self.kind.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Event::new(self.kind.clone(), payload))
    }
}

impl EventCreator<()> {
    /// Build a payload-less event.
    #[must_use]
    pub fn create_empty(&self) -> Event<()> {
        self.create(())
    }
}

// Manual impls: deriving would require `P: Clone` / `P: Debug`.
impl<P> Clone for EventCreator<P> {
    fn clone(&self) -> Self {
        Self::for_kind(self.kind.clone())
    }
}

impl<P> fmt::Debug for EventCreator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCreator")
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(LifecycleName::new(""), Err(LifecycleError::EmptyName));
    }

    #[test]
    fn kinds_use_fixed_suffixes() {
        let name = LifecycleName::new("fetchUser").unwrap();
        assert_eq!(name.kind(Role::Trigger), "fetchUser/trigger");
        assert_eq!(name.kind(Role::Pending), "fetchUser/pending");
        assert_eq!(name.kind(Role::Success), "fetchUser/success");
        assert_eq!(name.kind(Role::Failed), "fetchUser/failed");
    }

    #[test]
    fn parse_splits_at_last_slash() {
        let kind = EventKind::from_raw("users/fetch/pending");
        assert_eq!(kind.parse(), Some(("users/fetch", Role::Pending)));

        assert_eq!(EventKind::from_raw("users/unknown").parse(), None);
        assert_eq!(EventKind::from_raw("/success").parse(), None);
        assert_eq!(EventKind::from_raw("no-slash").role(), None);
    }

    #[test]
    fn terminal_roles() {
        assert!(!Role::Trigger.is_terminal());
        assert!(!Role::Pending.is_terminal());
        assert!(Role::Success.is_terminal());
        assert!(Role::Failed.is_terminal());
    }

    #[test]
    fn decode_recovers_typed_payload() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct User {
            id: u32,
            name: String,
        }

        let name = LifecycleName::new("fetchUser").unwrap();
        let success: EventCreator<User> = EventCreator::new(&name, Role::Success);

        let dispatched = DispatchedEvent::new(
            name.kind(Role::Success),
            json!({ "id": 1, "name": "Ada" }),
        );
        let event = success.decode(&dispatched).unwrap();
        assert_eq!(
            event.payload,
            User {
                id: 1,
                name: "Ada".to_string()
            }
        );
    }

    #[test]
    fn decode_rejects_other_kinds() {
        let name = LifecycleName::new("fetchUser").unwrap();
        let success: EventCreator<u32> = EventCreator::new(&name, Role::Success);
        let failed = DispatchedEvent::new(name.kind(Role::Failed), json!(null));

        assert!(!success.matches(&failed));
        assert!(matches!(
            success.decode(&failed),
            Err(EventError::KindMismatch { .. })
        ));
    }

    #[test]
    fn decode_reports_shape_errors() {
        let name = LifecycleName::new("fetchUser").unwrap();
        let trigger: EventCreator<u32> = EventCreator::new(&name, Role::Trigger);
        let bad = DispatchedEvent::new(name.kind(Role::Trigger), json!("seven"));

        assert!(matches!(
            trigger.decode(&bad),
            Err(EventError::Deserialization { .. })
        ));
    }

    #[test]
    fn unit_payload_dispatches_as_null() {
        let name = LifecycleName::new("ping").unwrap();
        let pending: EventCreator<()> = EventCreator::new(&name, Role::Pending);
        let dispatched = pending.create_empty().to_dispatched().unwrap();
        assert_eq!(dispatched.payload, serde_json::Value::Null);
        assert_eq!(dispatched.to_string(), "ping/pending(null)");
    }

    #[test]
    fn non_string_map_keys_fail_to_serialize() {
        use std::collections::HashMap;

        let name = LifecycleName::new("lookup").unwrap();
        let success: EventCreator<HashMap<(u8, u8), u8>> =
            EventCreator::new(&name, Role::Success);
        let event = success.create(HashMap::from([((1, 2), 3)]));

        assert!(matches!(
            event.to_dispatched(),
            Err(EventError::Serialization { .. })
        ));
    }

    #[test]
    fn dispatched_event_serializes_kind_as_string() {
        let event = DispatchedEvent::new(EventKind::from_raw("a/trigger"), json!(1));
        let text = serde_json::to_string(&event).unwrap();
        assert_eq!(text, r#"{"kind":"a/trigger","payload":1}"#);
        let back: DispatchedEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
