//! Event bus abstraction: the dispatch substrate lifecycles run on.
//!
//! This module provides the [`EventBus`] trait for emitting events and
//! subscribing to them by kind. The supervisor never talks to a global
//! store; it receives an `Arc<dyn EventBus>` and uses only these two
//! primitives, so tests can swap in a recording or failing bus.
//!
//! # Architecture
//!
//! ```text
//!   caller ── emit(fetchUser/trigger) ──►┌──────────┐
//!                                        │ EventBus │── fetchUser/* ──► UI, observers
//!   supervisor ◄── subscribe(trigger) ───│          │
//!       │                                └──────────┘
//!       │ per trigger occurrence              ▲
//!       ├─ emit(fetchUser/pending) ───────────┤
//!       ├─ worker(trigger).await              │
//!       └─ emit(fetchUser/success|failed) ────┘
//! ```
//!
//! # Delivery
//!
//! - Every subscriber whose [`KindPattern`] matches receives each emitted event
//! - Events emitted before a subscription exists are not replayed
//! - A slow subscriber must not lose events: the supervisor relies on every
//!   trigger reaching its listener
//!
//! # Example
//!
//! ```rust,ignore
//! use async_lifecycle_core::event_bus::{EventBus, EventBusExt, KindPattern};
//! use futures::StreamExt;
//!
//! async fn example(bus: &dyn EventBus, lifecycle: &Lifecycle<u32, User>) -> Result<(), EventBusError> {
//!     let mut events = bus.subscribe(KindPattern::Lifecycle(lifecycle.name().clone())).await?;
//!     bus.emit_event(&lifecycle.trigger.create(1)).await?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("{event}");
//!     }
//!     Ok(())
//! }
//! ```

use crate::event::{DispatchedEvent, Event, EventError, EventKind, LifecycleName};
use futures::Stream;
use futures::future::BoxFuture;
use serde::Serialize;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// The bus has been closed and accepts no further events
    #[error("Event bus is closed")]
    Closed,

    /// Failed to emit an event
    #[error("Emit failed for '{kind}': {reason}")]
    EmitFailed {
        /// Kind of the event that could not be emitted
        kind: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to register a subscription
    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),

    /// A typed event could not be converted for dispatch
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Which event kinds a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindPattern {
    /// Every event
    Any,
    /// Exactly one kind
    Exact(EventKind),
    /// Any of the listed kinds
    OneOf(Vec<EventKind>),
    /// All four kinds of one lifecycle
    Lifecycle(LifecycleName),
}

impl KindPattern {
    /// Whether `kind` is selected by this pattern.
    #[must_use]
    pub fn matches(&self, kind: &EventKind) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == kind,
            Self::OneOf(kinds) => kinds.contains(kind),
            Self::Lifecycle(name) => kind.lifecycle_name() == Some(name.as_str()),
        }
    }
}

/// Stream of events delivered to one subscription.
///
/// The stream ends when the bus is closed or dropped.
pub type EventStream = Pin<Box<dyn Stream<Item = DispatchedEvent> + Send>>;

/// Trait for dispatch substrate implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the supervisor emits from many
/// concurrently running occurrences.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Emit an event to every matching subscriber.
    ///
    /// Emitting with no subscribers is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Closed`] or [`EventBusError::EmitFailed`] if
    /// the substrate cannot accept the event.
    fn emit(&self, event: DispatchedEvent) -> BoxFuture<'_, Result<(), EventBusError>>;

    /// Register a subscription for every event matching `pattern`.
    ///
    /// The subscription is active once the returned future resolves: events
    /// emitted after that point are delivered to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Closed`] or [`EventBusError::SubscribeFailed`]
    /// if the subscription cannot be registered.
    fn subscribe(&self, pattern: KindPattern) -> BoxFuture<'_, Result<EventStream, EventBusError>>;
}

/// Typed helpers over [`EventBus`].
pub trait EventBusExt: EventBus {
    /// Serialize and emit a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Event`] if the payload cannot be serialized,
    /// or whatever [`EventBus::emit`] returns.
    fn emit_event<'a, P>(&'a self, event: &Event<P>) -> BoxFuture<'a, Result<(), EventBusError>>
    where
        P: Serialize,
    {
        match event.to_dispatched() {
            Ok(dispatched) => self.emit(dispatched),
            Err(error) => Box::pin(std::future::ready(Err(error.into()))),
        }
    }
}

impl<B: EventBus + ?Sized> EventBusExt for B {}
