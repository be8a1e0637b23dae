//! Deriving UI state from a lifecycle's events.
//!
//! Views usually only need to know whether an operation is running and how
//! it last ended. [`LifecycleStatus`] folds the event stream of one
//! lifecycle into that summary.

use crate::event::{DispatchedEvent, Role};
use crate::lifecycle::{FailurePayload, Lifecycle};
use serde::de::DeserializeOwned;

/// Latest observed phase of a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase<R, F> {
    /// No occurrence has started yet
    #[default]
    Idle,
    /// At least one occurrence has started and the last event was a pending event
    Pending,
    /// The most recent terminal event was a success
    Succeeded(R),
    /// The most recent terminal event was a failure
    Failed(F),
}

/// Summary of a lifecycle folded from its events.
///
/// # Example
///
/// ```
/// use async_lifecycle_core::lifecycle::{Lifecycle, create_lifecycle};
/// use async_lifecycle_core::status::{LifecycleStatus, Phase};
///
/// let fetch: Lifecycle<u32, String> = create_lifecycle("fetchUser").unwrap();
/// let mut status = LifecycleStatus::new(fetch.clone());
///
/// status.apply(&fetch.pending.create_empty().to_dispatched().unwrap());
/// assert!(status.is_loading());
///
/// status.apply(&fetch.success.create("Ada".to_string()).to_dispatched().unwrap());
/// assert_eq!(status.phase(), &Phase::Succeeded("Ada".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct LifecycleStatus<T, R, F = Option<String>, P = ()> {
    lifecycle: Lifecycle<T, R, F, P>,
    phase: Phase<R, F>,
    in_flight: usize,
}

impl<T, R, F, P> LifecycleStatus<T, R, F, P>
where
    R: DeserializeOwned,
    F: DeserializeOwned + FailurePayload,
{
    /// Start tracking `lifecycle` from the idle phase.
    #[must_use]
    pub fn new(lifecycle: Lifecycle<T, R, F, P>) -> Self {
        Self {
            lifecycle,
            phase: Phase::Idle,
            in_flight: 0,
        }
    }

    /// Fold one event into the summary.
    ///
    /// Returns `false` (and changes nothing) for events of other lifecycles.
    /// A terminal payload that cannot be decoded is recorded as a failure
    /// carrying the decode error.
    pub fn apply(&mut self, event: &DispatchedEvent) -> bool {
        let Some(role) = self.lifecycle.role_of(&event.kind) else {
            return false;
        };

        match role {
            Role::Trigger => {},
            Role::Pending => {
                self.in_flight += 1;
                self.phase = Phase::Pending;
            },
            Role::Success => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.phase = match self.lifecycle.success.decode(event) {
                    Ok(decoded) => Phase::Succeeded(decoded.payload),
                    Err(error) => Phase::Failed(F::from_message(Some(error.to_string()))),
                };
            },
            Role::Failed => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let payload = self.lifecycle.failed.decode(event).map_or_else(
                    |error| F::from_message(Some(error.to_string())),
                    |decoded| decoded.payload,
                );
                self.phase = Phase::Failed(payload);
            },
        }
        true
    }

    /// The current phase.
    #[must_use]
    pub const fn phase(&self) -> &Phase<R, F> {
        &self.phase
    }

    /// Number of occurrences that have started but not yet ended.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Whether any occurrence is still running.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// The failure message of the last terminal event, if it failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(payload) => payload.message(),
            _ => None,
        }
    }

    /// The lifecycle being tracked.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle<T, R, F, P> {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::event::{EventKind, LifecycleName};
    use crate::lifecycle::create_lifecycle;
    use serde_json::json;

    fn fetch() -> Lifecycle<u32, String> {
        create_lifecycle("fetchUser").unwrap()
    }

    fn event(lifecycle: &Lifecycle<u32, String>, role: Role, payload: serde_json::Value) -> DispatchedEvent {
        DispatchedEvent::new(lifecycle.kind(role).clone(), payload)
    }

    #[test]
    fn starts_idle() {
        let status = LifecycleStatus::new(fetch());
        assert_eq!(status.phase(), &Phase::Idle);
        assert!(!status.is_loading());
    }

    #[test]
    fn trigger_alone_does_not_change_phase() {
        let lifecycle = fetch();
        let mut status = LifecycleStatus::new(lifecycle.clone());
        assert!(status.apply(&event(&lifecycle, Role::Trigger, json!(1))));
        assert_eq!(status.phase(), &Phase::Idle);
    }

    #[test]
    fn overlapping_occurrences_keep_loading_until_both_end() {
        let lifecycle = fetch();
        let mut status = LifecycleStatus::new(lifecycle.clone());

        status.apply(&event(&lifecycle, Role::Pending, json!(null)));
        status.apply(&event(&lifecycle, Role::Pending, json!(null)));
        assert_eq!(status.in_flight(), 2);

        status.apply(&event(&lifecycle, Role::Success, json!("Ada")));
        assert!(status.is_loading());
        assert_eq!(status.phase(), &Phase::Succeeded("Ada".to_string()));

        status.apply(&event(&lifecycle, Role::Failed, json!("boom")));
        assert!(!status.is_loading());
        assert_eq!(status.error_message(), Some("boom"));
    }

    #[test]
    fn failed_without_message() {
        let lifecycle = fetch();
        let mut status = LifecycleStatus::new(lifecycle.clone());
        status.apply(&event(&lifecycle, Role::Failed, json!(null)));
        assert_eq!(status.phase(), &Phase::Failed(None));
        assert_eq!(status.error_message(), None);
    }

    #[test]
    fn stray_terminal_event_does_not_underflow() {
        let lifecycle = fetch();
        let mut status = LifecycleStatus::new(lifecycle.clone());
        status.apply(&event(&lifecycle, Role::Success, json!("Ada")));
        assert_eq!(status.in_flight(), 0);
    }

    #[test]
    fn undecodable_success_is_reported_as_failure() {
        let lifecycle = fetch();
        let mut status = LifecycleStatus::new(lifecycle.clone());
        status.apply(&event(&lifecycle, Role::Success, json!(42)));
        assert!(status.error_message().is_some());
    }

    #[test]
    fn other_lifecycles_are_ignored() {
        let mut status = LifecycleStatus::new(fetch());
        let other = LifecycleName::new("saveUser").unwrap();
        let foreign = DispatchedEvent::new(EventKind::new(&other, Role::Pending), json!(null));
        assert!(!status.apply(&foreign));
        assert_eq!(status.in_flight(), 0);
    }
}
