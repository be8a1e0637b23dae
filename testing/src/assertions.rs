//! Checks over recorded lifecycle event logs
//!
//! The supervisor guarantees, per lifecycle, that every trigger is followed
//! by one pending event and later exactly one terminal event. Occurrences
//! may interleave, so the checks here count rather than pair events.

#![allow(clippy::panic)] // Assertion helpers panic by design

use async_lifecycle_core::event::{DispatchedEvent, LifecycleName, Role};
use async_lifecycle_core::event_bus::KindPattern;

/// Counts of each role observed for one lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleTally {
    /// Trigger events
    pub triggers: usize,
    /// Pending events
    pub pending: usize,
    /// Success events
    pub successes: usize,
    /// Failed events
    pub failures: usize,
}

impl LifecycleTally {
    /// Success plus failed events
    #[must_use]
    pub const fn terminals(&self) -> usize {
        self.successes + self.failures
    }
}

/// The roles of `name`'s events in `events`, in order.
#[must_use]
pub fn roles_of(events: &[DispatchedEvent], name: &LifecycleName) -> Vec<Role> {
    let pattern = KindPattern::Lifecycle(name.clone());
    events
        .iter()
        .filter(|event| pattern.matches(&event.kind))
        .filter_map(|event| event.kind.role())
        .collect()
}

/// Verify the lifecycle contract for `name` over a complete log.
///
/// Checks that at every point no more terminal events than pending events
/// have been seen, that pending events never outnumber triggers, and that
/// at the end every pending event has its terminal event.
///
/// # Errors
///
/// Returns a description of the first violation.
pub fn check_lifecycle(events: &[DispatchedEvent], name: &LifecycleName) -> Result<LifecycleTally, String> {
    let mut tally = LifecycleTally::default();

    for (index, role) in roles_of(events, name).into_iter().enumerate() {
        match role {
            Role::Trigger => tally.triggers += 1,
            Role::Pending => tally.pending += 1,
            Role::Success => tally.successes += 1,
            Role::Failed => tally.failures += 1,
        }

        if tally.pending > tally.triggers {
            return Err(format!("{name}: pending event #{index} has no trigger"));
        }
        if tally.terminals() > tally.pending {
            return Err(format!("{name}: terminal event #{index} was not preceded by a pending event"));
        }
    }

    if tally.terminals() != tally.pending {
        return Err(format!(
            "{name}: {} pending events but {} terminal events",
            tally.pending,
            tally.terminals()
        ));
    }
    Ok(tally)
}

/// Panic unless [`check_lifecycle`] accepts the log.
///
/// # Panics
///
/// Panics with the violation message.
#[track_caller]
pub fn assert_lifecycle(events: &[DispatchedEvent], name: &LifecycleName) -> LifecycleTally {
    match check_lifecycle(events, name) {
        Ok(tally) => tally,
        Err(violation) => panic!("lifecycle contract violated: {violation}\nlog: {events:#?}"),
    }
}
