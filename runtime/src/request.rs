//! Emit a trigger and wait for the lifecycle's terminal event.
//!
//! Designed for request-response call sites (HTTP handlers, RPC) that want
//! the outcome of a lifecycle without observing its events themselves.
//!
//! # Correlation
//!
//! Terminal events carry no occurrence id. If several occurrences of the
//! same lifecycle overlap, `request` returns whichever terminal event
//! arrives first, which may belong to another caller's trigger.

use crate::error::SupervisorError;
use async_lifecycle_core::event::Role;
use async_lifecycle_core::event_bus::{EventBus, EventBusExt, KindPattern};
use async_lifecycle_core::lifecycle::Lifecycle;
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Emit a trigger carrying `payload` and wait for success or failure.
///
/// # How It Works
///
/// 1. Subscribe to the success and failed kinds BEFORE emitting (avoids missing a fast worker)
/// 2. Emit the trigger
/// 3. Return the first terminal event, decoded
///
/// # Returns
///
/// `Ok(Ok(result))` on a success event, `Ok(Err(failure))` on a failed event.
///
/// # Errors
///
/// - [`SupervisorError::Bus`]: the subscribe or emit was rejected
/// - [`SupervisorError::Timeout`]: no terminal event within `timeout`
/// - [`SupervisorError::StreamClosed`]: the bus closed while waiting
/// - [`SupervisorError::Decode`]: the terminal payload had the wrong shape
///
/// # Example
///
/// ```ignore
/// match request(&*bus, &fetch_user, UserQuery { id: 1 }, Duration::from_secs(5)).await? {
///     Ok(user) => println!("loaded {}", user.name),
///     Err(message) => eprintln!("failed: {message:?}"),
/// }
/// ```
#[tracing::instrument(skip_all, fields(lifecycle = %lifecycle.name()))]
pub async fn request<B, T, R, F, P>(
    bus: &B,
    lifecycle: &Lifecycle<T, R, F, P>,
    payload: T,
    timeout: Duration,
) -> Result<Result<R, F>, SupervisorError>
where
    B: EventBus + ?Sized,
    T: Serialize,
    R: DeserializeOwned,
    F: DeserializeOwned,
{
    // Subscribe BEFORE emitting to avoid a race with the worker
    let mut terminals = bus
        .subscribe(KindPattern::OneOf(vec![
            lifecycle.kind(Role::Success).clone(),
            lifecycle.kind(Role::Failed).clone(),
        ]))
        .await?;

    bus.emit_event(&lifecycle.trigger.create(payload)).await?;

    let event = tokio::time::timeout(timeout, terminals.next())
        .await
        .map_err(|_| SupervisorError::Timeout)?
        .ok_or(SupervisorError::StreamClosed)?;

    if lifecycle.success.matches(&event) {
        let success = lifecycle
            .success
            .decode(&event)
            .map_err(|e| SupervisorError::Decode(e.to_string()))?;
        tracing::debug!("Request succeeded");
        Ok(Ok(success.payload))
    } else {
        let failed = lifecycle
            .failed
            .decode(&event)
            .map_err(|e| SupervisorError::Decode(e.to_string()))?;
        tracing::debug!("Request failed");
        Ok(Err(failed.payload))
    }
}
