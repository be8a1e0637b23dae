//! Worker contract.
//!
//! A worker performs the actual operation behind a lifecycle. It receives the
//! trigger event and returns a future; the future may await anything (other
//! events, network calls, timers) before resolving to the success payload or
//! a [`WorkerError`].
//!
//! Any `Fn(Event<T>) -> impl Future<Output = Result<R, E>>` closure is a
//! worker as long as `E` converts into [`WorkerError`]:
//!
//! ```
//! use async_lifecycle_core::event::Event;
//! use async_lifecycle_core::worker::{Worker, WorkerError};
//!
//! fn assert_worker<W: Worker<u32, String>>(_: &W) {}
//!
//! let worker = |trigger: Event<u32>| async move {
//!     if trigger.payload == 0 {
//!         return Err(WorkerError::msg("zero is not a user id"));
//!     }
//!     Ok(format!("user-{}", trigger.payload))
//! };
//! assert_worker(&worker);
//! ```

use crate::event::Event;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Abnormal termination of a worker.
///
/// Carries an optional human readable message; the supervisor forwards it
/// as the failed payload. An error without a message yields a failed event
/// without one.
///
/// Every [`std::error::Error`] converts into a `WorkerError` (its `Display`
/// output becomes the message), so `?` works inside workers. For that reason
/// this type does not implement `std::error::Error` itself.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerError {
    message: Option<String>,
}

impl WorkerError {
    /// An error carrying `message`.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// An error that carries no message.
    #[must_use]
    pub const fn without_message() -> Self {
        Self { message: None }
    }

    /// The error's message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Take the message out of the error.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
    }
}

impl<E> From<E> for WorkerError
where
    E: std::error::Error,
{
    fn from(error: E) -> Self {
        Self::msg(error.to_string())
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => f.write_str("worker failed without a message"),
        }
    }
}

impl fmt::Debug for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerError")
            .field("message", &self.message)
            .finish()
    }
}

/// The routine run for every trigger occurrence of a lifecycle.
///
/// # Type Parameters
///
/// - `T`: trigger payload
/// - `R`: success payload
///
/// The returned future is `'static` because each occurrence runs as its own
/// task; clone whatever the worker needs into the future.
pub trait Worker<T, R>: Send + Sync + 'static {
    /// Run the operation for one trigger.
    fn run(&self, trigger: Event<T>) -> BoxFuture<'static, Result<R, WorkerError>>;
}

impl<T, R, E, F, Fut> Worker<T, R> for F
where
    F: Fn(Event<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<WorkerError>,
{
    fn run(&self, trigger: Event<T>) -> BoxFuture<'static, Result<R, WorkerError>> {
        let fut = self(trigger);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::event::EventKind;

    #[derive(Debug)]
    struct Timeout;

    impl fmt::Display for Timeout {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request timed out")
        }
    }

    impl std::error::Error for Timeout {}

    fn trigger(payload: u32) -> Event<u32> {
        Event::new(EventKind::from_raw("double/trigger"), payload)
    }

    #[test]
    fn std_errors_convert_with_their_display() {
        let error: WorkerError = Timeout.into();
        assert_eq!(error.message(), Some("request timed out"));
    }

    #[test]
    fn messageless_error() {
        let error = WorkerError::without_message();
        assert_eq!(error.message(), None);
        assert_eq!(error.to_string(), "worker failed without a message");
    }

    #[tokio::test]
    async fn closures_are_workers() {
        let worker = |event: Event<u32>| async move { Ok::<_, WorkerError>(event.payload * 2) };
        assert_eq!(worker.run(trigger(21)).await.unwrap(), 42);
    }

    fn check_limit(value: u32) -> Result<u32, Timeout> {
        if value > 10 { Err(Timeout) } else { Ok(value) }
    }

    #[tokio::test]
    async fn question_mark_converts_std_errors() {
        let worker = |event: Event<u32>| async move {
            let value = check_limit(event.payload)?;
            Ok::<_, WorkerError>(value)
        };

        assert_eq!(worker.run(trigger(1)).await.unwrap(), 1);
        let error = worker.run(trigger(11)).await.unwrap_err();
        assert_eq!(error.message(), Some("request timed out"));
    }

    #[tokio::test]
    async fn worker_error_type_can_be_any_std_error() {
        let worker = |_: Event<u32>| async move { Err::<u32, _>(Timeout) };
        let error = worker.run(trigger(0)).await.unwrap_err();
        assert_eq!(error.into_message().as_deref(), Some("request timed out"));
    }
}
