//! Metrics emitted by supervised occurrences.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder (Prometheus, statsd, ...).
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `lifecycle.occurrences.started` | counter | `lifecycle` |
//! | `lifecycle.occurrences.succeeded` | counter | `lifecycle` |
//! | `lifecycle.occurrences.failed` | counter | `lifecycle` |
//! | `lifecycle.substrate.failures` | counter | `lifecycle` |
//! | `lifecycle.occurrence.duration_seconds` | histogram | `lifecycle`, `outcome` |

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Occurrences that emitted their pending event
pub const OCCURRENCES_STARTED: &str = "lifecycle.occurrences.started";
/// Occurrences that ended with a success event
pub const OCCURRENCES_SUCCEEDED: &str = "lifecycle.occurrences.succeeded";
/// Occurrences that ended with a failed event
pub const OCCURRENCES_FAILED: &str = "lifecycle.occurrences.failed";
/// Occurrences aborted because the bus rejected an emit
pub const SUBSTRATE_FAILURES: &str = "lifecycle.substrate.failures";
/// Wall time of an occurrence, from trigger pickup to terminal event
pub const OCCURRENCE_DURATION: &str = "lifecycle.occurrence.duration_seconds";

/// Register descriptions for every lifecycle metric.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(OCCURRENCES_STARTED, "Lifecycle occurrences started");
    describe_counter!(OCCURRENCES_SUCCEEDED, "Lifecycle occurrences that succeeded");
    describe_counter!(OCCURRENCES_FAILED, "Lifecycle occurrences that failed");
    describe_counter!(SUBSTRATE_FAILURES, "Occurrences aborted by event bus failures");
    describe_histogram!(
        OCCURRENCE_DURATION,
        Unit::Seconds,
        "Occurrence wall time from trigger pickup to terminal event"
    );
}

/// How an occurrence ended, for labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeeded,
    Failed,
    Aborted,
}

impl Outcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

pub(crate) fn record_started(lifecycle: &str) {
    counter!(OCCURRENCES_STARTED, "lifecycle" => lifecycle.to_string()).increment(1);
}

pub(crate) fn record_finished(lifecycle: &str, outcome: Outcome, elapsed: Duration) {
    let name = match outcome {
        Outcome::Succeeded => OCCURRENCES_SUCCEEDED,
        Outcome::Failed => OCCURRENCES_FAILED,
        Outcome::Aborted => SUBSTRATE_FAILURES,
    };
    counter!(name, "lifecycle" => lifecycle.to_string()).increment(1);
    histogram!(
        OCCURRENCE_DURATION,
        "lifecycle" => lifecycle.to_string(),
        "outcome" => outcome.label()
    )
    .record(elapsed.as_secs_f64());
}
