//! Registry and lifecycle events, and the observer seam.
//!
//! The manager does not own an event bus. Instead, observers implementing
//! [`RelayObserver`] are handed to [`ProviderManager`](crate::ProviderManager)
//! at construction time and invoked synchronously, in registration order,
//! after the mutation that produced the event has been committed and its
//! lock released. Delivery is at-least-once and in-order per source.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Saturates at zero if the system clock is before the epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// A change to the provider registration set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A provider was added under a new id.
    ProviderRegistered {
        /// The registration id.
        id: String,
    },
    /// A provider was removed.
    ProviderUnregistered {
        /// The registration id.
        id: String,
    },
    /// The default-provider pointer moved.
    DefaultProviderChanged {
        /// The id now holding the default flag, or `None` when the last
        /// provider was removed.
        id: Option<String>,
    },
}

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventKind {
    /// The request was created and is pending dispatch.
    Created,
    /// The request was dispatched to an adapter.
    Started,
    /// A streaming delta arrived for the request.
    Progress,
    /// The request finished with a completion.
    Completed,
    /// The request finished with an error.
    Failed,
    /// The caller cancelled the request.
    Cancelled,
}

/// One observation of a request's lifecycle.
///
/// Emitted exactly once per actual state transition (`Progress` is the
/// exception: once per delivered stream delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// The id of the affected request.
    pub request_id: String,
    /// When the transition happened, in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Which transition happened.
    pub kind: LifecycleEventKind,
}

impl LifecycleEvent {
    pub(crate) fn now(request_id: &str, kind: LifecycleEventKind) -> Self {
        Self {
            request_id: request_id.to_owned(),
            timestamp_ms: unix_millis(),
            kind,
        }
    }
}

/// Observer of registry and request-lifecycle events.
///
/// Both methods default to no-ops so an observer can subscribe to only
/// the events it cares about. Implementations must be cheap — they run
/// inline on the emitting task.
pub trait RelayObserver: Send + Sync {
    /// Called for every registration-set mutation.
    fn on_registry_event(&self, event: &RegistryEvent) {
        let _ = event;
    }

    /// Called for every request lifecycle transition.
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        let _ = event;
    }
}
