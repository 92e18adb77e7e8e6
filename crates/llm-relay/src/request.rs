//! Request records and the per-request lifecycle state machine.
//!
//! Every dispatched prompt is tracked by a [`Request`] whose
//! [`RequestStatus`] moves one-way through
//! `Pending → InProgress → {Completed | Failed | Cancelled}`. Two
//! shortcuts exist: `Pending → Cancelled` (cancellation before dispatch)
//! and `Pending → Completed` (offline cache hit — no network phase ever
//! happens). Terminal states never transition again, and each actual
//! transition emits exactly one [`LifecycleEvent`](crate::LifecycleEvent)
//! to the observers the manager was built with.
//!
//! [`RequestHandle`] is the shared, cloneable view of one request. The
//! manager drives transitions; callers may [`cancel`](RequestHandle::cancel)
//! and inspect [`snapshot`](RequestHandle::snapshot).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::RelayError;
use crate::event::{LifecycleEvent, LifecycleEventKind, RelayObserver, unix_millis};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Produces a process-unique id like `req-42`.
pub(crate) fn next_id(prefix: &str) -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{n}")
}

/// Scheduling priority recorded on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Interactive work.
    #[default]
    Normal,
    /// Latency-sensitive work.
    High,
}

/// Where a request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched to an adapter; a network call may be in flight.
    InProgress,
    /// Finished with a completion. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// Cancelled by the caller. Terminal.
    Cancelled,
}

impl RequestStatus {
    /// Whether this status never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::InProgress | Self::Completed | Self::Cancelled) => true,
            (Self::InProgress, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// Machine-readable classification of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request exceeded its deadline.
    Timeout,
    /// No provider was registered when the request was submitted.
    NoActiveProvider,
    /// The selected provider's availability probe failed.
    ProviderUnavailable,
    /// A network/HTTP failure mid-call.
    Transport,
    /// The response body could not be parsed.
    Parse,
    /// The request options were malformed.
    Validation,
    /// The caller cancelled the request.
    Cancelled,
}

/// The error recorded on a request that reached `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestError {
    /// Machine-readable failure class.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Structured diagnostics, when available.
    pub details: Option<serde_json::Value>,
}

impl From<&RelayError> for RequestError {
    fn from(err: &RelayError) -> Self {
        let code = match err {
            RelayError::Timeout { .. } => ErrorCode::Timeout,
            RelayError::NoActiveProvider => ErrorCode::NoActiveProvider,
            RelayError::Unavailable { .. } => ErrorCode::ProviderUnavailable,
            RelayError::ResponseFormat { .. } => ErrorCode::Parse,
            RelayError::InvalidRequest(_) => ErrorCode::Validation,
            RelayError::Cancelled => ErrorCode::Cancelled,
            // Http and any future transport-class variants.
            _ => ErrorCode::Transport,
        };
        Self {
            code,
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// One tracked prompt submission.
///
/// `status` (and the `error` recorded alongside a failure) is the only
/// state that mutates during the request's life; once `status` is
/// terminal the record is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request id.
    pub id: String,
    /// The submitted prompt, verbatim.
    pub prompt: String,
    /// The model the request targets.
    pub model: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Submission time, in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// The failure recorded when `status == Failed`.
    pub error: Option<RequestError>,
}

struct Shared {
    state: Mutex<Request>,
    cancel_tx: watch::Sender<bool>,
    observers: Arc<[Arc<dyn RelayObserver>]>,
}

/// Cloneable handle to one in-flight request.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().expect("request state lock poisoned");
        f.debug_struct("RequestHandle")
            .field("id", &state.id)
            .field("status", &state.status)
            .finish()
    }
}

impl RequestHandle {
    /// Creates a `Pending` request and emits `Created`.
    pub(crate) fn create(
        observers: Arc<[Arc<dyn RelayObserver>]>,
        prompt: &str,
        model: &str,
        priority: Priority,
    ) -> Self {
        let request = Request {
            id: next_id("req"),
            prompt: prompt.to_owned(),
            model: model.to_owned(),
            priority,
            timestamp_ms: unix_millis(),
            status: RequestStatus::Pending,
            error: None,
        };
        let (cancel_tx, _) = watch::channel(false);
        let handle = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(request),
                cancel_tx,
                observers,
            }),
        };
        handle.emit(LifecycleEventKind::Created);
        handle
    }

    /// The request id.
    pub fn id(&self) -> String {
        self.shared
            .state
            .lock()
            .expect("request state lock poisoned")
            .id
            .clone()
    }

    /// A point-in-time copy of the request record.
    pub fn snapshot(&self) -> Request {
        self.shared
            .state
            .lock()
            .expect("request state lock poisoned")
            .clone()
    }

    /// The current status.
    pub fn status(&self) -> RequestStatus {
        self.shared
            .state
            .lock()
            .expect("request state lock poisoned")
            .status
    }

    /// Requests cancellation. Returns `true` if the request actually
    /// moved to `Cancelled` (it was `Pending` or `InProgress`).
    ///
    /// Cancellation is cooperative: in-flight adapter futures are
    /// dropped at the next suspension point and late data is discarded.
    pub fn cancel(&self) -> bool {
        let moved = self.transition(RequestStatus::Cancelled, None);
        if moved {
            // Wake anything selecting on cancellation.
            let _ = self.shared.cancel_tx.send(true);
        }
        moved
    }

    /// Resolves once the request has been cancelled.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.shared.cancel_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Sender lives in our own Arc; unreachable in practice.
                futures::future::pending::<()>().await;
            }
        }
    }

    /// `Pending → InProgress`, emitting `Started`.
    pub(crate) fn start(&self) -> bool {
        self.transition(RequestStatus::InProgress, None)
    }

    /// Moves to `Completed`, emitting `Completed`. Legal from `Pending`
    /// (cache short-circuit) and `InProgress`.
    pub(crate) fn complete(&self) -> bool {
        self.transition(RequestStatus::Completed, None)
    }

    /// `InProgress → Failed`, recording the error and emitting `Failed`.
    pub(crate) fn fail(&self, error: RequestError) -> bool {
        self.transition(RequestStatus::Failed, Some(error))
    }

    /// Emits `Progress` while the request is `InProgress`.
    pub(crate) fn progress(&self) {
        let in_progress = self.status() == RequestStatus::InProgress;
        if in_progress {
            self.emit(LifecycleEventKind::Progress);
        }
    }

    /// Applies a guarded transition, emitting its event exactly once.
    fn transition(&self, to: RequestStatus, error: Option<RequestError>) -> bool {
        let event_kind = {
            let mut state = self
                .shared
                .state
                .lock()
                .expect("request state lock poisoned");
            if !state.status.can_transition(to) {
                return false;
            }
            state.status = to;
            if to == RequestStatus::Failed {
                state.error = error;
            }
            match to {
                RequestStatus::InProgress => LifecycleEventKind::Started,
                RequestStatus::Completed => LifecycleEventKind::Completed,
                RequestStatus::Failed => LifecycleEventKind::Failed,
                RequestStatus::Cancelled => LifecycleEventKind::Cancelled,
                RequestStatus::Pending => unreachable!("no transition targets Pending"),
            }
        };
        self.emit(event_kind);
        true
    }

    fn emit(&self, kind: LifecycleEventKind) {
        let id = self.id();
        let event = LifecycleEvent::now(&id, kind);
        for observer in self.shared.observers.iter() {
            observer.on_lifecycle_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        events: StdMutex<Vec<LifecycleEventKind>>,
    }

    impl RelayObserver for Recorder {
        fn on_lifecycle_event(&self, event: &LifecycleEvent) {
            self.events.lock().unwrap().push(event.kind);
        }
    }

    fn tracked() -> (RequestHandle, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            events: StdMutex::new(Vec::new()),
        });
        let observers: Arc<[Arc<dyn RelayObserver>]> = Arc::from([recorder.clone() as _]);
        let handle =
            RequestHandle::create(observers, "ping", "test-model", Priority::Normal);
        (handle, recorder)
    }

    #[test]
    fn test_status_terminal_classification() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use RequestStatus::*;
        assert!(Pending.can_transition(InProgress));
        assert!(Pending.can_transition(Cancelled));
        assert!(Pending.can_transition(Completed)); // cache short-circuit
        assert!(InProgress.can_transition(Completed));
        assert!(InProgress.can_transition(Failed));
        assert!(InProgress.can_transition(Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        use RequestStatus::*;
        assert!(!Pending.can_transition(Failed));
        assert!(!InProgress.can_transition(Pending));
        for terminal in [Completed, Failed, Cancelled] {
            for to in [Pending, InProgress, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition(to), "{terminal:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_happy_path_events() {
        let (handle, recorder) = tracked();
        assert!(handle.start());
        assert!(handle.complete());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                LifecycleEventKind::Created,
                LifecycleEventKind::Started,
                LifecycleEventKind::Completed,
            ]
        );
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let (handle, recorder) = tracked();
        handle.start();
        handle.complete();
        assert!(!handle.complete());
        assert!(!handle.cancel());
        assert!(!handle.fail(RequestError::from(&RelayError::Cancelled)));
        // No extra events after the terminal transition.
        assert_eq!(recorder.events.lock().unwrap().len(), 3);
        assert_eq!(handle.status(), RequestStatus::Completed);
    }

    #[test]
    fn test_cancel_before_dispatch() {
        let (handle, recorder) = tracked();
        assert!(handle.cancel());
        assert_eq!(handle.status(), RequestStatus::Cancelled);
        assert!(!handle.start());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![LifecycleEventKind::Created, LifecycleEventKind::Cancelled]
        );
    }

    #[test]
    fn test_fail_records_error() {
        let (handle, _) = tracked();
        handle.start();
        let relay_err = RelayError::Timeout { elapsed_ms: 50 };
        assert!(handle.fail(RequestError::from(&relay_err)));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, RequestStatus::Failed);
        let error = snapshot.error.unwrap();
        assert_eq!(error.code, ErrorCode::Timeout);
        assert!(error.message.contains("50"));
    }

    #[test]
    fn test_fail_from_pending_rejected() {
        let (handle, _) = tracked();
        assert!(!handle.fail(RequestError::from(&RelayError::NoActiveProvider)));
        assert_eq!(handle.status(), RequestStatus::Pending);
    }

    #[test]
    fn test_progress_only_in_progress() {
        let (handle, recorder) = tracked();
        handle.progress(); // Pending: no event
        handle.start();
        handle.progress();
        handle.progress();
        handle.complete();
        handle.progress(); // terminal: no event

        let events = recorder.events.lock().unwrap();
        let progress = events
            .iter()
            .filter(|k| **k == LifecycleEventKind::Progress)
            .count();
        assert_eq!(progress, 2);
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let (handle, _) = tracked();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        assert!(handle.cancel());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_when_already_cancelled() {
        let (handle, _) = tracked();
        handle.cancel();
        handle.cancelled().await; // must not hang
    }

    #[test]
    fn test_error_code_mapping() {
        let cases = [
            (RelayError::NoActiveProvider, ErrorCode::NoActiveProvider),
            (
                RelayError::Unavailable {
                    provider: "p".into(),
                },
                ErrorCode::ProviderUnavailable,
            ),
            (
                RelayError::Http {
                    status: None,
                    message: "reset".into(),
                    retryable: true,
                },
                ErrorCode::Transport,
            ),
            (
                RelayError::ResponseFormat {
                    message: "bad".into(),
                    raw: String::new(),
                },
                ErrorCode::Parse,
            ),
            (RelayError::InvalidRequest("x".into()), ErrorCode::Validation),
            (RelayError::Cancelled, ErrorCode::Cancelled),
            (RelayError::Timeout { elapsed_ms: 1 }, ErrorCode::Timeout),
        ];
        for (err, code) in cases {
            assert_eq!(RequestError::from(&err).code, code, "{err}");
        }
    }

    #[test]
    fn test_error_code_serde_screaming() {
        let json = serde_json::to_string(&ErrorCode::Timeout).unwrap();
        assert_eq!(json, "\"TIMEOUT\"");
    }

    #[test]
    fn test_next_id_unique_and_prefixed() {
        let a = next_id("req");
        let b = next_id("req");
        assert!(a.starts_with("req-"));
        assert_ne!(a, b);
    }
}
