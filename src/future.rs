use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::types::{HttpResponse, SamplerError};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// What the network client eventually delivers. A failure may carry a
/// partial response when the data arrived but the client reported a late
/// error, e.g. a trailer failure after body delivery.
#[derive(Debug)]
pub enum RequestOutcome {
    Success(HttpResponse),
    Failure {
        error: SamplerError,
        partial: Option<HttpResponse>,
    },
}

type CompletionListener = Box<dyn FnOnce(&RequestOutcome) + Send>;

struct Slot {
    outcome: Option<RequestOutcome>,
    listener: Option<CompletionListener>,
    ended_at: Option<DateTime<Utc>>,
}

struct Shared {
    // Tri-state pending/completed/cancelled. A single CAS decides the
    // terminal state, so the completion callback and a racing cancel can
    // never both win.
    state: AtomicU8,
    slot: Mutex<Slot>,
    done: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            slot: Mutex::new(Slot {
                outcome: None,
                listener: None,
                ended_at: None,
            }),
            done: Condvar::new(),
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }
}

/// Best-effort abort of the underlying network operation, supplied by the
/// client that issued the request.
pub trait AbortHandle: Send {
    /// Returns whether the abort was accepted.
    fn abort(&self) -> bool;
}

/// Awaitable handle for one in-flight request. Completed exactly once by
/// the network client through its [`ResponseCompleter`]; consumed by the
/// issuing sampler or the scheduler checkpoint.
pub struct ResponseFuture {
    shared: Arc<Shared>,
    abort: Option<Box<dyn AbortHandle>>,
    started_at: DateTime<Utc>,
    started_instant: Instant,
}

/// Completion side handed to the network client. Consuming it enforces the
/// single-writer contract.
pub struct ResponseCompleter {
    shared: Arc<Shared>,
}

impl ResponseFuture {
    pub fn new() -> (ResponseFuture, ResponseCompleter) {
        let shared = Arc::new(Shared::new());
        let future = ResponseFuture {
            shared: shared.clone(),
            abort: None,
            started_at: Utc::now(),
            started_instant: Instant::now(),
        };
        (future, ResponseCompleter { shared })
    }

    pub fn set_abort_handle(&mut self, handle: Box<dyn AbortHandle>) {
        self.abort = Some(handle);
    }

    /// True iff the future reached a terminal state. Never blocks.
    pub fn is_done(&self) -> bool {
        self.shared.state() != PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state() == CANCELLED
    }

    /// Cancel the request and ask the underlying operation to abort.
    /// Returns whether the abort was accepted; a future that already
    /// completed cannot be cancelled and the completed data stays
    /// retrievable.
    pub fn cancel(&self) -> bool {
        if self
            .shared
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        {
            let mut slot = self.shared.slot.lock().unwrap();
            if slot.ended_at.is_none() {
                slot.ended_at = Some(Utc::now());
            }
        }
        self.shared.done.notify_all();

        match &self.abort {
            Some(handle) => handle.abort(),
            None => false,
        }
    }

    /// Block until the future reaches a terminal state.
    pub fn wait(&self) {
        // Check before any wait so zero-latency completions never sleep.
        if self.is_done() {
            return;
        }
        let mut slot = self.shared.slot.lock().unwrap();
        while self.shared.state() == PENDING {
            slot = self.shared.done.wait(slot).unwrap();
        }
    }

    /// Block until terminal state or the timeout elapses. A timeout leaves
    /// the future untouched; the network operation may still complete later.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), SamplerError> {
        if self.is_done() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock().unwrap();
        while self.shared.state() == PENDING {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(SamplerError::Timeout),
            };
            let (guard, wait) = self.shared.done.wait_timeout(slot, remaining).unwrap();
            slot = guard;
            if wait.timed_out() && self.shared.state() == PENDING {
                return Err(SamplerError::Timeout);
            }
        }
        Ok(())
    }

    /// Register a listener invoked from the completing thread when the
    /// request finishes. If the future already completed, the listener runs
    /// immediately on the calling thread.
    pub fn on_complete(&self, listener: CompletionListener) {
        let mut slot = self.shared.slot.lock().unwrap();
        if self.shared.state() == COMPLETED {
            if let Some(outcome) = slot.outcome.as_ref() {
                listener(outcome);
                return;
            }
        }
        slot.listener = Some(listener);
    }

    /// Consume a terminal future. Cancellation without prior completion
    /// signals [`SamplerError::Cancelled`]; a failure carrying a partial
    /// response yields the response and only logs the failure.
    pub fn result(self) -> Result<HttpResponse, SamplerError> {
        match self.shared.state() {
            CANCELLED => Err(SamplerError::Cancelled),
            COMPLETED => {
                let outcome = self.shared.slot.lock().unwrap().outcome.take();
                match outcome {
                    Some(RequestOutcome::Success(response)) => Ok(response),
                    Some(RequestOutcome::Failure {
                        error,
                        partial: Some(response),
                    }) => {
                        warn!(error = %error, "request reported a failure after response delivery, keeping the response");
                        Ok(response)
                    }
                    Some(RequestOutcome::Failure {
                        error,
                        partial: None,
                    }) => Err(error),
                    None => Err(SamplerError::RequestFailed(
                        "completed future holds no outcome".to_string(),
                    )),
                }
            }
            _ => Err(SamplerError::RequestFailed(
                "result requested on a pending future".to_string(),
            )),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.shared.slot.lock().unwrap().ended_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }
}

impl ResponseCompleter {
    /// Lets a transport skip work for a request that was cancelled before
    /// it got on the wire.
    pub fn is_cancelled(&self) -> bool {
        self.shared.state() == CANCELLED
    }

    /// Deliver the outcome. Only the first completion transitions the
    /// future; a completion racing with a cancel that already won still
    /// records the payload but the future stays cancelled.
    pub fn complete(self, outcome: RequestOutcome) {
        let won = self
            .shared
            .state
            .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        let listener = {
            let mut slot = self.shared.slot.lock().unwrap();
            if slot.ended_at.is_none() {
                slot.ended_at = Some(Utc::now());
            }
            slot.outcome = Some(outcome);
            if won {
                slot.listener.take()
            } else {
                debug!("late completion on a cancelled request, payload recorded");
                None
            }
        };

        if let Some(listener) = listener {
            let slot = self.shared.slot.lock().unwrap();
            if let Some(outcome) = slot.outcome.as_ref() {
                listener(outcome);
            }
        }

        self.shared.done.notify_all();
    }
}
