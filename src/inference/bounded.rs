//! Timeout and retry wrapper around a collaborator.
//!
//! Calls run on a fixed set of worker threads fed by a bounded queue, so a
//! collaborator that hangs holds at most `workers` threads. Once every
//! worker is stuck and the queue is full, new calls are rejected at once.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::inference::{CandidateScore, InferenceCollaborator, SubsidiaryJudgement};
use crate::normalize::NormalizedMention;
use crate::vendor::VendorRecord;

type Call = Box<dyn FnOnce() + Send>;

/// Why a single attempt failed.
enum AttemptError {
    /// The call never reached a worker. Not retried.
    Rejected(ResolutionError),
    /// The call ran, failed or timed out.
    Failed(ResolutionError),
}

/// Waits at most `timeout` for each collaborator call and retries failed
/// calls with exponential backoff.
///
/// A call that times out is abandoned: its worker finishes in the
/// background and the late answer is discarded. Calls still queued when
/// their caller gave up are skipped.
#[derive(Clone)]
pub struct BoundedCollaborator {
    inner: Arc<dyn InferenceCollaborator>,
    calls: Sender<Call>,
    queue_capacity: usize,
    timeout: Duration,
    attempts: u32,
    backoff: Duration,
}

impl BoundedCollaborator {
    /// Wrap `inner` with a per-call timeout and a single attempt, served by
    /// `workers` threads and at most `queue_capacity` waiting calls.
    ///
    /// Workers are detached and exit once every clone of the wrapper is
    /// dropped and their current call returns.
    ///
    /// # Errors
    /// `CollaboratorUnavailable` if a worker thread cannot be spawned.
    pub fn spawn(
        inner: Arc<dyn InferenceCollaborator>,
        timeout: Duration,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self, ResolutionError> {
        let queue_capacity = queue_capacity.max(1);
        let (calls, rx) = bounded::<Call>(queue_capacity);
        for idx in 0..workers.max(1) {
            let rx: Receiver<Call> = rx.clone();
            thread::Builder::new()
                .name(format!("collaborator-{idx}"))
                .spawn(move || worker_loop(&rx))
                .map_err(|e| ResolutionError::CollaboratorUnavailable {
                    message: format!("failed to spawn collaborator worker: {e}"),
                })?;
        }
        Ok(Self {
            inner,
            calls,
            queue_capacity,
            timeout,
            attempts: 1,
            backoff: Duration::ZERO,
        })
    }

    /// Retry failed calls up to `attempts` times in total.
    #[must_use]
    pub fn with_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// The configured per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, ResolutionError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn InferenceCollaborator>) -> Result<T, ResolutionError> + Clone + Send + 'static,
    {
        let mut last_err = ResolutionError::CollaboratorUnavailable {
            message: "no attempt made".to_string(),
        };
        for attempt in 0..self.attempts {
            if attempt > 0 {
                thread::sleep(self.backoff.saturating_mul(1 << (attempt - 1).min(16)));
            }
            match self.call_once(op, f.clone()) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Rejected(err)) => {
                    warn!(op, error = %err, "collaborator call rejected");
                    return Err(err);
                }
                Err(AttemptError::Failed(err)) => {
                    warn!(op, attempt = attempt + 1, max_attempts = self.attempts, error = %err, "collaborator call failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn call_once<T, F>(&self, op: &'static str, f: F) -> Result<T, AttemptError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn InferenceCollaborator>) -> Result<T, ResolutionError> + Send + 'static,
    {
        let (tx, rx) = bounded::<Result<T, ResolutionError>>(1);
        let inner = Arc::clone(&self.inner);
        let deadline = Instant::now().checked_add(self.timeout);
        let call: Call = Box::new(move || {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return;
            }
            let _ = tx.send(f(inner));
        });

        match self.calls.try_send(call) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(AttemptError::Rejected(ResolutionError::CollaboratorUnavailable {
                    message: format!("{op} rejected: {} calls already waiting", self.queue_capacity),
                }))
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(AttemptError::Rejected(ResolutionError::CollaboratorUnavailable {
                    message: "collaborator workers have stopped".to_string(),
                }))
            }
        }

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result.map_err(AttemptError::Failed),
            Err(RecvTimeoutError::Timeout) => Err(AttemptError::Failed(ResolutionError::CollaboratorTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })),
            Err(RecvTimeoutError::Disconnected) => Err(AttemptError::Failed(ResolutionError::CollaboratorUnavailable {
                message: format!("{op} call terminated without a reply"),
            })),
        }
    }
}

fn worker_loop(rx: &Receiver<Call>) {
    while let Ok(call) = rx.recv() {
        call();
    }
    debug!("collaborator worker exiting");
}

impl InferenceCollaborator for BoundedCollaborator {
    fn score(
        &self,
        mention: &NormalizedMention,
        pool: &[VendorRecord],
    ) -> Result<Vec<CandidateScore>, ResolutionError> {
        let mention = Arc::new(mention.clone());
        let pool: Arc<[VendorRecord]> = pool.into();
        self.call("score", move |inner| inner.score(&mention, &pool))
    }

    fn judge_subsidiary(
        &self,
        mention: &NormalizedMention,
        parent: &VendorRecord,
    ) -> Result<SubsidiaryJudgement, ResolutionError> {
        let mention = Arc::new(mention.clone());
        let parent = Arc::new(parent.clone());
        self.call("judge_subsidiary", move |inner| inner.judge_subsidiary(&mention, &parent))
    }
}
