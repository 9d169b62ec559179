//! Bounded, thread-based resolution runtime.
//!
//! Every resolution request is an independent job on a fixed pool of
//! workers fed by a bounded queue. Interactive callers fail fast when the
//! queue is full; bulk import blocks for backpressure.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{ResolutionError, VendorError, VendorResult};
use crate::import::BulkRow;
use crate::resolver::VendorResolver;
use crate::result::MatchResult;
use crate::vendor::VendorMention;

/// A unit of resolution work.
#[derive(Debug, Clone)]
pub enum ResolveRequest {
    /// Interactive single mention.
    Mention(VendorMention),
    /// Bulk row with deterministic ids.
    ImportRow(BulkRow),
}

enum Job {
    Resolve {
        request: ResolveRequest,
        reply: Sender<VendorResult<MatchResult>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(workers: usize, queue_capacity: usize, resolver: &Arc<VendorResolver>) -> VendorResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx,
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let resolver = Arc::clone(resolver);
            let spawned = thread::Builder::new()
                .name(format!("vendor-resolve-{idx}"))
                .spawn(move || worker_loop(&rx, &resolver));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(VendorError::internal(format!("failed to spawn resolution worker: {e}")));
                }
            }
        }
        Ok(pool)
    }

    fn try_submit(&self, job: Job) -> VendorResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ResolutionError::QueueFull {
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ResolutionError::Disconnected.into()),
        }
    }

    fn submit(&self, job: Job) -> VendorResult<()> {
        self.tx.send(job).map_err(|_| ResolutionError::Disconnected.into())
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: &Receiver<Job>, resolver: &VendorResolver) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Resolve { request, reply } => {
                let result = match &request {
                    ResolveRequest::Mention(mention) => resolver.resolve(mention),
                    ResolveRequest::ImportRow(row) => resolver.resolve_import_row(row),
                };
                let _ = reply.send(result);
            }

            #[cfg(test)]
            Job::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
    debug!("resolution worker exiting");
}

/// Handle to a queued resolution.
pub struct ResolutionHandle {
    rx: Receiver<VendorResult<MatchResult>>,
}

impl ResolutionHandle {
    /// Waits for the resolution to complete.
    pub fn join(self) -> VendorResult<MatchResult> {
        self.rx.recv().map_err(|_| VendorError::from(ResolutionError::Disconnected))?
    }

    /// Waits for the resolution to complete with a timeout.
    pub fn join_timeout(self, timeout: Duration) -> VendorResult<MatchResult> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => VendorError::from(ResolutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => VendorError::from(ResolutionError::Disconnected),
        })?
    }
}

/// Worker pool executing resolutions against a shared resolver.
pub struct ResolutionRuntime {
    resolver: Arc<VendorResolver>,
    pool: Option<WorkerPool>,
}

impl ResolutionRuntime {
    /// Start `config.workers` workers.
    ///
    /// # Errors
    /// `Validation` for a zero-sized pool, `Internal` if a thread cannot be spawned.
    pub fn new(resolver: Arc<VendorResolver>, config: &RuntimeConfig) -> VendorResult<Self> {
        config.validate()?;
        let pool = WorkerPool::start(config.workers, config.queue_capacity, &resolver)?;
        Ok(Self {
            resolver,
            pool: Some(pool),
        })
    }

    fn pool(&self) -> VendorResult<&WorkerPool> {
        self.pool.as_ref().ok_or_else(|| ResolutionError::Disconnected.into())
    }

    /// Queue a mention, failing fast with `QueueFull`.
    pub fn resolve_async(&self, mention: VendorMention) -> VendorResult<ResolutionHandle> {
        let (tx, rx) = bounded::<VendorResult<MatchResult>>(1);
        self.pool()?.try_submit(Job::Resolve {
            request: ResolveRequest::Mention(mention),
            reply: tx,
        })?;
        Ok(ResolutionHandle { rx })
    }

    /// Queue a request, blocking while the queue is full.
    pub fn submit_blocking(&self, request: ResolveRequest) -> VendorResult<ResolutionHandle> {
        let (tx, rx) = bounded::<VendorResult<MatchResult>>(1);
        self.pool()?.submit(Job::Resolve { request, reply: tx })?;
        Ok(ResolutionHandle { rx })
    }

    /// Resolve a mention on the pool and wait for the result.
    pub fn resolve(&self, mention: VendorMention) -> VendorResult<MatchResult> {
        self.resolve_async(mention)?.join()
    }

    /// The shared resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<VendorResolver> {
        &self.resolver
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> VendorResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool()?.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for ResolutionRuntime {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::inference::LexicalCollaborator;
    use crate::result::Verdict;
    use crate::storage::{InMemoryVendorRegistry, VendorRegistry};

    fn runtime(workers: usize, queue_capacity: usize) -> (Arc<InMemoryVendorRegistry>, ResolutionRuntime) {
        let registry = Arc::new(InMemoryVendorRegistry::new());
        let resolver = VendorResolver::new(
            registry.clone(),
            Arc::new(LexicalCollaborator::new()),
            ResolverConfig::default(),
        )
        .unwrap();
        let runtime = ResolutionRuntime::new(
            Arc::new(resolver),
            &RuntimeConfig {
                workers,
                queue_capacity,
            },
        )
        .unwrap();
        (registry, runtime)
    }

    #[test]
    fn test_resolve_on_pool() {
        let (registry, runtime) = runtime(2, 16);
        let result = runtime
            .resolve(VendorMention::named("ACME GmbH").with_tax_id("DE123456789"))
            .unwrap();
        assert_eq!(result.verdict, Verdict::NewVendor);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_full_queue_fails_fast() {
        let (_registry, runtime) = runtime(1, 1);

        // Occupy the worker, then fill the single queue slot.
        let busy = runtime.submit_sleep(Duration::from_millis(200)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let queued = runtime.submit_sleep(Duration::from_millis(1)).unwrap();

        let err = runtime.resolve_async(VendorMention::named("Overflow")).err().unwrap();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::QueueFull { capacity: 1 })));
        assert!(err.is_retryable());

        busy.recv_timeout(Duration::from_secs(1)).unwrap();
        queued.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_drop_drains_queued_work() {
        let (registry, runtime) = runtime(1, 8);
        let handles: Vec<ResolutionHandle> = ["Alpha", "Beta", "Gamma"]
            .iter()
            .map(|n| runtime.submit_blocking(ResolveRequest::Mention(VendorMention::named(*n))).unwrap())
            .collect();
        drop(runtime);
        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert_eq!(registry.len().unwrap(), 3);
    }

    #[test]
    fn test_join_reports_disconnected_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<VendorResult<MatchResult>>(1);
        drop(tx);
        let err = ResolutionHandle { rx }.join().unwrap_err();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::Disconnected)));
    }

    #[test]
    fn test_join_timeout_reports_timeout() {
        let (_tx, rx) = bounded::<VendorResult<MatchResult>>(1);
        let err = ResolutionHandle { rx }.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, VendorError::Resolution(ResolutionError::Timeout { duration_ms: 10 })));
    }
}
