use crate::queue::WorkQueue;
use std::{fmt, hash::Hash, sync::Arc};
use tracing::Instrument;

/// Number of rate-limited retries granted to a key before the pool gives up
/// and waits for a fresh event to re-trigger it.
pub const MAX_RETRIES: u32 = 10;

/// Converges one application spec toward its declared state.
///
/// Implementations must be idempotent: reconciling the same key repeatedly
/// with no intervening changes performs no further mutations. All retry
/// decisions belong to the worker pool; implementations never retry
/// internally.
#[async_trait::async_trait]
pub trait Reconcile<K>: Send + Sync + 'static {
    async fn reconcile(&self, key: K) -> anyhow::Result<()>;
}

/// A fixed set of concurrent consumers draining the work queue.
pub struct WorkerPool<K, R> {
    queue: Arc<WorkQueue<K>>,
    reconciler: Arc<R>,
    workers: usize,
}

// === impl WorkerPool ===

impl<K, R> WorkerPool<K, R>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
    R: Reconcile<K>,
{
    pub fn new(queue: Arc<WorkQueue<K>>, reconciler: Arc<R>, workers: usize) -> Self {
        Self {
            queue,
            reconciler,
            workers,
        }
    }

    /// Runs the pool to completion, resolving once the queue shuts down and
    /// every in-flight pass has finished.
    pub async fn run(self) {
        let Self {
            queue,
            reconciler,
            workers,
        } = self;

        let tasks = (0..workers)
            .map(|worker| {
                tokio::spawn(
                    Self::work(queue.clone(), reconciler.clone())
                        .instrument(tracing::info_span!("worker", %worker)),
                )
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let _ = task.await;
        }
    }

    async fn work(queue: Arc<WorkQueue<K>>, reconciler: Arc<R>) {
        while let Some(key) = queue.get().await {
            match reconciler.reconcile(key.clone()).await {
                Ok(()) => {
                    queue.forget(&key);
                }
                Err(error) if queue.num_requeues(&key) < MAX_RETRIES => {
                    tracing::warn!(%key, %error, "Reconciliation failed; scheduling retry");
                    queue.add_rate_limited(key.clone());
                }
                Err(error) => {
                    tracing::error!(
                        %key,
                        %error,
                        retries = MAX_RETRIES,
                        "Reconciliation failed repeatedly; giving up until the next event",
                    );
                    queue.forget(&key);
                }
            }
            queue.done(&key);
        }
        tracing::debug!("Queue shut down");
    }
}
