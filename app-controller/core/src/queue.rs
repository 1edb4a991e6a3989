use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    hash::Hash,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Semaphore, time};

/// Base delay applied to the first rate-limited requeue of a key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Upper bound on the rate-limited requeue delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// A deduplicating, rate-limited work queue.
///
/// Keys added while already pending collapse into a single entry; keys added
/// while in flight are re-queued once the in-flight pass completes. A key is
/// delivered to at most one consumer at a time, so the same spec is never
/// reconciled concurrently by two workers.
///
/// Retry accounting is tracked per key: [`WorkQueue::add_rate_limited`]
/// re-adds a key after an exponential backoff, and [`WorkQueue::forget`]
/// resets the count once the key converges.
pub struct WorkQueue<K> {
    /// Holds one permit per pending item, plus one once shutdown begins.
    semaphore: Semaphore,
    state: Mutex<State<K>>,
    shutting_down: AtomicBool,
    base_delay: Duration,
    max_delay: Duration,
}

struct State<K> {
    pending: VecDeque<K>,
    /// Keys awaiting processing, including those that arrived while their
    /// previous pass was still in flight.
    dirty: HashSet<K>,
    in_flight: HashSet<K>,
    retries: HashMap<K, u32>,
}

// === impl WorkQueue ===

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            semaphore: Semaphore::new(0),
            state: Mutex::new(State {
                pending: VecDeque::new(),
                dirty: HashSet::new(),
                in_flight: HashSet::new(),
                retries: HashMap::new(),
            }),
            shutting_down: AtomicBool::new(false),
            base_delay,
            max_delay,
        }
    }

    /// Enqueues a key for processing.
    ///
    /// A key that is already pending is coalesced; a key that is currently in
    /// flight is queued again when its pass completes. Adds after shutdown
    /// are dropped.
    pub fn add(&self, key: K) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.in_flight.contains(&key) {
            return;
        }
        state.pending.push_back(key);
        drop(state);
        self.semaphore.add_permits(1);
    }

    /// Waits for the next key, or returns `None` once the queue has shut
    /// down and all pending items have been drained.
    pub async fn get(&self) -> Option<K> {
        let Ok(permit) = self.semaphore.acquire().await else {
            return None;
        };
        permit.forget();

        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(key) => {
                state.dirty.remove(&key);
                state.in_flight.insert(key.clone());
                Some(key)
            }
            None => {
                // Woken by shutdown rather than by an item; pass the wakeup
                // along so every consumer eventually observes it.
                drop(state);
                self.semaphore.add_permits(1);
                None
            }
        }
    }

    /// Marks a key's in-flight pass as finished, re-queueing it if it was
    /// touched while being processed.
    pub fn done(&self, key: &K) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if state.dirty.contains(key) && !self.shutting_down.load(Ordering::SeqCst) {
            state.pending.push_back(key.clone());
            drop(state);
            self.semaphore.add_permits(1);
        }
    }

    /// Re-adds a key after an exponential backoff and bumps its retry count.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = {
            let mut state = self.state.lock();
            let attempt = state.retries.entry(key.clone()).or_insert(0);
            *attempt += 1;
            self.backoff(*attempt)
        };
        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Clears retry accounting for a key.
    pub fn forget(&self, key: &K) {
        self.state.lock().retries.remove(key);
    }

    /// The number of rate-limited requeues recorded for a key since it was
    /// last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state.lock().retries.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the queue: subsequent adds are dropped and consumers drain the
    /// remaining items before observing shutdown.
    pub fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.semaphore.add_permits(1);
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReconcileKey;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(50);

    fn queue() -> Arc<WorkQueue<ReconcileKey>> {
        Arc::new(WorkQueue::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
        ))
    }

    fn key(name: &str) -> ReconcileKey {
        ReconcileKey::new("default", name)
    }

    #[tokio::test]
    async fn coalesces_pending_keys() {
        let q = queue();
        q.add(key("app1"));
        q.add(key("app1"));
        q.add(key("app1"));
        assert_eq!(q.len(), 1);

        assert_eq!(q.get().await, Some(key("app1")));
        assert!(timeout(TICK, q.get()).await.is_err(), "queue should be idle");
    }

    #[tokio::test]
    async fn in_flight_keys_requeue_on_done() {
        let q = queue();
        q.add(key("app1"));
        let k = q.get().await.expect("item");

        // Touched while in flight: not delivered again until done.
        q.add(k.clone());
        assert_eq!(q.len(), 0);
        assert!(timeout(TICK, q.get()).await.is_err());

        q.done(&k);
        assert_eq!(q.get().await, Some(k));
    }

    #[tokio::test]
    async fn drains_pending_items_before_shutdown() {
        let q = queue();
        q.add(key("app1"));
        q.add(key("app2"));
        q.shut_down();

        assert!(q.get().await.is_some());
        assert!(q.get().await.is_some());
        assert_eq!(q.get().await, None);
        // Every consumer observes shutdown, not just the first.
        assert_eq!(q.get().await, None);

        q.add(key("app3"));
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn rate_limited_adds_track_requeues() {
        let q = queue();
        assert_eq!(q.num_requeues(&key("app1")), 0);

        q.add_rate_limited(key("app1"));
        assert_eq!(q.num_requeues(&key("app1")), 1);
        assert_eq!(
            timeout(Duration::from_secs(1), q.get()).await.expect("requeued"),
            Some(key("app1"))
        );
        q.done(&key("app1"));

        q.add_rate_limited(key("app1"));
        assert_eq!(q.num_requeues(&key("app1")), 2);

        q.forget(&key("app1"));
        assert_eq!(q.num_requeues(&key("app1")), 0);
    }

    #[tokio::test]
    async fn delivers_to_concurrent_consumers() {
        let q = queue();
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(k) = q.get().await {
                    seen.push(k.clone());
                    q.done(&k);
                }
                seen
            }));
        }

        for i in 0..32 {
            q.add(key(&format!("app{i}")));
        }
        tokio::time::sleep(TICK).await;
        q.shut_down();

        let mut seen = Vec::new();
        for consumer in consumers {
            seen.extend(consumer.await.expect("consumer"));
        }
        seen.sort_by(|a, b| a.name.cmp(&b.name));
        seen.dedup();
        assert_eq!(seen.len(), 32, "every key delivered exactly once");
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let q = WorkQueue::<ReconcileKey>::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        );
        assert_eq!(q.backoff(1), Duration::from_millis(5));
        assert_eq!(q.backoff(2), Duration::from_millis(10));
        assert_eq!(q.backoff(5), Duration::from_millis(80));
        assert_eq!(q.backoff(64), Duration::from_secs(1000));
    }
}
