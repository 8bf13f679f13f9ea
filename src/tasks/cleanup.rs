//! TTL Cleanup Coordinator
//!
//! Tracks pending expirations in a deadline-ordered queue and runs a single
//! background thread that sleeps until the nearest deadline, then evicts the
//! entry if it is still stored.
//!
//! The queue only holds [`EntryHandle`]s. Deleting, overwriting or evicting an
//! entry never touches the queue; the worker finds out the handle went stale
//! when it reaches the head and drops it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::cache::EntryHandle;

const WORKER_THREAD_NAME: &str = "ttl-lru-cleanup";

// == Expiry Sink ==
/// Cache-side callbacks used by the cleanup worker.
///
/// Implementations take their own lock; the worker never calls them while
/// holding the queue lock.
pub trait ExpirySink: Send + Sync {
    /// Whether `handle` still denotes a stored entry.
    fn is_live(&self, handle: EntryHandle) -> bool;

    /// Removes the entry behind `handle` if it is still stored.
    /// Returns true if something was removed.
    fn expire(&self, handle: EntryHandle) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Expiry {
    deadline: Instant,
    handle: EntryHandle,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Min-heap on deadline
    heap: BinaryHeap<Reverse<Expiry>>,
    started: bool,
    shutdown: bool,
    /// Bumped on every register/removal so the worker can tell whether the
    /// queue changed while it was checking liveness.
    epoch: u64,
}

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<QueueState>,
    wakeup: Condvar,
}

// == Cleanup Coordinator ==
/// Owns the expiration queue and the lifetime of the cleanup worker.
pub struct CleanupCoordinator {
    shared: Arc<Shared>,
    owner: Weak<dyn ExpirySink>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CleanupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.queue.lock();
        f.debug_struct("CleanupCoordinator")
            .field("pending", &state.heap.len())
            .field("started", &state.started)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl CleanupCoordinator {
    // == Constructor ==
    /// Creates a coordinator for `owner`. No thread is started until the first
    /// [`register`](Self::register).
    pub fn new(owner: Weak<dyn ExpirySink>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            owner,
            worker: Mutex::new(None),
        }
    }

    // == Register ==
    /// Queues `handle` for expiration at `deadline`, starting the worker on
    /// first use, and wakes the worker so it can shorten its wait.
    pub fn register(&self, handle: EntryHandle, deadline: Instant) {
        let mut state = self.shared.queue.lock();
        if state.shutdown {
            return;
        }

        state.heap.push(Reverse(Expiry { deadline, handle }));

        if !state.started {
            match self.spawn_worker() {
                Ok(join_handle) => {
                    state.started = true;
                    *self.worker.lock() = Some(join_handle);
                    debug!("Cleanup worker spawned");
                }
                // Expired entries are still dropped on access; retried on the
                // next registration.
                Err(err) => warn!("Failed to spawn cleanup worker: {}", err),
            }
        }

        state.epoch += 1;
        self.shared.wakeup.notify_one();
    }

    // == Notify Removed ==
    /// Tells the worker an entry was removed so it re-checks the queue head.
    pub fn notify_removed(&self) {
        let mut state = self.shared.queue.lock();
        state.epoch += 1;
        self.shared.wakeup.notify_one();
    }

    // == Shutdown ==
    /// Stops the worker and waits for it to exit. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.queue.lock();
            state.shutdown = true;
            self.shared.wakeup.notify_all();
        }

        let Some(join_handle) = self.worker.lock().take() else {
            return;
        };

        // The last cache reference can be released by the worker itself
        if join_handle.thread().id() == thread::current().id() {
            return;
        }

        if join_handle.join().is_err() {
            warn!("Cleanup worker panicked");
        }
    }

    /// Whether the worker thread has been started.
    pub fn is_started(&self) -> bool {
        self.shared.queue.lock().started
    }

    /// Number of queued references, stale ones included.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    fn spawn_worker(&self) -> std::io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let owner = self.owner.clone();

        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(&shared, &owner))
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// == Worker Loop ==
fn run_worker(shared: &Shared, owner: &Weak<dyn ExpirySink>) {
    info!("TTL cleanup worker started");

    loop {
        // Idle: wait until there is something to look at
        let (head, epoch) = {
            let mut state = shared.queue.lock();
            loop {
                if state.shutdown {
                    info!("TTL cleanup worker stopped");
                    return;
                }
                match state.heap.peek() {
                    Some(Reverse(expiry)) => break (*expiry, state.epoch),
                    None => shared.wakeup.wait(&mut state),
                }
            }
        };

        // Evaluating: the queue lock is released before touching the cache
        let Some(sink) = owner.upgrade() else {
            info!("Cache dropped, TTL cleanup worker stopped");
            return;
        };

        if !sink.is_live(head.handle) {
            trace!("Discarding stale expiration reference");
            discard_head(shared, head);
            continue;
        }

        if head.deadline <= Instant::now() {
            discard_head(shared, head);
            if sink.expire(head.handle) {
                debug!("TTL cleanup: evicted expired entry");
            }
            continue;
        }
        drop(sink);

        let mut state = shared.queue.lock();
        if state.epoch == epoch && !state.shutdown {
            shared.wakeup.wait_until(&mut state, head.deadline);
        }
    }
}

/// Pops `expiry` if it is still at the head of the queue.
fn discard_head(shared: &Shared, expiry: Expiry) {
    let mut state = shared.queue.lock();
    if state.heap.peek().map(|Reverse(head)| *head) == Some(expiry) {
        state.heap.pop();
    }
}
