//! Main-thread dispatcher: the single sanctioned path from background
//! threads into shared session state.
//!
//! The discovery receive loop runs on its own OS thread, but all session,
//! directory, and peer-tracking state belongs to one logical owner thread
//! (the embedding host's update loop). Rather than guarding that state with
//! locks, background threads enqueue closures here and the owner thread
//! drains the queue once per tick, executing jobs in FIFO arrival order.
//! The cost is one tick of latency between "frame received" and "state
//! updated"; the payoff is that owner-thread code never contends on a lock.

use tokio::sync::mpsc;
use tracing::trace;

/// A unit of work scheduled onto the owner thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle for enqueuing work from any thread.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl DispatchHandle {
    /// Schedules `job` to run on the owner thread at its next drain.
    ///
    /// Jobs enqueued after the dispatcher is dropped are silently discarded;
    /// that only happens during shutdown, when the work is moot anyway.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            trace!("dispatcher dropped; discarding job");
        }
    }
}

/// Owner-thread side of the work queue.
///
/// Not `Clone` and not `Sync`: exactly one place drains it.
pub struct MainThreadDispatcher {
    rx: mpsc::UnboundedReceiver<Job>,
    handle: DispatchHandle,
}

impl MainThreadDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: DispatchHandle { tx },
        }
    }

    /// Returns a handle that background threads use to enqueue work.
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Runs every job queued so far, in FIFO arrival order.
    ///
    /// Returns the number of jobs executed. Call once per owner-thread tick.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

impl Default for MainThreadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
