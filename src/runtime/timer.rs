//! Dedicated Timer Thread
//!
//! One thread, one deadline heap. Jobs run on the timer thread itself, so
//! they must stay short; anything heavier belongs on the worker pool (the
//! file importer follows that rule: the monitor tick runs here, the actual
//! load is dispatched to the pool).

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    at: Instant,
    seq: u64,
    job: Job,
}

// Min-heap on (at, seq): BinaryHeap is a max-heap, so invert the ordering.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

struct TimerShared {
    queue: Mutex<BinaryHeap<Entry>>,
    wakeup: Condvar,
    running: AtomicBool,
    seq: AtomicU64,
}

/// A dedicated thread firing scheduled jobs in deadline order.
pub struct TimerThread {
    shared: Arc<TimerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    pub fn start(name: &str) -> Self {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            running: AtomicBool::new(true),
            seq: AtomicU64::new(0),
        });
        let loop_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(loop_shared))
            .expect("failed to spawn timer thread");
        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Fire `job` once `deadline` passes. Returns `false` after `stop()`.
    pub fn schedule_at<F>(&self, deadline: Instant, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.shared.running.load(Ordering::Acquire) {
            return false;
        }
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        self.shared.queue.lock().push(Entry {
            at: deadline,
            seq,
            job: Box::new(job),
        });
        self.shared.wakeup.notify_one();
        true
    }

    pub fn schedule_after<F>(&self, delay: Duration, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_at(Instant::now() + delay, job)
    }

    /// Stop the thread; pending entries past this point are dropped.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wakeup.notify_one();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(shared: Arc<TimerShared>) {
    let mut queue = shared.queue.lock();
    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        match queue.peek() {
            None => {
                shared.wakeup.wait(&mut queue);
            }
            Some(front) if front.at > now => {
                let at = front.at;
                let _ = shared.wakeup.wait_until(&mut queue, at);
            }
            Some(_) => {
                let entry = queue.pop().expect("peeked entry vanished");
                drop(queue);
                (entry.job)();
                queue = shared.queue.lock();
            }
        }
    }
    debug!("timer thread exiting with {} pending entries", queue.len());
}
