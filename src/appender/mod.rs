//! Buffered-Appender Worker
//!
//! An asynchronous batching byte sink: any number of producers append, at
//! most one consumer thread drains. The mailbox runs a three-state worker
//! protocol under one mutex:
//!
//! - `Sleeping -> Ringing`: the first producer after a quiet period posts a
//!   take-call to the shared worker pool
//! - `Ringing -> Working`: the consumer moves the queued buffer into the
//!   working buffer, stamps its thread id, and invokes the sink outside the
//!   lock
//! - `Working -> Sleeping | Working`: after the drain, consumed-waiters are
//!   signaled; residual work keeps the state at Working and the drain loop
//!   re-runs
//!
//! Ordering: per-producer FIFO; across producers, mailbox lock-acquisition
//! order. `wait_flushed` observes every byte appended before it started.
//! A sink that fails must record the error out-of-band; the drain never
//! carries one.

mod buffer;
mod capture;

pub use buffer::{DrainQueue, WaitGate};
pub use capture::CaptureSink;

use crate::runtime;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::warn;

/// Byte-stream sink driven by the appender's consumer thread.
///
/// `consume` runs with exclusive ownership of the drained nodes and must
/// acknowledge what it wrote via [`DrainQueue::pop_consumed`]; unacknowledged
/// bytes stay queued and trigger another drain.
pub trait AppendSink: Send + Sync + 'static {
    fn consume(&self, buf: &mut DrainQueue);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WorkerState {
    Sleeping,
    Ringing,
    Working,
}

struct Mailbox {
    /// Blocks ready to drain, in append order.
    queue: DrainQueue,
    /// Residual working buffer left by the previous drain.
    working: DrainQueue,
    /// Gates signaled after the current drain completes.
    consumed_waiters: Vec<Arc<WaitGate>>,
    state: WorkerState,
    /// Identity of the thread currently holding consumer status.
    consumer: Option<ThreadId>,
}

/// Counters published by the appender; all relaxed.
#[derive(Default)]
pub struct AppenderStats {
    pub appended_bytes: AtomicU64,
    pub drains: AtomicU64,
}

/// Multi-producer, single-consumer buffered byte sink.
pub struct Appender<S: AppendSink> {
    mailbox: Mutex<Mailbox>,
    sink: S,
    stats: AppenderStats,
}

impl<S: AppendSink> Appender<S> {
    pub fn new(sink: S) -> Arc<Self> {
        Arc::new(Self {
            mailbox: Mutex::new(Mailbox {
                queue: DrainQueue::new(),
                working: DrainQueue::new(),
                consumed_waiters: Vec::new(),
                state: WorkerState::Sleeping,
                consumer: None,
            }),
            sink,
            stats: AppenderStats::default(),
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &AppenderStats {
        &self.stats
    }

    /// Enqueue `bytes`. Thread-safe, never blocks on the consumer; a
    /// zero-length append is a no-op that still honors later barriers.
    pub fn append(self: &Arc<Self>, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.stats
            .appended_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let mut mb = self.mailbox.lock();
        mb.queue.push_bytes(bytes);
        self.make_call_for_work(&mut mb);
    }

    /// Block until every byte appended before this call has been handed to
    /// the sink. Returns `false` on re-entry from inside `consume` (the
    /// barrier would deadlock) or if the worker pool is gone.
    pub fn wait_flushed(self: &Arc<Self>) -> bool {
        let my_id = thread::current().id();
        loop {
            let mut mb = self.mailbox.lock();
            if mb.consumer == Some(my_id) {
                return false;
            }
            let has_work = !mb.queue.is_empty() || !mb.working.is_empty();
            match mb.consumer {
                None if !has_work => return true,
                None => {
                    // No consumer holds the call: drain on this thread.
                    drop(mb);
                    self.take_call();
                }
                Some(_) => {
                    // Plant a flush waiter; it opens once every byte queued
                    // before it has reached the sink, which covers every
                    // append that returned before this call started.
                    let gate = Arc::new(WaitGate::new());
                    mb.queue.push_waiter(gate.clone());
                    drop(mb);
                    gate.wait();
                    return true;
                }
            }
        }
    }

    /// Block until the work queued right now has been acknowledged as
    /// consumed. May return sooner than `wait_flushed` when new appends
    /// arrive concurrently. Returns `false` on consumer re-entry or when a
    /// take-call cannot be posted.
    pub fn wait_consumed(self: &Arc<Self>) -> bool {
        let my_id = thread::current().id();
        let mut mb = self.mailbox.lock();
        if mb.consumer == Some(my_id) {
            return false;
        }
        let gate = Arc::new(WaitGate::new());
        mb.consumed_waiters.push(gate.clone());
        if !self.make_call_for_work(&mut mb) {
            mb.consumed_waiters.retain(|g| !Arc::ptr_eq(g, &gate));
            return false;
        }
        drop(mb);
        gate.wait();
        true
    }

    /// `Sleeping -> Ringing` + post a take-call; any other state already has
    /// a drain pending or running.
    fn make_call_for_work(self: &Arc<Self>, mb: &mut Mailbox) -> bool {
        if mb.state != WorkerState::Sleeping {
            return true;
        }
        mb.state = WorkerState::Ringing;
        let this = Arc::clone(self);
        let posted = runtime::default_pool().submit(move || this.drain_loop());
        if !posted {
            mb.state = WorkerState::Sleeping;
            warn!("appender take-call rejected; worker pool is shut down");
        }
        posted
    }

    fn drain_loop(self: &Arc<Self>) {
        while self.take_call() == WorkerState::Working {}
    }

    /// One drain pass. Takes consumer status, moves Q into W, runs the sink
    /// outside the lock, signals consumed-waiters, then reports whether work
    /// remains.
    fn take_call(self: &Arc<Self>) -> WorkerState {
        let mut mb = self.mailbox.lock();
        if mb.consumer.is_some() {
            // Another thread holds the call; it will loop over our work.
            return WorkerState::Sleeping;
        }
        mb.state = WorkerState::Working;
        mb.consumer = Some(thread::current().id());
        let mut work = std::mem::take(&mut mb.working);
        let mut queued = std::mem::take(&mut mb.queue);
        work.append_from(&mut queued);
        drop(mb);

        work.normalize();
        if work.chunk().is_some() {
            self.stats.drains.fetch_add(1, Ordering::Relaxed);
            self.sink.consume(&mut work);
            work.normalize();
        }

        let mut mb = self.mailbox.lock();
        mb.working = work;
        // Loop: a waiter planted while the lock was released for signaling
        // must not be stranded past the Sleeping transition.
        while !mb.consumed_waiters.is_empty() {
            let waiters = std::mem::take(&mut mb.consumed_waiters);
            drop(mb);
            for gate in waiters {
                gate.open();
            }
            mb = self.mailbox.lock();
        }
        mb.consumer = None;
        if mb.queue.is_empty() && mb.working.is_empty() {
            mb.state = WorkerState::Sleeping;
            WorkerState::Sleeping
        } else {
            mb.state = WorkerState::Working;
            WorkerState::Working
        }
    }
}
