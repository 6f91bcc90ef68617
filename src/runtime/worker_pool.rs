//! Shared Worker Thread Pool
//!
//! Fixed thread count, unbounded job channel, submits never block. Shutdown
//! posts one stop marker per worker and joins.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Run(Job),
    Stop,
}

/// A fixed pool of named worker threads draining a shared channel.
pub struct WorkerPool {
    tx: Sender<Task>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    stopping: AtomicBool,
    submitted: AtomicU64,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name}-{i}`.
    pub fn start(name: &str, threads: usize) -> Self {
        let (tx, rx) = unbounded::<Task>();
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx: Receiver<Task> = rx.clone();
            let thread_name = format!("{name}-{i}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        match task {
                            Task::Run(job) => job(),
                            Task::Stop => break,
                        }
                    }
                    debug!("worker thread {} exiting", thread_name);
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        Self {
            tx,
            threads: Mutex::new(handles),
            stopping: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
        }
    }

    /// Queue a job. Returns `false` once the pool is shutting down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stopping.load(Ordering::Acquire) {
            return false;
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.tx.send(Task::Run(Box::new(job))).is_ok()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Ask every worker to finish its queue and stop, then join them.
    /// Jobs already queued before the stop markers still run.
    pub fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.threads.lock());
        for _ in &handles {
            let _ = self.tx.send(Task::Stop);
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked before join");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_on_workers() {
        let pool = WorkerPool::start("test-pool", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = counter.clone();
            assert!(pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 16 {
            assert!(std::time::Instant::now() < deadline, "jobs did not drain");
            thread::sleep(Duration::from_millis(1));
        }
        pool.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::start("test-pool-stop", 1);
        pool.shutdown();
        assert!(!pool.submit(|| {}));
    }
}
