//! Process-Wide Runtime: Worker Pool and Timer Thread
//!
//! Two scheduling substrates shared by the whole crate:
//!
//! - [`WorkerPool`] - a fixed set of named worker threads draining a
//!   channel of jobs; the appender posts its take-calls here and the file
//!   importer dispatches loads here so the timer thread never blocks.
//! - [`TimerThread`] - one dedicated thread firing deadline jobs; the file
//!   importer's monitor and schedule polling run on it.
//!
//! Both have process-wide defaults created on first use. The default pool
//! size is 4, overridable with `QUOTEWIRE_WORKER_THREADS`.

mod timer;
mod worker_pool;

pub use timer::TimerThread;
pub use worker_pool::WorkerPool;

use lazy_static::lazy_static;

const DEFAULT_WORKER_THREADS: usize = 4;

lazy_static! {
    static ref DEFAULT_POOL: WorkerPool = {
        let threads = std::env::var("QUOTEWIRE_WORKER_THREADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_WORKER_THREADS);
        WorkerPool::start("quotewire-worker", threads)
    };
    static ref DEFAULT_TIMER: TimerThread = TimerThread::start("quotewire-timer");
}

/// The shared worker pool, created on first use.
pub fn default_pool() -> &'static WorkerPool {
    &DEFAULT_POOL
}

/// The dedicated timer thread, created on first use.
pub fn default_timer() -> &'static TimerThread {
    &DEFAULT_TIMER
}
