//! Import Manager
//!
//! Owns an [`ImportTree`] and drives it from the clock: the schedule oracle
//! is polled on the dedicated timer thread, monitor hits and schedule-entry
//! loads are dispatched to the shared worker pool so the timer never blocks
//! on file I/O.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::sch::Schedule;
use super::tree::ImportTree;
use crate::runtime;

#[derive(Debug, Clone)]
pub struct ImportMgrConfig {
    /// Monitor / schedule poll interval.
    pub monitor_interval: Duration,
    /// Manager-level schedule expression; empty = always in schedule.
    pub sch_expr: String,
}

impl Default for ImportMgrConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_millis(500),
            sch_expr: String::new(),
        }
    }
}

impl ImportMgrConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("QUOTEWIRE_IMP_MONITOR_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                if ms > 0 {
                    cfg.monitor_interval = Duration::from_millis(ms);
                }
            }
        }
        if let Ok(v) = std::env::var("QUOTEWIRE_IMP_SCH") {
            cfg.sch_expr = v;
        }
        cfg
    }
}

/// Schedule- and monitor-driven load manager for one import tree.
pub struct ImportMgr {
    tree: Arc<ImportTree>,
    sch: Schedule,
    cfg: ImportMgrConfig,
    in_sch: AtomicBool,
    running: AtomicBool,
}

impl ImportMgr {
    pub fn new(tree: Arc<ImportTree>, cfg: ImportMgrConfig) -> Result<Arc<Self>> {
        let sch = Schedule::parse(&cfg.sch_expr)
            .with_context(|| format!("manager schedule {:?}", cfg.sch_expr))?;
        Ok(Arc::new(Self {
            tree,
            sch,
            cfg,
            in_sch: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }))
    }

    pub fn tree(&self) -> &Arc<ImportTree> {
        &self.tree
    }

    pub fn is_in_schedule(&self) -> bool {
        self.in_sch.load(Ordering::Acquire)
    }

    /// Begin polling. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(interval = ?self.cfg.monitor_interval, "import manager started");
        let this = Arc::downgrade(self);
        runtime::default_timer().schedule_after(Duration::ZERO, move || {
            if let Some(mgr) = this.upgrade() {
                mgr.tick();
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Load every seed now, on the calling thread; returns when finished.
    pub fn load_all(&self) {
        self.tree.load_all();
    }

    /// One poll: schedule transition, then monitor checks. Runs on the
    /// timer thread; anything that touches files goes to the worker pool.
    fn tick(self: Arc<Self>) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let now_in = self.sch.is_in_now();
        let was_in = self.in_sch.swap(now_in, Ordering::AcqRel);
        if was_in != now_in {
            self.on_sch_task_state_changed(now_in);
        }

        self.tree.for_each_seed(|seed| {
            // Force-load bypasses the schedule gate; monitor hits honor it.
            let fire = seed.is_force_load_once() || (now_in && seed.needs_load());
            if fire {
                let seed = seed.clone();
                runtime::default_pool().submit(move || {
                    seed.reload();
                });
            }
        });

        // Weak: a dropped manager must not be kept alive by its own tick.
        let this = Arc::downgrade(&self);
        runtime::default_timer().schedule_after(self.cfg.monitor_interval, move || {
            if let Some(mgr) = this.upgrade() {
                mgr.tick();
            }
        });
    }

    /// Schedule boundary crossed. Entering schedule loads everything;
    /// leaving merely stops monitor-triggered loads (an active load is not
    /// cancelled).
    fn on_sch_task_state_changed(&self, is_in: bool) {
        info!(is_in, "import schedule state changed");
        if is_in {
            let tree = self.tree.clone();
            runtime::default_pool().submit(move || tree.load_all());
        } else {
            debug!("monitor loads gated off until next schedule window");
        }
    }
}

impl Drop for ImportMgr {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::loader::{ImpLoader, LineCollector};
    use crate::imp::seed::{ImportHandler, ImportSeed, LoaderPlan, MonitorMode};
    use parking_lot::Mutex;
    use std::io::Write;
    use std::time::Instant;

    struct TailHandler {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl ImportHandler for TailHandler {
        fn on_before_load(&self, _size: u64, mode: MonitorMode) -> LoaderPlan {
            let loader = Box::new(LineCollector::new());
            match mode {
                MonitorMode::AddTail => LoaderPlan::AddTail(loader),
                _ => LoaderPlan::FullReload(loader),
            }
        }
        fn on_after_load(&self, loader: Box<dyn ImpLoader>) -> String {
            let collector = loader.as_any().downcast_ref::<LineCollector>().unwrap();
            self.lines.lock().extend(collector.lines.iter().cloned());
            format!("OK: {} lines", collector.line_count())
        }
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_monitor_picks_up_tail_growth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"one\n").unwrap();
        file.flush().unwrap();

        let lines = Arc::new(Mutex::new(Vec::new()));
        let tree = ImportTree::new();
        tree.add_seed(ImportSeed::new(
            "tail",
            file.path().to_str().unwrap(),
            MonitorMode::AddTail,
            "",
            Box::new(TailHandler {
                lines: lines.clone(),
            }),
        ));

        let mgr = ImportMgr::new(
            tree,
            ImportMgrConfig {
                monitor_interval: Duration::from_millis(20),
                sch_expr: String::new(),
            },
        )
        .unwrap();
        mgr.start();

        assert!(wait_until(3000, || lines.lock().len() == 1));
        assert_eq!(lines.lock()[0], "one");

        file.write_all(b"two\n").unwrap();
        file.flush().unwrap();
        assert!(wait_until(3000, || lines.lock().len() == 2));
        assert_eq!(lines.lock()[1], "two");

        mgr.stop();
    }

    #[test]
    fn test_out_of_schedule_gates_monitor_but_not_force() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"one\n").unwrap();
        file.flush().unwrap();

        let lines = Arc::new(Mutex::new(Vec::new()));
        let tree = ImportTree::new();
        let seed = tree.add_seed(ImportSeed::new(
            "gated",
            file.path().to_str().unwrap(),
            MonitorMode::Reload,
            "",
            Box::new(TailHandler {
                lines: lines.clone(),
            }),
        ));

        // An empty window: never in schedule.
        let mgr = ImportMgr::new(
            tree,
            ImportMgrConfig {
                monitor_interval: Duration::from_millis(20),
                sch_expr: "0000-0000".to_string(),
            },
        )
        .unwrap();
        mgr.start();

        std::thread::sleep(Duration::from_millis(150));
        assert!(lines.lock().is_empty(), "monitor load fired out of schedule");
        assert!(!mgr.is_in_schedule());

        // Force-load bypasses the gate and clears itself.
        seed.set_force_load_once();
        assert!(wait_until(3000, || lines.lock().len() == 1));
        assert!(!seed.is_force_load_once());

        mgr.stop();
    }
}
