//! Import Seeds
//!
//! One seed is one configured import target. Loads run the state machine
//! `Idle -> Loading -> Idle`, with a re-entrant request while loading
//! coalescing into a single pending `Reloading` pass. The load protocol asks
//! the handler for a loader plan, streams the file through it in blocks,
//! and records the textual outcome as the seed's result description.
//!
//! AddTail bookkeeping: `last_pos` is the file size at the end of the last
//! pass; the carry buffer holds the unterminated tail, so the fully parsed
//! prefix is always `last_pos - carry.len()`. A size regress resets both
//! and the pass reads the whole file.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::loader::ImpLoader;
use super::sch::Schedule;

const LOAD_BLOCK_SIZE: usize = 64 * 1024;

/// Monitor mode, persisted as the `Mon` field (`R`, `A`, or empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorMode {
    #[default]
    None,
    /// Any mtime change triggers a full reload.
    Reload,
    /// Size growth loads only the appended tail.
    AddTail,
}

impl MonitorMode {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "R" => Self::Reload,
            "A" => Self::AddTail,
            _ => Self::None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Reload => "R",
            Self::AddTail => "A",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    /// A reload was requested while loading; exactly one pending pass is
    /// remembered.
    Reloading,
}

/// How the handler wants this pass loaded.
pub enum LoaderPlan {
    /// Read the whole file; AddTail carry-over state is reset.
    FullReload(Box<dyn ImpLoader>),
    /// Read only `[last_pos, size)` with the carry-over prepended.
    AddTail(Box<dyn ImpLoader>),
    /// This seed cannot load right now.
    Unsupported,
}

/// Supplies loaders and receives completions for one seed.
pub trait ImportHandler: Send + Sync {
    /// Called at the start of each pass with the current file size and the
    /// configured monitor mode. A handler that cannot append-load may
    /// return `FullReload` even when the mode is `AddTail`.
    fn on_before_load(&self, file_size: u64, mode: MonitorMode) -> LoaderPlan;

    /// Called after the pass; the returned text becomes the seed's result
    /// description.
    fn on_after_load(&self, loader: Box<dyn ImpLoader>) -> String;
}

#[derive(Default)]
pub(crate) struct SeedState {
    pub file_name: String,
    pub monitor: MonitorMode,
    pub sch: Schedule,
    pub sch_str: String,
    pub result: String,
    pub state: LoadState,
    pub force_load_once: bool,
    pub last_file_time: Option<SystemTime>,
    pub last_pos: u64,
    pub carry: Vec<u8>,
}

/// One import target.
pub struct ImportSeed {
    name: String,
    handler: Box<dyn ImportHandler>,
    st: Mutex<SeedState>,
}

impl ImportSeed {
    pub fn new(
        name: impl Into<String>,
        file_name: impl Into<String>,
        monitor: MonitorMode,
        sch_str: &str,
        handler: Box<dyn ImportHandler>,
    ) -> Self {
        let sch = Schedule::parse(sch_str).unwrap_or_default();
        Self {
            name: name.into(),
            handler,
            st: Mutex::new(SeedState {
                file_name: file_name.into(),
                monitor,
                sch,
                sch_str: sch_str.to_string(),
                ..SeedState::default()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_name(&self) -> String {
        self.st.lock().file_name.clone()
    }

    pub fn monitor_mode(&self) -> MonitorMode {
        self.st.lock().monitor
    }

    pub fn schedule(&self) -> Schedule {
        self.st.lock().sch.clone()
    }

    pub fn result(&self) -> String {
        self.st.lock().result.clone()
    }

    pub fn state(&self) -> LoadState {
        self.st.lock().state
    }

    pub fn last_pos(&self) -> u64 {
        self.st.lock().last_pos
    }

    pub(crate) fn carry_len(&self) -> usize {
        self.st.lock().carry.len()
    }

    pub fn is_force_load_once(&self) -> bool {
        self.st.lock().force_load_once
    }

    /// Arm a one-shot load that bypasses the schedule at the next check;
    /// cleared inside `reload`.
    pub fn set_force_load_once(&self) {
        self.st.lock().force_load_once = true;
    }

    /// Update configuration fields. Monitor/schedule changes take effect on
    /// the next check; a changed file name resets AddTail state.
    pub fn configure(&self, file_name: Option<&str>, monitor: Option<MonitorMode>, sch: Option<&str>) {
        let mut st = self.st.lock();
        if let Some(f) = file_name {
            if f != st.file_name {
                st.file_name = f.to_string();
                st.last_file_time = None;
                st.last_pos = 0;
                st.carry.clear();
            }
        }
        if let Some(m) = monitor {
            st.monitor = m;
        }
        if let Some(s) = sch {
            st.sch_str = s.to_string();
            match Schedule::parse(s) {
                Ok(parsed) => st.sch = parsed,
                Err(e) => {
                    warn!(seed = %self.name, error = %e, "bad schedule expression");
                    st.sch = Schedule::default();
                }
            }
        }
    }

    pub(crate) fn sch_str(&self) -> String {
        self.st.lock().sch_str.clone()
    }

    /// Clear AddTail progress so the next pass reads the whole file.
    pub fn clear_reload(&self) {
        let mut st = self.st.lock();
        st.last_pos = 0;
        st.carry.clear();
        st.last_file_time = None;
    }

    /// Whether the monitor should trigger a load now.
    pub fn needs_load(&self) -> bool {
        let (file_name, monitor, last_time, last_pos) = {
            let st = self.st.lock();
            (
                st.file_name.clone(),
                st.monitor,
                st.last_file_time,
                st.last_pos,
            )
        };
        let meta = match std::fs::metadata(PathBuf::from(&file_name)) {
            Ok(m) => m,
            Err(_) => return false,
        };
        match monitor {
            MonitorMode::None => false,
            MonitorMode::Reload => meta.modified().ok() != last_time || last_time.is_none(),
            MonitorMode::AddTail => meta.len() != last_pos,
        }
    }

    /// Run one load (plus at most one coalesced pending pass). Blocks until
    /// finished. A caller arriving while a load is active only marks the
    /// pending pass and returns `false` immediately; the active loader picks
    /// it up.
    pub fn reload(&self) -> bool {
        {
            let mut st = self.st.lock();
            match st.state {
                LoadState::Idle => {
                    st.state = LoadState::Loading;
                    st.force_load_once = false;
                }
                LoadState::Loading | LoadState::Reloading => {
                    st.state = LoadState::Reloading;
                    st.result = "Loading".to_string();
                    return false;
                }
            }
        }
        loop {
            let outcome = self.load_once();
            let mut st = self.st.lock();
            match outcome {
                Ok(desc) => {
                    info!(seed = %self.name, %desc, "import loaded");
                    st.result = desc;
                }
                Err(e) => {
                    warn!(seed = %self.name, error = %e, "import failed");
                    st.result = format!("ERROR: {e:#}");
                }
            }
            if st.state == LoadState::Reloading {
                st.state = LoadState::Loading;
                continue;
            }
            st.state = LoadState::Idle;
            return true;
        }
    }

    fn load_once(&self) -> Result<String> {
        let (file_name, monitor) = {
            let st = self.st.lock();
            (st.file_name.clone(), st.monitor)
        };
        let mut file = File::open(&file_name)
            .with_context(|| format!("open import file {file_name:?}"))?;
        let meta = file.metadata().context("stat import file")?;
        let size = meta.len();
        let mtime = meta.modified().ok();

        match self.handler.on_before_load(size, monitor) {
            LoaderPlan::Unsupported => bail!("load not supported for this seed"),
            LoaderPlan::FullReload(mut loader) => {
                let consumed =
                    drive_blocks(&mut file, &mut *loader, &mut Vec::new(), size, true)?;
                let mut st = self.st.lock();
                st.last_pos = size;
                st.carry.clear();
                st.last_file_time = mtime;
                drop(st);
                debug!(seed = %self.name, size, consumed, "full reload pass");
                Ok(self.handler.on_after_load(loader))
            }
            LoaderPlan::AddTail(mut loader) => {
                let (start, mut carry) = {
                    let mut st = self.st.lock();
                    if size < st.last_pos {
                        // Size regressed: the previous image is gone.
                        debug!(seed = %self.name, size, last_pos = st.last_pos,
                               "size regress, falling back to full read");
                        st.last_pos = 0;
                        st.carry.clear();
                    }
                    (st.last_pos, std::mem::take(&mut st.carry))
                };
                file.seek(SeekFrom::Start(start)).context("seek to tail")?;
                drive_blocks(&mut file, &mut *loader, &mut carry, size - start, false)?;
                let mut st = self.st.lock();
                st.last_pos = size;
                st.carry = carry;
                st.last_file_time = mtime;
                drop(st);
                Ok(self.handler.on_after_load(loader))
            }
        }
    }
}

/// Stream `remaining` bytes from `file` through `loader` in blocks.
/// `pending` seeds the first block (carry-over) and holds the leftover tail
/// afterwards. With `flush_eof` the final partial line is delivered instead
/// of kept.
fn drive_blocks(
    file: &mut File,
    loader: &mut dyn ImpLoader,
    pending: &mut Vec<u8>,
    mut remaining: u64,
    flush_eof: bool,
) -> Result<u64> {
    let mut consumed_total = 0u64;
    let mut chunk = vec![0u8; LOAD_BLOCK_SIZE];
    loop {
        let want = remaining.min(LOAD_BLOCK_SIZE as u64) as usize;
        let got = if want == 0 {
            0
        } else {
            file.read(&mut chunk[..want]).context("read import block")?
        };
        remaining = remaining.saturating_sub(got as u64);
        pending.extend_from_slice(&chunk[..got]);
        let is_last = remaining == 0 || got == 0;

        let leftover = loader.on_load_block(pending, is_last && flush_eof);
        let consumed = pending.len() - leftover;
        consumed_total += consumed as u64;
        pending.drain(..consumed);

        if is_last {
            return Ok(consumed_total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::loader::LineCollector;
    use parking_lot::Mutex as PMutex;
    use std::io::Write;
    use std::sync::Arc;

    /// Handler collecting lines across passes; `tail` controls whether it
    /// honors AddTail.
    struct CollectHandler {
        lines: Arc<PMutex<Vec<String>>>,
        honor_add_tail: bool,
    }

    impl ImportHandler for CollectHandler {
        fn on_before_load(&self, _file_size: u64, mode: MonitorMode) -> LoaderPlan {
            let loader = Box::new(LineCollector::new());
            if mode == MonitorMode::AddTail && self.honor_add_tail {
                LoaderPlan::AddTail(loader)
            } else {
                LoaderPlan::FullReload(loader)
            }
        }

        fn on_after_load(&self, loader: Box<dyn ImpLoader>) -> String {
            let collector = loader
                .as_any()
                .downcast_ref::<LineCollector>()
                .expect("this handler only hands out LineCollector");
            let n = collector.line_count();
            self.lines.lock().extend(collector.lines.iter().cloned());
            format!("OK: {n} lines")
        }
    }

    fn seed_with(
        path: &str,
        monitor: MonitorMode,
        honor_add_tail: bool,
    ) -> (ImportSeed, Arc<PMutex<Vec<String>>>) {
        let lines = Arc::new(PMutex::new(Vec::new()));
        let seed = ImportSeed::new(
            "t",
            path,
            monitor,
            "",
            Box::new(CollectHandler {
                lines: lines.clone(),
                honor_add_tail,
            }),
        );
        (seed, lines)
    }

    #[test]
    fn test_full_reload() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"line1\nline2\n").unwrap();
        f.flush().unwrap();

        let (seed, lines) = seed_with(f.path().to_str().unwrap(), MonitorMode::Reload, false);
        assert!(seed.reload());
        assert_eq!(*lines.lock(), vec!["line1", "line2"]);
        assert_eq!(seed.result(), "OK: 2 lines");
        assert_eq!(seed.state(), LoadState::Idle);
    }

    #[test]
    fn test_full_reload_flushes_unterminated_tail() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"line1\nfinal-no-lf").unwrap();
        f.flush().unwrap();

        let (seed, lines) = seed_with(f.path().to_str().unwrap(), MonitorMode::Reload, false);
        assert!(seed.reload());
        assert_eq!(*lines.lock(), vec!["line1", "final-no-lf"]);
    }

    #[test]
    fn test_add_tail_grow_cycle() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"line1\nline2\n").unwrap();
        f.flush().unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let (seed, lines) = seed_with(&path, MonitorMode::AddTail, true);

        // Initial 12 bytes load fully.
        assert!(seed.reload());
        assert_eq!(*lines.lock(), vec!["line1", "line2"]);
        assert_eq!(seed.last_pos(), 12);
        assert_eq!(seed.carry_len(), 0);

        // Append "lin" (size 15): no line, carried over.
        f.write_all(b"lin").unwrap();
        f.flush().unwrap();
        assert!(seed.needs_load());
        assert!(seed.reload());
        assert_eq!(lines.lock().len(), 2, "no new line yet");
        assert_eq!(seed.last_pos(), 15);
        assert_eq!(seed.carry_len(), 3);

        // Append "e3\n" (size 18): line3 delivered, carry empty.
        f.write_all(b"e3\n").unwrap();
        f.flush().unwrap();
        assert!(seed.reload());
        assert_eq!(*lines.lock(), vec!["line1", "line2", "line3"]);
        assert_eq!(seed.last_pos(), 18);
        assert_eq!(seed.carry_len(), 0);
        assert!(!seed.needs_load());
    }

    #[test]
    fn test_add_tail_size_regress_reloads_fully() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"a\nb\nc\n").unwrap();
        f.flush().unwrap();
        let path = f.path().to_str().unwrap().to_string();

        let (seed, lines) = seed_with(&path, MonitorMode::AddTail, true);
        assert!(seed.reload());
        assert_eq!(lines.lock().len(), 3);

        // Truncate to a smaller file.
        std::fs::write(&path, b"x\n").unwrap();

        assert!(seed.needs_load());
        assert!(seed.reload());
        assert_eq!(lines.lock().last().unwrap(), "x");
        assert_eq!(seed.last_pos(), 2);
    }

    #[test]
    fn test_handler_downgrades_add_tail() {
        // Handler refuses AddTail: every pass is a full reload.
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"a\n").unwrap();
        f.flush().unwrap();

        let (seed, lines) = seed_with(f.path().to_str().unwrap(), MonitorMode::AddTail, false);
        assert!(seed.reload());
        f.write_all(b"b\n").unwrap();
        f.flush().unwrap();
        assert!(seed.reload());
        // Second pass re-read the whole file.
        assert_eq!(*lines.lock(), vec!["a", "a", "b"]);
    }

    #[test]
    fn test_missing_file_leaves_idle_with_error() {
        let (seed, _lines) = seed_with("/nonexistent/import.txt", MonitorMode::Reload, false);
        assert!(seed.reload());
        assert!(seed.result().starts_with("ERROR:"), "{}", seed.result());
        assert_eq!(seed.state(), LoadState::Idle);
    }

    #[test]
    fn test_force_load_once_cleared_by_reload() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"a\n").unwrap();
        f.flush().unwrap();
        let (seed, _lines) = seed_with(f.path().to_str().unwrap(), MonitorMode::None, false);

        seed.set_force_load_once();
        assert!(seed.is_force_load_once());
        assert!(seed.reload());
        assert!(!seed.is_force_load_once());
    }
}
