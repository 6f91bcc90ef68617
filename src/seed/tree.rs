//! Tree Layouts and Operations
//!
//! A tree exposes a [`Layout`]: a key field plus one or more [`Tab`]s, each a
//! named set of typed [`Field`]s. Pods are rows keyed by a byte string; every
//! operation on a tree is asynchronous — the implementation may complete the
//! callback inline, on its own op queue, or on the worker pool. Callers hold
//! no locks across these calls.
//!
//! [`BasicTree`] is the in-memory ordered implementation used for
//! configuration data and tests; the file importer builds its pod tree on the
//! same trait.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

use super::error::{OpErr, OpResult};
use crate::pool::SlotPool;

// =============================================================================
// Fields, cells, rows
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Str,
    U64,
    I64,
    Price,
}

/// One typed column on a tab.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    /// Cell index within the tab's rows.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Str(String),
    U64(u64),
    I64(i64),
    Price(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Str(v) => f.write_str(v),
            Cell::U64(v) => write!(f, "{v}"),
            Cell::I64(v) => write!(f, "{v}"),
            Cell::Price(v) => write!(f, "{v}"),
        }
    }
}

/// One pod row on one tab: cells aligned with the tab's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRow {
    cells: Vec<Cell>,
}

impl SeedRow {
    /// A row of empty cells matching `tab`'s field types.
    pub fn new_for(tab: &Tab) -> Self {
        let cells = tab
            .fields
            .iter()
            .map(|f| match f.ty {
                FieldType::Str => Cell::Str(String::new()),
                FieldType::U64 => Cell::U64(0),
                FieldType::I64 => Cell::I64(0),
                FieldType::Price => Cell::Price(0.0),
            })
            .collect();
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Grid rendering: `|`-separated cells.
    pub fn render(&self) -> String {
        self.cells
            .iter()
            .map(Cell::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType, index: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            index,
        }
    }

    /// Parse `val` into this field's cell on `row`.
    pub fn str_to_cell(&self, row: &mut SeedRow, val: &str) -> OpResult<()> {
        let cell = row.cell_mut(self.index).ok_or(OpErr::FieldNotFound)?;
        match self.ty {
            FieldType::Str => *cell = Cell::Str(val.to_string()),
            FieldType::U64 => {
                *cell = Cell::U64(val.parse().map_err(|_| OpErr::StrToCellFailed)?)
            }
            FieldType::I64 => {
                *cell = Cell::I64(val.parse().map_err(|_| OpErr::StrToCellFailed)?)
            }
            FieldType::Price => {
                *cell = Cell::Price(val.parse().map_err(|_| OpErr::StrToCellFailed)?)
            }
        }
        Ok(())
    }

    /// Render this field's cell on `row`.
    pub fn cell_to_str(&self, row: &SeedRow) -> String {
        row.cell(self.index).map(Cell::to_string).unwrap_or_default()
    }
}

// =============================================================================
// Tabs and layouts
// =============================================================================

/// A named column family.
#[derive(Debug, Clone)]
pub struct Tab {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Tab {
    pub fn new(name: impl Into<String>, fields: &[(&str, FieldType)]) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, (n, ty))| Field::new(*n, *ty, i))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A tree's schema: the key column plus its tabs.
#[derive(Debug, Clone)]
pub struct Layout {
    pub key_name: String,
    pub tabs: Vec<Tab>,
}

impl Layout {
    pub fn new(key_name: impl Into<String>, tabs: Vec<Tab>) -> Self {
        Self {
            key_name: key_name.into(),
            tabs,
        }
    }

    pub fn tab(&self, index: usize) -> Option<&Tab> {
        self.tabs.get(index)
    }

    /// Resolve a tab selector: empty means the first tab.
    pub fn tab_by_name_or_first(&self, name: &str) -> Option<(usize, &Tab)> {
        if name.is_empty() {
            return self.tabs.first().map(|t| (0, t));
        }
        self.tabs
            .iter()
            .enumerate()
            .find(|(_, t)| t.name == name)
    }
}

// =============================================================================
// Notifications and grid views
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Changed,
    Removed,
}

/// One subscription notification.
#[derive(Debug, Clone)]
pub struct SeedNotify {
    pub kind: NotifyKind,
    pub key: String,
    pub tab: String,
    /// Rendered row for `Changed`; empty for `Removed`.
    pub row: String,
}

pub type NotifyFn = Arc<dyn Fn(&SeedNotify) + Send + Sync>;

/// Subscription handle issued by a tree: the tab plus the subject's pooled
/// slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubConn {
    pub tab: usize,
    pub slot: usize,
}

/// Subscriber registry for one (tree, tab). Teardown takes the registry
/// lock; fan-out snapshots the live notifiers and delivers outside it, so a
/// handle released mid-delivery may see one final in-flight notification
/// (dropped downstream by the visitor).
pub struct Subject {
    subs: Mutex<SlotPool<Option<NotifyFn>>>,
}

impl Subject {
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(SlotPool::new()),
        }
    }

    pub fn subscribe(&self, notify: NotifyFn) -> usize {
        self.subs.lock().add(Some(notify))
    }

    pub fn unsubscribe(&self, slot: usize) -> bool {
        let mut subs = self.subs.lock();
        if slot >= subs.slot_count() || subs.is_free(slot) {
            return false;
        }
        subs.release(slot)
    }

    pub fn notify(&self, args: &SeedNotify) {
        // Snapshot under the lock, fan out after: a notifier is free to
        // unsubscribe from inside its callback. A handle released between
        // snapshot and delivery gets an in-flight notification, which the
        // visitor drops.
        let notifiers: Vec<NotifyFn> = self.subs.lock().iter().flatten().cloned().collect();
        for notify in notifiers {
            notify(args);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().len()
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

/// Start-key sentinel naming the end of the range.
pub const GRID_END_KEY: &str = "<end>";

/// Grid-view start position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridStart {
    /// Start of the range (the empty start key).
    Begin,
    /// End-of-range probe; returns no rows.
    End,
    /// Start strictly after this key (continuation is exclusive of the
    /// previously returned last key).
    After(String),
    /// Start at this key inclusively.
    At(String),
}

impl GridStart {
    /// Interpret a textual start key: empty means begin, [`GRID_END_KEY`]
    /// means end, anything else is an inclusive start key.
    pub fn from_start_key(key: &str) -> Self {
        match key {
            "" => Self::Begin,
            GRID_END_KEY => Self::End,
            _ => Self::At(key.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridViewRequest {
    pub start: GridStart,
    pub max_rows: u16,
    pub tab: usize,
}

#[derive(Debug, Clone)]
pub struct GridViewResult {
    pub tab: String,
    /// `(key, rendered row)` pairs in key order.
    pub rows: Vec<(String, String)>,
    pub last_key: Option<String>,
    /// True when the range is exhausted.
    pub is_all: bool,
}

// =============================================================================
// The operation trait
// =============================================================================

pub type ReadCb = Box<dyn FnOnce(OpResult<SeedRow>) + Send>;
pub type WriteFn = Box<dyn FnOnce(&Tab, &mut SeedRow) -> String + Send>;
pub type WriteCb = Box<dyn FnOnce(OpResult<String>) + Send>;
pub type RemoveCb = Box<dyn FnOnce(OpResult<()>) + Send>;
pub type GridViewCb = Box<dyn FnOnce(OpResult<GridViewResult>) + Send>;
pub type CommandCb = Box<dyn FnOnce(OpResult<String>) + Send>;

/// Asynchronous operations over one tree. Every `begin_*`/`grid_view` call
/// completes its callback exactly once, possibly inline.
pub trait TreeNode: Send + Sync {
    fn layout(&self) -> &Layout;

    /// Resolve a child tree named by an interior path segment.
    fn sapling(&self, _key: &str) -> Option<Arc<dyn TreeNode>> {
        None
    }

    /// Pod-level read of `(key, tab)`.
    fn begin_read(&self, _key: &str, _tab: usize, cb: ReadCb) {
        cb(Err(OpErr::NotSupportedRead));
    }

    /// Pod-level write: `wf` runs with exclusive access to the row (created
    /// if the tree allows) and returns per-field diagnostics.
    fn begin_write(&self, _key: &str, _tab: usize, _wf: WriteFn, cb: WriteCb) {
        cb(Err(OpErr::NotSupportedWrite));
    }

    fn remove_pod(&self, _key: &str, _tab: usize, cb: RemoveCb) {
        cb(Err(OpErr::NotSupportedRemovePod));
    }

    /// Ordered bounded snapshot of rows on one tab.
    fn grid_view(&self, _req: GridViewRequest, cb: GridViewCb) {
        cb(Err(OpErr::NotSupportedCmd));
    }

    /// Free-form command delivered to a pod.
    fn seed_command(&self, _key: &str, _tab: usize, _cmdline: &str, cb: CommandCb) {
        cb(Err(OpErr::NotSupportedCmd));
    }

    /// Install a notifier on `(self, tab)`.
    fn subscribe(&self, _tab: usize, _notify: NotifyFn) -> OpResult<SubConn> {
        Err(OpErr::NotSupportedCmd)
    }

    fn unsubscribe(&self, _conn: SubConn) -> bool {
        false
    }
}

// =============================================================================
// BasicTree - ordered in-memory tree
// =============================================================================

struct PodEntry {
    /// One row per tab, created lazily.
    rows: Vec<SeedRow>,
}

/// In-memory ordered tree: pods in key order, ops completed inline, one
/// subscription subject per tab. Child trees may be grafted for interior
/// path segments.
pub struct BasicTree {
    layout: Layout,
    pods: RwLock<BTreeMap<String, PodEntry>>,
    subjects: Vec<Subject>,
    saplings: RwLock<HashMap<String, Arc<dyn TreeNode>>>,
}

impl BasicTree {
    pub fn new(layout: Layout) -> Arc<Self> {
        let subjects = layout.tabs.iter().map(|_| Subject::new()).collect();
        Arc::new(Self {
            layout,
            pods: RwLock::new(BTreeMap::new()),
            subjects,
            saplings: RwLock::new(HashMap::new()),
        })
    }

    /// Graft a child tree under `name`.
    pub fn add_sapling(&self, name: impl Into<String>, child: Arc<dyn TreeNode>) {
        self.saplings.write().insert(name.into(), child);
    }

    pub fn pod_count(&self) -> usize {
        self.pods.read().len()
    }

    fn new_pod(&self) -> PodEntry {
        PodEntry {
            rows: self.layout.tabs.iter().map(SeedRow::new_for).collect(),
        }
    }

    fn notify_changed(&self, key: &str, tab: usize, row: &SeedRow) {
        if let Some(subject) = self.subjects.get(tab) {
            subject.notify(&SeedNotify {
                kind: NotifyKind::Changed,
                key: key.to_string(),
                tab: self.layout.tabs[tab].name.clone(),
                row: row.render(),
            });
        }
    }
}

impl TreeNode for BasicTree {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn sapling(&self, key: &str) -> Option<Arc<dyn TreeNode>> {
        self.saplings.read().get(key).cloned()
    }

    fn begin_read(&self, key: &str, tab: usize, cb: ReadCb) {
        let pods = self.pods.read();
        let res = match pods.get(key) {
            Some(pod) => pod.rows.get(tab).cloned().ok_or(OpErr::NotFoundTab),
            None => Err(OpErr::NotFoundKey),
        };
        drop(pods);
        cb(res);
    }

    fn begin_write(&self, key: &str, tab: usize, wf: WriteFn, cb: WriteCb) {
        if tab >= self.layout.tabs.len() {
            cb(Err(OpErr::NotFoundTab));
            return;
        }
        let (diag, row) = {
            let mut pods = self.pods.write();
            let pod = pods
                .entry(key.to_string())
                .or_insert_with(|| self.new_pod());
            let row = &mut pod.rows[tab];
            let diag = wf(&self.layout.tabs[tab], row);
            (diag, row.clone())
        };
        self.notify_changed(key, tab, &row);
        cb(Ok(diag));
    }

    fn remove_pod(&self, key: &str, tab: usize, cb: RemoveCb) {
        let removed = self.pods.write().remove(key).is_some();
        if removed {
            debug!(key, "pod removed");
            if let Some(subject) = self.subjects.get(tab) {
                subject.notify(&SeedNotify {
                    kind: NotifyKind::Removed,
                    key: key.to_string(),
                    tab: self.layout.tabs[tab].name.clone(),
                    row: String::new(),
                });
            }
            cb(Ok(()));
        } else {
            cb(Err(OpErr::NotFoundKey));
        }
    }

    fn grid_view(&self, req: GridViewRequest, cb: GridViewCb) {
        let tab_name = match self.layout.tab(req.tab) {
            Some(t) => t.name.clone(),
            None => {
                cb(Err(OpErr::NotFoundTab));
                return;
            }
        };
        let pods = self.pods.read();
        let lower: Bound<String> = match &req.start {
            GridStart::Begin => Bound::Unbounded,
            GridStart::After(k) => Bound::Excluded(k.clone()),
            GridStart::At(k) => Bound::Included(k.clone()),
            GridStart::End => {
                drop(pods);
                cb(Ok(GridViewResult {
                    tab: tab_name,
                    rows: Vec::new(),
                    last_key: None,
                    is_all: true,
                }));
                return;
            }
        };
        let mut rows = Vec::new();
        let mut is_all = true;
        for (key, pod) in pods.range((lower, Bound::<String>::Unbounded)) {
            if rows.len() >= req.max_rows as usize {
                is_all = false;
                break;
            }
            rows.push((key.clone(), pod.rows[req.tab].render()));
        }
        let last_key = rows.last().map(|(k, _)| k.clone());
        drop(pods);
        cb(Ok(GridViewResult {
            tab: tab_name,
            rows,
            last_key,
            is_all,
        }));
    }

    fn subscribe(&self, tab: usize, notify: NotifyFn) -> OpResult<SubConn> {
        match self.subjects.get(tab) {
            Some(subject) => Ok(SubConn {
                tab,
                slot: subject.subscribe(notify),
            }),
            None => Err(OpErr::NotFoundTab),
        }
    }

    fn unsubscribe(&self, conn: SubConn) -> bool {
        match self.subjects.get(conn.tab) {
            Some(subject) => subject.unsubscribe(conn.slot),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn layout() -> Layout {
        Layout::new(
            "Key",
            vec![Tab::new(
                "cfg",
                &[("Name", FieldType::Str), ("Qty", FieldType::U64)],
            )],
        )
    }

    fn write_cells(tree: &Arc<BasicTree>, key: &str, name: &str, qty: u64) {
        let name = name.to_string();
        tree.begin_write(
            key,
            0,
            Box::new(move |tab, row| {
                tab.field("Name").unwrap().str_to_cell(row, &name).unwrap();
                tab.field("Qty")
                    .unwrap()
                    .str_to_cell(row, &qty.to_string())
                    .unwrap();
                String::new()
            }),
            Box::new(|r| assert!(r.is_ok())),
        );
    }

    #[test]
    fn test_write_then_read() {
        let tree = BasicTree::new(layout());
        write_cells(&tree, "k1", "alpha", 7);

        tree.begin_read(
            "k1",
            0,
            Box::new(|r| {
                let row = r.unwrap();
                assert_eq!(row.render(), "alpha|7");
            }),
        );
    }

    #[test]
    fn test_read_missing_key() {
        let tree = BasicTree::new(layout());
        tree.begin_read("nope", 0, Box::new(|r| assert_eq!(r.unwrap_err(), OpErr::NotFoundKey)));
    }

    #[test]
    fn test_str_to_cell_type_error() {
        let tree = BasicTree::new(layout());
        tree.begin_write(
            "k1",
            0,
            Box::new(|tab, row| {
                let err = tab
                    .field("Qty")
                    .unwrap()
                    .str_to_cell(row, "not-a-number")
                    .unwrap_err();
                assert_eq!(err, OpErr::StrToCellFailed);
                String::new()
            }),
            Box::new(|r| assert!(r.is_ok())),
        );
    }

    #[test]
    fn test_grid_view_pagination_exclusive() {
        let tree = BasicTree::new(layout());
        for k in ["a", "b", "c", "d", "e"] {
            write_cells(&tree, k, k, 1);
        }
        let first = Arc::new(Mutex::new(None));
        let f = first.clone();
        tree.grid_view(
            GridViewRequest {
                start: GridStart::Begin,
                max_rows: 2,
                tab: 0,
            },
            Box::new(move |r| *f.lock() = Some(r.unwrap())),
        );
        let gv = first.lock().take().unwrap();
        assert_eq!(gv.rows.len(), 2);
        assert_eq!(gv.rows[0].0, "a");
        assert_eq!(gv.last_key.as_deref(), Some("b"));
        assert!(!gv.is_all);

        // Continuation starts strictly after the last returned key.
        let second = Arc::new(Mutex::new(None));
        let s = second.clone();
        tree.grid_view(
            GridViewRequest {
                start: GridStart::After("b".to_string()),
                max_rows: 10,
                tab: 0,
            },
            Box::new(move |r| *s.lock() = Some(r.unwrap())),
        );
        let gv2 = second.lock().take().unwrap();
        assert_eq!(
            gv2.rows.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["c", "d", "e"]
        );
        assert!(gv2.is_all);
    }

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let tree = BasicTree::new(layout());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let conn = tree
            .subscribe(
                0,
                Arc::new(move |n: &SeedNotify| {
                    assert_eq!(n.kind, NotifyKind::Changed);
                    h.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        write_cells(&tree, "k1", "x", 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(tree.unsubscribe(conn));
        write_cells(&tree, "k1", "y", 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "released handle sees nothing");
    }

    #[test]
    fn test_remove_pod() {
        let tree = BasicTree::new(layout());
        write_cells(&tree, "k1", "x", 1);
        tree.remove_pod("k1", 0, Box::new(|r| assert!(r.is_ok())));
        assert_eq!(tree.pod_count(), 0);
        tree.remove_pod("k1", 0, Box::new(|r| assert_eq!(r.unwrap_err(), OpErr::NotFoundKey)));
    }
}
