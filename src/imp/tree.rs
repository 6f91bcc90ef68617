//! The Import Tree
//!
//! Import seeds are pods of a seed tree, so the visitor / ticket-runner
//! machinery inspects and drives them like any other configuration:
//!
//! - fields: `FieldName` (target file), `Mon` (`R`/`A`/empty), `Sch`
//!   (schedule expression), `Result` (last load outcome, system-set)
//! - seed command `reload` runs an immediate load
//! - writes reconfigure the seed; grid view lists all seeds

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

use super::seed::{ImportSeed, MonitorMode};
use crate::seed::error::OpErr;
use crate::seed::tree::{
    CommandCb, FieldType, GridStart, GridViewRequest, GridViewCb, Layout, NotifyFn, NotifyKind,
    ReadCb, SeedNotify, SeedRow, SubConn, Subject, Tab, TreeNode, WriteCb, WriteFn,
};

const TAB_CFG: usize = 0;

fn import_layout() -> Layout {
    Layout::new(
        "Name",
        vec![Tab::new(
            "Cfg",
            &[
                ("FieldName", FieldType::Str),
                ("Mon", FieldType::Str),
                ("Sch", FieldType::Str),
                ("Result", FieldType::Str),
            ],
        )],
    )
}

/// Seed tree whose pods are import seeds.
pub struct ImportTree {
    layout: Layout,
    seeds: RwLock<BTreeMap<String, Arc<ImportSeed>>>,
    subject: Subject,
}

impl ImportTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            layout: import_layout(),
            seeds: RwLock::new(BTreeMap::new()),
            subject: Subject::new(),
        })
    }

    pub fn add_seed(&self, seed: ImportSeed) -> Arc<ImportSeed> {
        let seed = Arc::new(seed);
        self.seeds
            .write()
            .insert(seed.name().to_string(), seed.clone());
        seed
    }

    pub fn seed(&self, name: &str) -> Option<Arc<ImportSeed>> {
        self.seeds.read().get(name).cloned()
    }

    pub fn for_each_seed(&self, mut f: impl FnMut(&Arc<ImportSeed>)) {
        let seeds: Vec<_> = self.seeds.read().values().cloned().collect();
        for seed in &seeds {
            f(seed);
        }
    }

    /// Load every seed; returns when all finished.
    pub fn load_all(&self) {
        self.for_each_seed(|seed| {
            seed.reload();
        });
    }

    /// Reset AddTail progress everywhere and reload.
    pub fn clear_reload_all(&self) {
        self.for_each_seed(|seed| {
            seed.clear_reload();
            seed.reload();
        });
    }

    fn row_for(&self, seed: &ImportSeed) -> SeedRow {
        let tab = &self.layout.tabs[TAB_CFG];
        let mut row = SeedRow::new_for(tab);
        let values = [
            ("FieldName", seed.file_name()),
            ("Mon", seed.monitor_mode().code().to_string()),
            ("Sch", seed.sch_str()),
            ("Result", seed.result()),
        ];
        for (name, value) in values {
            if let Some(field) = tab.field(name) {
                // Str cells accept any value.
                let _ = field.str_to_cell(&mut row, &value);
            }
        }
        row
    }

    fn notify_changed(&self, key: &str, row: &SeedRow) {
        self.subject.notify(&SeedNotify {
            kind: NotifyKind::Changed,
            key: key.to_string(),
            tab: self.layout.tabs[TAB_CFG].name.clone(),
            row: row.render(),
        });
    }
}

impl TreeNode for ImportTree {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn begin_read(&self, key: &str, tab: usize, cb: ReadCb) {
        if tab != TAB_CFG {
            return cb(Err(OpErr::NotFoundTab));
        }
        match self.seed(key) {
            Some(seed) => cb(Ok(self.row_for(&seed))),
            None => cb(Err(OpErr::NotFoundKey)),
        }
    }

    fn begin_write(&self, key: &str, tab: usize, wf: WriteFn, cb: WriteCb) {
        if tab != TAB_CFG {
            return cb(Err(OpErr::NotFoundTab));
        }
        // Import pods are pre-configured; writes reconfigure, never create.
        let seed = match self.seed(key) {
            Some(s) => s,
            None => return cb(Err(OpErr::NotFoundKey)),
        };
        let tab_def = &self.layout.tabs[TAB_CFG];
        let mut row = self.row_for(&seed);
        let before = row.clone();
        let diag = wf(tab_def, &mut row);

        let changed = |name: &str| {
            let f = tab_def.field(name)?;
            let new = f.cell_to_str(&row);
            (new != f.cell_to_str(&before)).then_some(new)
        };
        let file_name = changed("FieldName");
        let mon = changed("Mon").map(|c| MonitorMode::from_code(&c));
        let sch = changed("Sch");
        if file_name.is_some() || mon.is_some() || sch.is_some() {
            debug!(key, "import seed reconfigured");
            seed.configure(file_name.as_deref(), mon, sch.as_deref());
        }
        // `Result` is system-set; a written value is discarded.
        self.notify_changed(key, &self.row_for(&seed));
        cb(Ok(diag));
    }

    fn grid_view(&self, req: GridViewRequest, cb: GridViewCb) {
        if req.tab != TAB_CFG {
            return cb(Err(OpErr::NotFoundTab));
        }
        let seeds = self.seeds.read();
        let lower: Bound<String> = match &req.start {
            GridStart::Begin => Bound::Unbounded,
            GridStart::After(k) => Bound::Excluded(k.clone()),
            GridStart::At(k) => Bound::Included(k.clone()),
            GridStart::End => {
                drop(seeds);
                return cb(Ok(crate::seed::tree::GridViewResult {
                    tab: self.layout.tabs[TAB_CFG].name.clone(),
                    rows: Vec::new(),
                    last_key: None,
                    is_all: true,
                }));
            }
        };
        let mut rows = Vec::new();
        let mut is_all = true;
        for (key, seed) in seeds.range((lower, Bound::<String>::Unbounded)) {
            if rows.len() >= req.max_rows as usize {
                is_all = false;
                break;
            }
            rows.push((key.clone(), self.row_for(seed).render()));
        }
        let last_key = rows.last().map(|(k, _)| k.clone());
        drop(seeds);
        cb(Ok(crate::seed::tree::GridViewResult {
            tab: self.layout.tabs[TAB_CFG].name.clone(),
            rows,
            last_key,
            is_all,
        }));
    }

    fn seed_command(&self, key: &str, tab: usize, cmdline: &str, cb: CommandCb) {
        if tab != TAB_CFG {
            return cb(Err(OpErr::NotFoundTab));
        }
        let seed = match self.seed(key) {
            Some(s) => s,
            None => return cb(Err(OpErr::NotFoundKey)),
        };
        match cmdline.trim() {
            "reload" => {
                seed.reload();
                let row = self.row_for(&seed);
                self.notify_changed(key, &row);
                cb(Ok(seed.result()));
            }
            _ => cb(Err(OpErr::NotSupportedCmd)),
        }
    }

    fn subscribe(&self, tab: usize, notify: NotifyFn) -> Result<SubConn, OpErr> {
        if tab != TAB_CFG {
            return Err(OpErr::NotFoundTab);
        }
        Ok(SubConn {
            tab,
            slot: self.subject.subscribe(notify),
        })
    }

    fn unsubscribe(&self, conn: SubConn) -> bool {
        conn.tab == TAB_CFG && self.subject.unsubscribe(conn.slot)
    }
}
