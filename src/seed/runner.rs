//! Ticket Runners
//!
//! One runner per request: resolve the path, dispatch the typed operation,
//! route the result through the visitor, exactly once. Runners are held in
//! an `Arc` and their completion closures capture that `Arc`, so a runner
//! stays alive across the asynchronous hop however the tree schedules it.
//!
//! Terminal-segment disambiguation is per runner kind: read / write /
//! remove / command address a pod key under the final tree; grid-view and
//! subscribe address the final tree itself. A pod-kind runner whose path
//! turns out to name a tree reports its `not_supported_*` error.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::error::OpErr;
use super::path::{split_top_level, strip_quotes, SeedPath, UNSUBSCRIBE_TAB};
use super::tree::{GridStart, GridViewRequest, TreeNode};
use super::visitor::{OpContext, SeedVisitor, VisitorSubr};

/// A resolved request path: the final tree, the terminal segment, and the
/// selectors carried on it.
struct Resolved {
    /// Tree the terminal segment lives under.
    tree: Arc<dyn TreeNode>,
    /// Terminal segment; `None` when the path names the base tree itself.
    last: Option<String>,
    /// `^tab` selector; empty selects the first tab.
    tab_sel: String,
    /// `$cmd` remainder.
    cmd: Option<String>,
    /// Normalized absolute path, for reporting.
    full_path: String,
}

impl Resolved {
    /// The tree the full path names, when the terminal segment is itself a
    /// tree (or the path named the base tree directly).
    fn as_tree(&self) -> Option<Arc<dyn TreeNode>> {
        match &self.last {
            None => Some(self.tree.clone()),
            Some(seg) => self.tree.sapling(seg),
        }
    }

    fn key(&self) -> &str {
        self.last.as_deref().unwrap_or("")
    }

    fn ctx(&self, tab: &str) -> OpContext {
        OpContext {
            path: self.full_path.clone(),
            key: self.key().to_string(),
            tab: tab.to_string(),
        }
    }
}

/// Split the request into segments (absolute, or against the visitor's
/// working path) and walk the interior ones as saplings.
fn resolve(visitor: &SeedVisitor, path: &str) -> Result<Resolved, OpErr> {
    let parsed = SeedPath::parse(path)?;
    let mut segments: Vec<String> = if parsed.is_absolute {
        Vec::new()
    } else {
        SeedPath::parse(&visitor.curr_path())?.segments
    };
    segments.extend(parsed.segments);

    let full_path = format!("/{}", segments.join("/"));
    let last = segments.pop();
    let mut tree = visitor.root().clone();
    for seg in &segments {
        tree = tree.sapling(seg).ok_or(OpErr::NotFoundKey)?;
    }
    Ok(Resolved {
        tree,
        last,
        tab_sel: parsed.tab.unwrap_or_default(),
        cmd: parsed.cmd,
        full_path,
    })
}

fn report_error(visitor: &SeedVisitor, ctx: &OpContext, err: OpErr) {
    debug!(path = %ctx.path, %err, "ticket runner failed");
    visitor.output().on_error(ctx, err);
}

// =============================================================================
// Error runner
// =============================================================================

/// Delivers one error and nothing else; used where a request is rejected
/// before any tree operation starts.
pub struct TicketRunnerError {
    visitor: Arc<SeedVisitor>,
    path: String,
    err: OpErr,
}

impl TicketRunnerError {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str, err: OpErr) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            err,
        })
    }

    /// The request carried arguments where none are allowed.
    pub fn arguments_must_be_empty(visitor: Arc<SeedVisitor>, path: &str) -> Arc<Self> {
        Self::new(visitor, path, OpErr::BadCommandArgument)
    }

    pub fn unknown_command(visitor: Arc<SeedVisitor>, path: &str) -> Arc<Self> {
        Self::new(visitor, path, OpErr::NotSupportedCmd)
    }

    pub fn run(self: &Arc<Self>) {
        let ctx = OpContext {
            path: self.path.clone(),
            ..OpContext::default()
        };
        report_error(&self.visitor, &ctx, self.err);
    }
}

// =============================================================================
// Read
// =============================================================================

pub struct TicketRunnerRead {
    visitor: Arc<SeedVisitor>,
    path: String,
}

impl TicketRunnerRead {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
        })
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let (tab_index, tab_name) = match r.tree.layout().tab_by_name_or_first(&r.tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundTab),
        };
        let ctx = r.ctx(&tab_name);
        if r.last.is_none() || r.as_tree().is_some() {
            // The path names a tree, not a pod.
            return report_error(&self.visitor, &ctx, OpErr::NotSupportedRead);
        }
        let this = Arc::clone(self);
        let tree = r.tree.clone();
        r.tree.begin_read(
            r.key(),
            tab_index,
            Box::new(move |res| match res {
                Ok(row) => {
                    if let Some(tab) = tree.layout().tab(tab_index) {
                        this.visitor.output().on_read(&ctx, tab, &row);
                    }
                }
                Err(e) => report_error(&this.visitor, &ctx, e),
            }),
        );
    }
}

// =============================================================================
// Write
// =============================================================================

/// Writes a `field=value,field=value` list onto one pod row. Per-field
/// failures do not abort the write; they are collected into the diagnostic
/// buffer delivered with the result.
pub struct TicketRunnerWrite {
    visitor: Arc<SeedVisitor>,
    path: String,
    field_values: String,
}

impl TicketRunnerWrite {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str, field_values: &str) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            field_values: field_values.to_string(),
        })
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let (tab_index, tab_name) = match r.tree.layout().tab_by_name_or_first(&r.tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundTab),
        };
        let ctx = r.ctx(&tab_name);
        if r.last.is_none() || r.as_tree().is_some() {
            return report_error(&self.visitor, &ctx, OpErr::NotSupportedWrite);
        }
        // The field list may also arrive as the `$` remainder of the path.
        let field_values = if self.field_values.is_empty() {
            r.cmd.clone().unwrap_or_default()
        } else {
            self.field_values.clone()
        };
        let this = Arc::clone(self);
        let cb_ctx = ctx.clone();
        r.tree.begin_write(
            r.key(),
            tab_index,
            Box::new(move |tab, row| {
                let mut diag = String::new();
                for item in split_top_level(&field_values, ',') {
                    if item.trim().is_empty() {
                        continue;
                    }
                    let (name, val) = match item.split_once('=') {
                        Some((n, v)) => (n.trim(), v),
                        None => {
                            diag.push_str(&format!(
                                "fieldName={}|err={}\n",
                                item.trim(),
                                OpErr::BadCommandArgument
                            ));
                            continue;
                        }
                    };
                    match tab.field(name) {
                        None => {
                            diag.push_str(&format!(
                                "fieldName={name}|err={}\n",
                                OpErr::FieldNotFound
                            ));
                        }
                        Some(field) => {
                            if let Err(e) = field.str_to_cell(row, strip_quotes(val)) {
                                diag.push_str(&format!("fieldName={name}|err={e}\n"));
                            }
                        }
                    }
                }
                diag
            }),
            Box::new(move |res| match res {
                Ok(diag) => this.visitor.output().on_write(&cb_ctx, &diag),
                Err(e) => report_error(&this.visitor, &cb_ctx, e),
            }),
        );
    }
}

// =============================================================================
// Remove
// =============================================================================

pub struct TicketRunnerRemove {
    visitor: Arc<SeedVisitor>,
    path: String,
}

impl TicketRunnerRemove {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
        })
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let (tab_index, tab_name) = match r.tree.layout().tab_by_name_or_first(&r.tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundTab),
        };
        let ctx = r.ctx(&tab_name);
        if r.last.is_none() || r.as_tree().is_some() {
            return report_error(&self.visitor, &ctx, OpErr::NotSupportedRemovePod);
        }
        let this = Arc::clone(self);
        r.tree.remove_pod(
            r.key(),
            tab_index,
            Box::new(move |res| match res {
                Ok(()) => this.visitor.output().on_removed(&ctx),
                Err(e) => report_error(&this.visitor, &ctx, e),
            }),
        );
    }
}

// =============================================================================
// Grid view
// =============================================================================

/// Tree-level ordered snapshot with continuation. The next page starts
/// strictly after the previously returned last key.
pub struct TicketRunnerGridView {
    visitor: Arc<SeedVisitor>,
    path: String,
    max_rows: u16,
    start: Mutex<GridStart>,
    last_key: Mutex<Option<String>>,
}

impl TicketRunnerGridView {
    pub fn new(
        visitor: Arc<SeedVisitor>,
        path: &str,
        start_key: &str,
        max_rows: u16,
    ) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            max_rows,
            start: Mutex::new(GridStart::from_start_key(start_key)),
            last_key: Mutex::new(None),
        })
    }

    /// Restart from just past the last returned key.
    pub fn continue_view(self: &Arc<Self>) {
        if let Some(last) = self.last_key.lock().clone() {
            *self.start.lock() = GridStart::After(last);
        }
        self.run();
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let tree = match r.as_tree() {
            Some(t) => t,
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundKey),
        };
        let (tab_index, tab_name) = match tree.layout().tab_by_name_or_first(&r.tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundTab),
        };
        let ctx = OpContext {
            path: r.full_path.clone(),
            key: String::new(),
            tab: tab_name,
        };
        let this = Arc::clone(self);
        let req = GridViewRequest {
            start: self.start.lock().clone(),
            max_rows: self.max_rows,
            tab: tab_index,
        };
        tree.grid_view(
            req,
            Box::new(move |res| match res {
                Ok(gv) => {
                    *this.last_key.lock() = gv.last_key.clone();
                    this.visitor.output().on_grid_view(&ctx, &gv);
                }
                Err(e) => report_error(&this.visitor, &ctx, e),
            }),
        );
    }
}

// =============================================================================
// Command
// =============================================================================

/// An empty command line commits the resolved path as the visitor's working
/// path; anything else is forwarded to the pod's command handler.
pub struct TicketRunnerCommand {
    visitor: Arc<SeedVisitor>,
    path: String,
    cmdline: Option<String>,
}

impl TicketRunnerCommand {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str, cmdline: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            cmdline: cmdline.map(str::to_string),
        })
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let cmdline = self
            .cmdline
            .clone()
            .or_else(|| r.cmd.clone())
            .unwrap_or_default();

        if cmdline.is_empty() {
            self.visitor.set_curr_path(&r.full_path);
            return;
        }
        let (tab_index, tab_name) = match r.tree.layout().tab_by_name_or_first(&r.tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&r.tab_sel), OpErr::NotFoundTab),
        };
        let ctx = r.ctx(&tab_name);
        if r.last.is_none() || r.as_tree().is_some() {
            // Commands with a command line only land on pods.
            return report_error(&self.visitor, &ctx, OpErr::NotSupportedCmd);
        }
        let this = Arc::clone(self);
        r.tree.seed_command(
            r.key(),
            tab_index,
            &cmdline,
            Box::new(move |res| match res {
                Ok(msg) => this.visitor.output().on_command(&ctx, &msg),
                Err(e) => report_error(&this.visitor, &ctx, e),
            }),
        );
    }
}

// =============================================================================
// Subscribe / unsubscribe
// =============================================================================

/// Tree-level subscribe; the sentinel tab `<u>` unsubscribes instead. The
/// new subscription is installed as the visitor's current one before the
/// tree operation runs; losing a subsequent race means unsubscribing itself.
pub struct TicketRunnerSubscribe {
    visitor: Arc<SeedVisitor>,
    path: String,
    tab_sel: Option<String>,
    explicit: Option<Arc<VisitorSubr>>,
}

impl TicketRunnerSubscribe {
    pub fn new(visitor: Arc<SeedVisitor>, path: &str) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            tab_sel: None,
            explicit: None,
        })
    }

    /// Unsubscribe an explicit handle rather than the visitor's current one.
    pub fn new_unsubscribe(
        visitor: Arc<SeedVisitor>,
        path: &str,
        subr: Arc<VisitorSubr>,
    ) -> Arc<Self> {
        Arc::new(Self {
            visitor,
            path: path.to_string(),
            tab_sel: Some(UNSUBSCRIBE_TAB.to_string()),
            explicit: Some(subr),
        })
    }

    pub fn run(self: &Arc<Self>) {
        let r = match resolve(&self.visitor, &self.path) {
            Ok(r) => r,
            Err(e) => {
                let ctx = OpContext {
                    path: self.path.clone(),
                    ..OpContext::default()
                };
                return report_error(&self.visitor, &ctx, e);
            }
        };
        let tab_sel = self.tab_sel.clone().unwrap_or_else(|| r.tab_sel.clone());

        if tab_sel == UNSUBSCRIBE_TAB {
            let ctx = r.ctx(UNSUBSCRIBE_TAB);
            match &self.explicit {
                Some(subr) => {
                    // Only tear down the visitor's slot if it still points
                    // at this handle; otherwise release the handle alone.
                    if self.visitor.is_current(subr) {
                        self.visitor.unsubscribe();
                    } else {
                        subr.unsubscribe();
                    }
                }
                None => self.visitor.unsubscribe(),
            }
            self.visitor.output().on_subscribe(&ctx, false);
            return;
        }

        let tree = match r.as_tree() {
            Some(t) => t,
            None => return report_error(&self.visitor, &r.ctx(&tab_sel), OpErr::NotFoundKey),
        };
        let (tab_index, tab_name) = match tree.layout().tab_by_name_or_first(&tab_sel) {
            Some((i, t)) => (i, t.name.clone()),
            None => return report_error(&self.visitor, &r.ctx(&tab_sel), OpErr::NotFoundTab),
        };
        let ctx = OpContext {
            path: r.full_path.clone(),
            key: String::new(),
            tab: tab_name.clone(),
        };
        let subr = self.visitor.new_subscribe();
        match subr.subscribe(&r.full_path, tab_index, &tab_name, &tree) {
            Err(e) => report_error(&self.visitor, &ctx, e),
            Ok(()) => {
                self.visitor.output().on_subscribe(&ctx, true);
                // A newer subscribe may have displaced this one mid-flight.
                if !self.visitor.is_current(&subr) {
                    subr.unsubscribe();
                }
            }
        }
    }
}
