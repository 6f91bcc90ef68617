//! Seed Visitor and Subscription Slot
//!
//! A visitor is one inspection session: it owns the current working path, at
//! most one live subscription, and the callback surface results are routed
//! through. Ticket runners borrow the visitor for one operation each.
//!
//! Subscription discipline: the visitor's slot always holds the newest
//! subscription. Installing a new one swaps the old out and unsubscribes it
//! exactly once; an in-flight subscribe that loses the race unsubscribes
//! itself; notifications from anything but the current subscription are
//! dropped silently.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::error::OpErr;
use super::tree::{GridViewResult, SeedNotify, SeedRow, SubConn, Tab, TreeNode};

/// Where an operation's result came from: the resolved path, key, and tab.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    pub path: String,
    pub key: String,
    pub tab: String,
}

/// Per-operation result callbacks. One method fires per finished runner;
/// `on_error` fires exactly once for a failed one.
pub trait VisitorOutput: Send + Sync {
    fn on_read(&self, ctx: &OpContext, tab: &Tab, row: &SeedRow);
    fn on_write(&self, ctx: &OpContext, diag: &str);
    fn on_removed(&self, ctx: &OpContext);
    fn on_grid_view(&self, ctx: &OpContext, gv: &GridViewResult);
    fn on_command(&self, ctx: &OpContext, msg: &str);
    fn on_subscribe(&self, ctx: &OpContext, subscribed: bool);
    fn on_notify(&self, args: &SeedNotify);
    fn on_error(&self, ctx: &OpContext, err: OpErr);

    /// The working path changed (empty-command runner).
    fn on_set_curr_path(&self, _path: &str) {}
}

/// One inspection session over a seed tree.
pub struct SeedVisitor {
    root: Arc<dyn TreeNode>,
    output: Box<dyn VisitorOutput>,
    curr_path: Mutex<String>,
    /// The single live subscription, protected by its own lock.
    subr: Mutex<Option<Arc<VisitorSubr>>>,
}

impl SeedVisitor {
    pub fn new(root: Arc<dyn TreeNode>, output: Box<dyn VisitorOutput>) -> Arc<Self> {
        Arc::new(Self {
            root,
            output,
            curr_path: Mutex::new("/".to_string()),
            subr: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Arc<dyn TreeNode> {
        &self.root
    }

    pub fn output(&self) -> &dyn VisitorOutput {
        self.output.as_ref()
    }

    pub fn curr_path(&self) -> String {
        self.curr_path.lock().clone()
    }

    pub fn set_curr_path(&self, path: &str) {
        *self.curr_path.lock() = path.to_string();
        self.output.on_set_curr_path(path);
    }

    pub fn current_subr(&self) -> Option<Arc<VisitorSubr>> {
        self.subr.lock().clone()
    }

    /// Create a fresh subscription and install it as current; whatever it
    /// displaces is unsubscribed (outside the slot lock).
    pub fn new_subscribe(self: &Arc<Self>) -> Arc<VisitorSubr> {
        let new = Arc::new(VisitorSubr {
            visitor: Arc::downgrade(self),
            state: Mutex::new(SubrState::default()),
        });
        let old = {
            let mut slot = self.subr.lock();
            std::mem::replace(&mut *slot, Some(new.clone()))
        };
        if let Some(old) = old {
            debug!("displaced previous subscription");
            old.unsubscribe();
        }
        new
    }

    /// Release the current subscription, if any.
    pub fn unsubscribe(&self) {
        if let Some(subr) = self.subr.lock().take() {
            subr.unsubscribe();
        }
    }

    pub(crate) fn is_current(&self, subr: &Arc<VisitorSubr>) -> bool {
        matches!(&*self.subr.lock(), Some(cur) if Arc::ptr_eq(cur, subr))
    }

    /// Notification entry: anything not from the current subscription is an
    /// in-flight leftover and is dropped without a callback.
    fn deliver_notify(&self, subr: &Arc<VisitorSubr>, args: &SeedNotify) {
        if self.is_current(subr) {
            self.output.on_notify(args);
        }
    }
}

impl Drop for SeedVisitor {
    fn drop(&mut self) {
        if let Some(subr) = self.subr.get_mut().take() {
            subr.unsubscribe();
        }
    }
}

#[derive(Default)]
struct SubrState {
    tree: Option<Arc<dyn TreeNode>>,
    conn: Option<SubConn>,
    path: String,
    tab_name: String,
}

/// One subscription owned by a visitor. Holds the subscribed tree strongly
/// for the lifetime of the connection; the notifier closure only holds this
/// object weakly, so teardown needs no back-edge breaking.
pub struct VisitorSubr {
    visitor: Weak<SeedVisitor>,
    state: Mutex<SubrState>,
}

impl VisitorSubr {
    /// Install a notifier on `(tree, tab)`. A subscription object is
    /// single-shot: re-subscribing an already connected one is refused.
    pub fn subscribe(
        self: &Arc<Self>,
        path: &str,
        tab_index: usize,
        tab_name: &str,
        tree: &Arc<dyn TreeNode>,
    ) -> Result<(), OpErr> {
        {
            let st = self.state.lock();
            if st.conn.is_some() || st.tree.is_some() {
                return Err(OpErr::NotSupportedCmd);
            }
        }
        let weak = Arc::downgrade(self);
        let conn = tree.subscribe(
            tab_index,
            Arc::new(move |args: &SeedNotify| {
                if let Some(subr) = weak.upgrade() {
                    subr.on_seed_notify(args);
                }
            }),
        )?;
        let mut st = self.state.lock();
        st.tree = Some(tree.clone());
        st.conn = Some(conn);
        st.path = path.to_string();
        st.tab_name = tab_name.to_string();
        Ok(())
    }

    fn on_seed_notify(self: &Arc<Self>, args: &SeedNotify) {
        if let Some(visitor) = self.visitor.upgrade() {
            visitor.deliver_notify(self, args);
        }
    }

    /// Release the tree connection. Idempotent; later calls are no-ops.
    pub fn unsubscribe(&self) {
        let (tree, conn) = {
            let mut st = self.state.lock();
            (st.tree.take(), st.conn.take())
        };
        if let (Some(tree), Some(conn)) = (tree, conn) {
            tree.unsubscribe(conn);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().conn.is_some()
    }

    pub fn subscribed_path(&self) -> String {
        self.state.lock().path.clone()
    }
}
