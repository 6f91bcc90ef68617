//! Ticket Runner Tests
//!
//! Drives each runner kind against a two-level `BasicTree` and checks the
//! visitor callback stream: one terminal callback per request, errors
//! delivered exactly once, subscription lifecycle honored.

use parking_lot::Mutex;
use std::sync::Arc;

use super::error::OpErr;
use super::runner::{
    TicketRunnerCommand, TicketRunnerError, TicketRunnerGridView, TicketRunnerRead,
    TicketRunnerRemove, TicketRunnerSubscribe, TicketRunnerWrite,
};
use super::tree::{
    BasicTree, FieldType, GridViewResult, Layout, SeedNotify, SeedRow, Tab, TreeNode,
};
use super::visitor::{OpContext, SeedVisitor, VisitorOutput};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Read(String),
    Write(String),
    Removed(String),
    GridView(Vec<String>),
    Command(String),
    Subscribe(bool),
    Notify(String),
    CurrPath(String),
    Error(OpErr),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
    fn push(&self, e: Event) {
        self.events.lock().push(e);
    }
}

struct RecorderOutput(Arc<Recorder>);

impl VisitorOutput for RecorderOutput {
    fn on_read(&self, _ctx: &OpContext, _tab: &Tab, row: &SeedRow) {
        self.0.push(Event::Read(row.render()));
    }
    fn on_write(&self, _ctx: &OpContext, diag: &str) {
        self.0.push(Event::Write(diag.to_string()));
    }
    fn on_removed(&self, ctx: &OpContext) {
        self.0.push(Event::Removed(ctx.key.clone()));
    }
    fn on_grid_view(&self, _ctx: &OpContext, gv: &GridViewResult) {
        self.0.push(Event::GridView(
            gv.rows.iter().map(|(k, _)| k.clone()).collect(),
        ));
    }
    fn on_command(&self, _ctx: &OpContext, msg: &str) {
        self.0.push(Event::Command(msg.to_string()));
    }
    fn on_subscribe(&self, _ctx: &OpContext, subscribed: bool) {
        self.0.push(Event::Subscribe(subscribed));
    }
    fn on_notify(&self, args: &SeedNotify) {
        self.0.push(Event::Notify(format!("{}:{}", args.key, args.row)));
    }
    fn on_error(&self, _ctx: &OpContext, err: OpErr) {
        self.0.push(Event::Error(err));
    }
    fn on_set_curr_path(&self, path: &str) {
        self.0.push(Event::CurrPath(path.to_string()));
    }
}

/// Root tree with a "cfg" sapling holding (Name, Qty) pods.
fn fixture() -> (Arc<SeedVisitor>, Arc<BasicTree>, Arc<Recorder>) {
    let root = BasicTree::new(Layout::new("Key", vec![Tab::new("root", &[])]));
    let cfg = BasicTree::new(Layout::new(
        "Key",
        vec![Tab::new(
            "cfg",
            &[("Name", FieldType::Str), ("Qty", FieldType::U64)],
        )],
    ));
    root.add_sapling("cfg", cfg.clone());

    let recorder = Arc::new(Recorder::default());
    let visitor = SeedVisitor::new(root, Box::new(RecorderOutput(recorder.clone())));
    (visitor, cfg, recorder)
}

fn seed_pod(tree: &Arc<BasicTree>, key: &str, name: &str, qty: u64) {
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
fn test_read_runner() {
    let (visitor, cfg, rec) = fixture();
    seed_pod(&cfg, "pa", "alpha", 3);

    TicketRunnerRead::new(visitor, "/cfg/pa").run();
    assert_eq!(rec.take(), vec![Event::Read("alpha|3".to_string())]);
}

#[test]
fn test_read_on_tree_not_supported() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerRead::new(visitor, "/cfg").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotSupportedRead)]);
}

#[test]
fn test_read_missing_key() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerRead::new(visitor, "/cfg/nope").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotFoundKey)]);
}

#[test]
fn test_read_missing_tab() {
    let (visitor, cfg, rec) = fixture();
    seed_pod(&cfg, "pa", "alpha", 3);
    TicketRunnerRead::new(visitor, "/cfg/pa^nosuch").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotFoundTab)]);
}

#[test]
fn test_write_runner_with_per_field_diagnostics() {
    let (visitor, cfg, rec) = fixture();
    TicketRunnerWrite::new(
        visitor.clone(),
        "/cfg/pw",
        "Name=widget,Qty=oops,Ghost=1",
    )
    .run();

    let events = rec.take();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Write(diag) => {
            // Qty failed to parse, Ghost does not exist; Name still landed.
            assert!(diag.contains("fieldName=Qty"), "diag: {diag}");
            assert!(diag.contains("fieldName=Ghost"), "diag: {diag}");
            assert!(!diag.contains("fieldName=Name"), "diag: {diag}");
        }
        other => panic!("expected write event, got {other:?}"),
    }

    TicketRunnerRead::new(visitor, "/cfg/pw").run();
    assert_eq!(rec.take(), vec![Event::Read("widget|0".to_string())]);
}

#[test]
fn test_write_quoted_value_with_comma() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerWrite::new(visitor.clone(), "/cfg/pq", "Name='a,b'").run();
    assert_eq!(rec.take(), vec![Event::Write(String::new())]);

    TicketRunnerRead::new(visitor, "/cfg/pq").run();
    assert_eq!(rec.take(), vec![Event::Read("a,b|0".to_string())]);
}

#[test]
fn test_write_on_tree_not_supported() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerWrite::new(visitor, "/cfg", "Name=x").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotSupportedWrite)]);
}

#[test]
fn test_remove_runner() {
    let (visitor, cfg, rec) = fixture();
    seed_pod(&cfg, "pa", "x", 1);

    TicketRunnerRemove::new(visitor.clone(), "/cfg/pa").run();
    assert_eq!(rec.take(), vec![Event::Removed("pa".to_string())]);
    assert_eq!(cfg.pod_count(), 0);

    TicketRunnerRemove::new(visitor.clone(), "/cfg/pa").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotFoundKey)]);

    TicketRunnerRemove::new(visitor, "/cfg").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotSupportedRemovePod)]);
}

#[test]
fn test_grid_view_runner_pagination() {
    let (visitor, cfg, rec) = fixture();
    for k in ["a", "b", "c", "d", "e"] {
        seed_pod(&cfg, k, k, 1);
    }

    let gv = TicketRunnerGridView::new(visitor, "/cfg", "", 2);
    gv.run();
    assert_eq!(
        rec.take(),
        vec![Event::GridView(vec!["a".to_string(), "b".to_string()])]
    );

    // Continuation is exclusive of the last returned key.
    gv.continue_view();
    assert_eq!(
        rec.take(),
        vec![Event::GridView(vec!["c".to_string(), "d".to_string()])]
    );

    gv.continue_view();
    assert_eq!(rec.take(), vec![Event::GridView(vec!["e".to_string()])]);
}

#[test]
fn test_command_empty_sets_curr_path() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerCommand::new(visitor.clone(), "/cfg", None).run();
    assert_eq!(rec.take(), vec![Event::CurrPath("/cfg".to_string())]);
    assert_eq!(visitor.curr_path(), "/cfg");

    // Relative resolution against the new working path.
    seed_pod_via(&visitor, &rec);
}

fn seed_pod_via(visitor: &Arc<SeedVisitor>, rec: &Arc<Recorder>) {
    TicketRunnerWrite::new(visitor.clone(), "rel", "Name=relative").run();
    assert_eq!(rec.take(), vec![Event::Write(String::new())]);
    TicketRunnerRead::new(visitor.clone(), "rel").run();
    assert_eq!(rec.take(), vec![Event::Read("relative|0".to_string())]);
}

#[test]
fn test_command_on_pod_without_handler() {
    let (visitor, cfg, rec) = fixture();
    seed_pod(&cfg, "pa", "x", 1);
    TicketRunnerCommand::new(visitor, "/cfg/pa", Some("reload")).run();
    // BasicTree pods have no command handler.
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotSupportedCmd)]);
}

#[test]
fn test_subscribe_notify_and_unsubscribe() {
    let (visitor, cfg, rec) = fixture();

    TicketRunnerSubscribe::new(visitor.clone(), "/cfg").run();
    assert_eq!(rec.take(), vec![Event::Subscribe(true)]);

    seed_pod(&cfg, "pa", "x", 1);
    assert_eq!(rec.take(), vec![Event::Notify("pa:x|1".to_string())]);

    // Sentinel tab unsubscribes the current subscription.
    TicketRunnerSubscribe::new(visitor.clone(), "/cfg^<u>").run();
    assert_eq!(rec.take(), vec![Event::Subscribe(false)]);

    seed_pod(&cfg, "pb", "y", 2);
    assert_eq!(rec.take(), Vec::<Event>::new());
}

#[test]
fn test_second_subscribe_displaces_first() {
    let (visitor, cfg, rec) = fixture();

    TicketRunnerSubscribe::new(visitor.clone(), "/cfg").run();
    TicketRunnerSubscribe::new(visitor.clone(), "/cfg").run();
    assert_eq!(
        rec.take(),
        vec![Event::Subscribe(true), Event::Subscribe(true)]
    );

    // Only the surviving subscription delivers; one notify per change.
    seed_pod(&cfg, "pa", "x", 1);
    assert_eq!(rec.take(), vec![Event::Notify("pa:x|1".to_string())]);
}

#[test]
fn test_subscribe_missing_tab() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerSubscribe::new(visitor, "/cfg^nosuch").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::NotFoundTab)]);
}

#[test]
fn test_error_runner_helpers() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerError::arguments_must_be_empty(visitor.clone(), "/x").run();
    TicketRunnerError::unknown_command(visitor, "/x").run();
    assert_eq!(
        rec.take(),
        vec![
            Event::Error(OpErr::BadCommandArgument),
            Event::Error(OpErr::NotSupportedCmd),
        ]
    );
}

#[test]
fn test_bad_path_reports_format_error() {
    let (visitor, _cfg, rec) = fixture();
    TicketRunnerRead::new(visitor, "/cfg/'unterminated").run();
    assert_eq!(rec.take(), vec![Event::Error(OpErr::PathFormatError)]);
}
