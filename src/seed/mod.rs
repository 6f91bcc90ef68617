//! Seed Tree: Hierarchical Configuration / Inspection Dispatcher
//!
//! A seed tree is a rooted hierarchy of trees whose leaves ("pods") are keyed
//! byte strings; every tree exposes named column families ("tabs") with typed
//! fields. Text paths of the form `/seg/.../key^tab$cmd` resolve to exactly
//! one operation target.
//!
//! - [`path`] - path and argument parsing
//! - [`tree`] - layouts, tabs, fields, the `TreeNode` operation trait, the
//!   subscription subject, and `BasicTree`, the in-memory implementation
//! - [`visitor`] - a session owning the working path, at most one live
//!   subscription, and the result callbacks
//! - [`runner`] - ticket runners: one short-lived state machine per request
//!   (read / write / remove / grid-view / command / subscribe)
//! - [`error`] - operation error kinds

pub mod error;
pub mod path;
pub mod runner;
pub mod tree;
pub mod visitor;

#[cfg(test)]
mod runner_tests;

pub use error::{OpErr, OpResult};
pub use path::{SeedPath, UNSUBSCRIBE_TAB};
pub use runner::{
    TicketRunnerCommand, TicketRunnerError, TicketRunnerGridView, TicketRunnerRead,
    TicketRunnerRemove, TicketRunnerSubscribe, TicketRunnerWrite,
};
pub use tree::{
    BasicTree, Cell, Field, FieldType, GridStart, GridViewRequest, GridViewResult, Layout,
    NotifyKind, SeedNotify, SeedRow, SubConn, Subject, Tab, TreeNode, GRID_END_KEY,
};
pub use visitor::{OpContext, SeedVisitor, VisitorOutput, VisitorSubr};
