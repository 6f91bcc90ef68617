//! File-Import Scheduler
//!
//! Schedule- and monitor-driven reloadable importers. Each import target is
//! a seed-tree pod carrying its configuration (`FieldName`, `Mon`, `Sch`,
//! `Result`) and a per-seed state machine Idle -> Loading -> Reloading with
//! coalesced re-entry.
//!
//! - [`loader`] - the block/line parsing contract
//! - [`sch`] - daily-window schedule expressions (the in/out oracle)
//! - [`seed`] - one import target: load protocol, AddTail bookkeeping,
//!   monitor checks
//! - [`tree`] - the import tree: seeds as pods of a seed tree
//! - [`mgr`] - the manager: schedule polling on the timer thread, loads
//!   dispatched to the worker pool

pub mod loader;
pub mod mgr;
pub mod sch;
pub mod seed;
pub mod tree;

pub use loader::{ImpLoader, LineCollector};
pub use mgr::{ImportMgr, ImportMgrConfig};
pub use sch::Schedule;
pub use seed::{ImportHandler, ImportSeed, LoadState, LoaderPlan, MonitorMode};
pub use tree::ImportTree;
