//! quotewire - Low-Latency Trading Infrastructure Toolkit
//!
//! Building blocks for an order-management system and a market-data
//! ingestion line, on top of a small systems runtime:
//!
//! - [`appender`] - asynchronous batching byte sinks with flush/consume
//!   barriers and at most one consumer thread; the substrate under loggers,
//!   file writers, and protocol egress
//! - [`book`] - per-instrument quote books (5-level depth + derived levels),
//!   the trading-session freshness rule, and the feed update policy
//! - [`seed`] - a hierarchical configuration/inspection tree with
//!   path-resolved asynchronous operations and per-visitor subscriptions
//! - [`imp`] - schedule- and monitor-driven file importers with append-tail
//!   loading
//! - [`fields`] / [`pool`] - fixed-capacity byte fields and the slot pool
//!   underlying identifiers and pooled entities
//! - [`runtime`] - the shared worker pool and the dedicated timer thread
//! - [`auth`] - the SCRAM-SHA-256 client crypto path
//!
//! Concurrency model: explicit threads. Producers never block on consumers;
//! barrier waits are the only suspension points. See each module's docs for
//! its ordering guarantees.

pub mod appender;
pub mod auth;
pub mod book;
pub mod fields;
pub mod imp;
pub mod pool;
pub mod runtime;
pub mod seed;

pub use appender::{AppendSink, Appender, CaptureSink, DrainQueue};
pub use book::{BookData, FeedBatch, FeedEntry, PriQty, Symbol, SymbolStore, TradingSession};
pub use fields::{FixedCell, FixedKey, TrimCell};
pub use pool::SlotPool;
