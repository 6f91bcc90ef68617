//! Symbol Book Update Engine
//!
//! Per-instrument quote-book state for an exchange market-data line:
//!
//! - [`data`] - the fixed-size book record (5 levels a side + derived
//!   levels + change flags), deal and reference summaries
//! - [`symbol`] - the per-instrument record with the trading-session
//!   freshness rule (after-hours data wins; stale day-session updates for
//!   the same trading date are rejected)
//! - [`feed`] - the abstract feed-entry contract and the depth-update
//!   policy (new/change/delete/overlay)
//! - [`store`] - the symbol store: pooled cells, single writer per symbol,
//!   lock-free published snapshots for readers
//!
//! A single writer per symbol is assumed; the feed dispatcher routes by
//! symbol id.

pub mod data;
pub mod feed;
pub mod store;
pub mod symbol;

pub use data::{BookData, DealData, PriQty, RefData, BOOK_DEPTH};
pub use feed::{apply_feed, FeedAction, FeedBatch, FeedEntry, FeedSide};
pub use store::{SymbolCell, SymbolStore, SymbolStoreStats};
pub use symbol::{Symbol, SymbolKey, TradingSession};
