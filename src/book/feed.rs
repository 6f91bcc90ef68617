//! Feed Entries and the Depth-Update Policy
//!
//! The wire codec is someone else's problem; this module consumes the
//! abstract contract: a batch of `(action, side, level, raw_price, qty)`
//! entries stamped with a quote time. Raw prices divide by the instrument's
//! price-origin divisor to become canonical.
//!
//! Update semantics per entry:
//!
//! - `New`     - insert at the 1-based level, shifting deeper levels down
//!               and dropping the old level 5
//! - `Change`  - overwrite the level in place
//! - `Delete`  - remove the level, shifting deeper levels up
//! - `Overlay` - snapshot: the touched side is cleared first, then entries
//!               land at their stated levels (missing levels stay cleared)
//!
//! Quantity 0 always means delete, whatever the declared action. A `New`
//! beyond the book depth is discarded. Derived sides are single-slot and
//! only level 1 applies.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::data::{BookData, BookFlag, PriQty, BOOK_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedAction {
    New,
    Change,
    Delete,
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSide {
    Buy,
    Sell,
    DerivedBuy,
    DerivedSell,
}

/// One depth update from the venue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeedEntry {
    pub action: FeedAction,
    pub side: FeedSide,
    /// 1-based price level.
    pub level: u8,
    /// Price in venue units; divide by the price-origin divisor.
    pub raw_price: i64,
    pub qty: u64,
}

impl FeedEntry {
    pub fn new(action: FeedAction, side: FeedSide, level: u8, raw_price: i64, qty: u64) -> Self {
        Self {
            action,
            side,
            level,
            raw_price,
            qty,
        }
    }
}

/// A parsed feed message: quote time plus its entries, in wire order.
#[derive(Debug, Clone)]
pub struct FeedBatch<'a> {
    pub quote_time_ns: i64,
    pub entries: &'a [FeedEntry],
    /// Post-auction calculated snapshot marker.
    pub calculated: bool,
}

fn side_flag(side: FeedSide) -> u8 {
    match side {
        FeedSide::Buy => BookFlag::BUY_CHANGED,
        FeedSide::Sell => BookFlag::SELL_CHANGED,
        FeedSide::DerivedBuy => BookFlag::DERIVED_BUY_CHANGED,
        FeedSide::DerivedSell => BookFlag::DERIVED_SELL_CHANGED,
    }
}

fn apply_depth(levels: &mut [PriQty; BOOK_DEPTH], action: FeedAction, level: usize, pq: PriQty) {
    // 0-based here; callers validated 1 <= level <= BOOK_DEPTH.
    match action {
        FeedAction::New => {
            for i in (level + 1..BOOK_DEPTH).rev() {
                levels[i] = levels[i - 1];
            }
            levels[level] = pq;
        }
        FeedAction::Change | FeedAction::Overlay => {
            levels[level] = pq;
        }
        FeedAction::Delete => {
            for i in level..BOOK_DEPTH - 1 {
                levels[i] = levels[i + 1];
            }
            levels[BOOK_DEPTH - 1].clear();
        }
    }
}

/// Apply a feed batch to `book`. Entries on the same side apply in listed
/// order; every touched side gets its change flag; the book timestamp takes
/// the batch's quote time.
pub fn apply_feed(book: &mut BookData, batch: &FeedBatch<'_>, price_origin_div: u32) {
    let div = price_origin_div.max(1) as f64;

    // Snapshot entries replace their side: clear each overlaid side once,
    // before any entry of the batch lands on it.
    for e in batch.entries {
        if e.action == FeedAction::Overlay {
            match e.side {
                FeedSide::Buy => book.bids = Default::default(),
                FeedSide::Sell => book.asks = Default::default(),
                FeedSide::DerivedBuy => book.derived_bid.clear(),
                FeedSide::DerivedSell => book.derived_ask.clear(),
            }
        }
    }

    for e in batch.entries {
        let pq = PriQty::new(e.raw_price as f64 / div, e.qty);
        // q = 0 means delete at this level, whatever the action says.
        let action = if e.qty == 0 { FeedAction::Delete } else { e.action };
        let level = e.level as usize;
        if level == 0 {
            trace!(?e, "discarding level-0 feed entry");
            continue;
        }
        match e.side {
            FeedSide::Buy | FeedSide::Sell => {
                if level > BOOK_DEPTH {
                    trace!(?e, "discarding feed entry beyond book depth");
                    continue;
                }
                let levels = if e.side == FeedSide::Buy {
                    &mut book.bids
                } else {
                    &mut book.asks
                };
                apply_depth(levels, action, level - 1, pq);
            }
            FeedSide::DerivedBuy | FeedSide::DerivedSell => {
                if level != 1 {
                    trace!(?e, "discarding derived entry beyond level 1");
                    continue;
                }
                let slot = if e.side == FeedSide::DerivedBuy {
                    &mut book.derived_bid
                } else {
                    &mut book.derived_ask
                };
                match action {
                    FeedAction::Delete => slot.clear(),
                    _ => *slot = pq,
                }
            }
        }
        book.flags |= side_flag(e.side);
    }

    if batch.calculated {
        book.flags |= BookFlag::CALCULATED;
    }
    book.quote_time_ns = batch.quote_time_ns;
}
