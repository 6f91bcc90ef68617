//! Book, Deal, and Reference Records
//!
//! Fixed-size, `Copy` records so readers can take a whole snapshot in one
//! assignment. Prices are canonical (already divided by the instrument's
//! price-origin divisor); quantities are contract counts.

use serde::{Deserialize, Serialize};

/// Depth kept per side of the quote book.
pub const BOOK_DEPTH: usize = 5;

/// One price level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriQty {
    pub price: f64,
    pub qty: u64,
}

impl PriQty {
    pub fn new(price: f64, qty: u64) -> Self {
        Self { price, qty }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.qty == 0 && self.price == 0.0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Change-flag bits set by the feed applier for each updated side.
#[allow(non_snake_case)]
pub mod BookFlag {
    /// Post-auction calculated snapshot (leftover order book).
    pub const CALCULATED: u8 = 0x01;
    /// Buy side changed, or a snapshot carried buy data.
    pub const BUY_CHANGED: u8 = 0x02;
    /// Sell side changed, or a snapshot carried sell data.
    pub const SELL_CHANGED: u8 = 0x04;
    /// Derived buy level changed.
    pub const DERIVED_BUY_CHANGED: u8 = 0x10;
    /// Derived sell level changed.
    pub const DERIVED_SELL_CHANGED: u8 = 0x20;
}

/// The quote book: five levels a side plus one venue-derived level a side.
///
/// `bids[0]` is the best bid (descending), `asks[0]` the best ask
/// (ascending). `quote_time_ns` stamps the feed batch that produced this
/// image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BookData {
    pub quote_time_ns: i64,
    pub bids: [PriQty; BOOK_DEPTH],
    pub asks: [PriQty; BOOK_DEPTH],
    pub derived_bid: PriQty,
    pub derived_ask: PriQty,
    pub flags: u8,
}

impl BookData {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn best_bid(&self) -> Option<PriQty> {
        let l = self.bids[0];
        (!l.is_empty()).then_some(l)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<PriQty> {
        let l = self.asks[0];
        (!l.is_empty()).then_some(l)
    }

    #[inline]
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b.price + a.price) / 2.0),
            _ => None,
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Last-trade summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DealData {
    pub deal_time_ns: i64,
    pub price: f64,
    pub qty: u64,
    /// Cumulative traded volume for the session.
    pub total_qty: u64,
}

impl DealData {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Venue reference prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefData {
    pub reference: f64,
    pub limit_up: f64,
    pub limit_down: f64,
}

impl RefData {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
