//! Per-Instrument Symbol Record
//!
//! Carries the trading-date / trading-session pair used to judge data
//! freshness. The venue's session field cannot be trusted for this (the day
//! feed always says regular, the night feed always says after-hours), so the
//! record keeps its own latest-accepted session: once after-hours data has
//! been seen for a trading date, regular-session data for that date is
//! stale and must be dropped.

use serde::{Deserialize, Serialize};

use super::data::{BookData, DealData, RefData};
use crate::fields::FixedKey;

/// Instrument identifier: exchange symbol ids fit in 20 bytes.
pub type SymbolKey = FixedKey<20>;

/// Market phase of the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TradingSession {
    /// No data accepted yet for the current trading date.
    Unknown = 0,
    /// Day session.
    Regular = b'0',
    /// Night session; wins on freshness.
    AfterHours = b'1',
}

impl Default for TradingSession {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One instrument's market-data state. Single writer per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolKey,
    /// Trading date (yyyymmdd) the current state belongs to.
    pub tday: u32,
    pub session: TradingSession,
    /// Divisor applied to raw feed prices to get canonical prices.
    pub price_origin_div: u32,
    pub refs: RefData,
    pub book: BookData,
    pub deal: DealData,
}

impl Symbol {
    pub fn new(id: SymbolKey, price_origin_div: u32) -> Self {
        Self {
            id,
            tday: 0,
            session: TradingSession::Unknown,
            price_origin_div: price_origin_div.max(1),
            refs: RefData::default(),
            book: BookData::default(),
            deal: DealData::default(),
        }
    }

    /// Freshness check-and-commit for an update tagged `session`.
    ///
    /// Returns `true` when the update may be applied (the session matches,
    /// or advances regular -> after-hours, or none was set yet); on `true`
    /// the symbol's session equals `session` afterwards. Returns `false`
    /// when the symbol is already in after-hours and the update is tagged
    /// regular: that data belongs to the finished day session and must be
    /// dropped.
    pub fn check_set_session(&mut self, session: TradingSession) -> bool {
        if self.session == session {
            return true;
        }
        if self.session == TradingSession::AfterHours {
            return false;
        }
        self.session = session;
        true
    }

    /// Record a trade: last price/qty plus cumulative session volume.
    pub fn record_deal(&mut self, deal_time_ns: i64, price: f64, qty: u64) {
        self.deal.deal_time_ns = deal_time_ns;
        self.deal.price = price;
        self.deal.qty = qty;
        self.deal.total_qty += qty;
    }

    /// Day rollover: reset state for trading date `tday`. The session is
    /// re-opened implicitly; the next accepted update establishes it.
    pub fn daily_clear(&mut self, tday: u32) {
        self.tday = tday;
        self.session = TradingSession::Unknown;
        self.book.clear();
        self.deal.clear();
    }
}
