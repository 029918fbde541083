// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side {
    pub fn from_is_buyer(is_buyer: bool) -> Self { if is_buyer { Side::Buy } else { Side::Sell } }
    pub fn label(&self) -> &'static str { match self { Side::Buy => "Buy", Side::Sell => "Sell" } }
}

/// One executed trade as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub quote_qty: f64,
    pub time_ms: i64,
}

impl Fill {
    pub fn new(symbol: &str, side: Side, price: f64, qty: f64, time_ms: i64) -> Self {
        Self { symbol: symbol.to_string(), side, price, qty, quote_qty: price * qty, time_ms }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance { pub free: f64, pub locked: f64 }
impl Balance { pub fn total(&self) -> f64 { self.free + self.locked } }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub status: String,
    pub created_at_ms: i64,
}

/// Deposit or withdrawal record; `status` is the raw exchange status code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer { pub amount: f64, pub status: i64 }

// ---- Reconstruction output ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome { Opening, Profit, Loss, Breakeven }

impl Outcome {
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 { Outcome::Profit } else if pnl < 0.0 { Outcome::Loss } else { Outcome::Breakeven }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub quote_total: f64,
    /// `None` when the fill only added to a position.
    pub realized_pnl: Option<f64>,
    pub realized_pnl_pct: Option<f64>,
    pub outcome: Outcome,
    pub description: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionSnapshot {
    pub symbol: String,
    /// positive = long, negative = short
    pub qty: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,
    pub time: Option<DateTime<Utc>>,
}

impl OpenPositionSnapshot {
    pub fn is_long(&self) -> bool { self.qty > 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub asset: String,
    pub baseline: f64,
    pub net_transfers: f64,
    pub pnl_qty: f64,
    pub pnl_quote: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPriceDailyPnl {
    pub symbol: String,
    pub open_price: f64,
    /// true if the hourly open was missing and the current price stood in
    pub fallback: bool,
    pub bought_today_qty: f64,
    pub bought_today_quote: f64,
    pub pnl_quote: f64,
}

/// Events written by the JSONL recorder, one per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Ledger { strategy: String, entry: LedgerEntry },
    Position { strategy: String, snapshot: OpenPositionSnapshot },
    Daily(DailyPnl),
    DailyOpen(OpenPriceDailyPnl),
    Note(String),
}

/// Gateways reject out-of-range trade times; anything slipping through lands on the epoch, loudly.
pub fn ms_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(|| {
        tracing::warn!(ms, "timestamp out of range, using 1970-01-01");
        DateTime::<Utc>::default()
    })
}
