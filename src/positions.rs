// ===============================
// src/positions.rs (cost basis & PnL reconstruction)
// ===============================
//
// Rebuild posisi satu instrumen dari seluruh riwayat fill setiap refresh.
// Average-cost (bukan FIFO), mendukung long dan short.
//
use thiserror::Error;

use crate::domain::{ms_to_utc, Fill, LedgerEntry, OpenPositionSnapshot, Outcome, Side};
use crate::format::{base_asset, describe_fill};

/// Residual below this is treated as flat.
pub const FLAT_EPSILON: f64 = 1e-5;

#[derive(Debug, Error, PartialEq)]
pub enum PnlError {
    #[error("current price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("fills mix instruments: expected {expected}, found {found}")]
    MixedInstruments { expected: String, found: String },
}

/// Running state threaded through the fills of one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionState {
    pub avg_cost: f64,
    /// positive = long, negative = short
    pub net_qty: f64,
}

/// What one fill did to the position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillEffect {
    Opened { short: bool },
    Realized { pnl: f64, pct: f64 },
}

fn ratio_pct(num: f64, den: f64) -> f64 {
    if den > 0.0 { (num / den - 1.0) * 100.0 } else { 0.0 }
}

impl PositionState {
    /// Apply one fill. A residual within `FLAT_EPSILON` afterwards is snapped to flat,
    /// so float dust from a close never carries the old cost into the next fill.
    pub fn apply(&mut self, side: Side, price: f64, qty: f64) -> FillEffect {
        let effect = self.step(side, price, qty);
        if self.net_qty.abs() <= FLAT_EPSILON {
            *self = Self::default();
        }
        effect
    }

    fn step(&mut self, side: Side, price: f64, qty: f64) -> FillEffect {
        match side {
            Side::Buy if self.net_qty < 0.0 => {
                // covering short
                let closed = self.net_qty.abs().min(qty);
                let pnl = (self.avg_cost - price) * closed;
                let pct = ratio_pct(self.avg_cost, price);
                self.net_qty += qty;
                if self.net_qty > 0.0 {
                    self.avg_cost = price;
                } else if self.net_qty == 0.0 {
                    self.avg_cost = 0.0;
                }
                FillEffect::Realized { pnl, pct }
            }
            Side::Buy => {
                let cost = self.avg_cost * self.net_qty + price * qty;
                self.net_qty += qty;
                self.avg_cost = if self.net_qty != 0.0 { cost / self.net_qty } else { 0.0 };
                FillEffect::Opened { short: false }
            }
            Side::Sell if self.net_qty > 0.0 => {
                // closing long; realized leg priced on the full sell qty
                let pnl = (price - self.avg_cost) * qty;
                let pct = ratio_pct(price, self.avg_cost);
                self.net_qty -= qty;
                if self.net_qty == 0.0 {
                    self.avg_cost = 0.0;
                } else if self.net_qty < 0.0 {
                    // overshoot opens a fresh short at this fill's price
                    self.avg_cost = price;
                }
                FillEffect::Realized { pnl, pct }
            }
            Side::Sell => {
                let held = self.net_qty.abs();
                let cost = self.avg_cost * held + price * qty;
                self.net_qty -= qty;
                let now_held = self.net_qty.abs();
                self.avg_cost = if now_held != 0.0 { cost / now_held } else { 0.0 };
                FillEffect::Opened { short: true }
            }
        }
    }

    pub fn is_open(&self) -> bool { self.net_qty.abs() > FLAT_EPSILON }

    /// Mark the residual position to `price`. `None` when flat.
    pub fn mark(&self, symbol: &str, price: f64) -> Option<OpenPositionSnapshot> {
        if !self.is_open() {
            return None;
        }
        let (unrealized_pnl, unrealized_pnl_pct) = if self.net_qty > 0.0 {
            ((price - self.avg_cost) * self.net_qty, ratio_pct(price, self.avg_cost))
        } else {
            ((self.avg_cost - price) * self.net_qty.abs(), ratio_pct(self.avg_cost, price))
        };
        Some(OpenPositionSnapshot {
            symbol: symbol.to_string(),
            qty: self.net_qty,
            avg_cost: self.avg_cost,
            current_price: price,
            market_value: price * self.net_qty,
            unrealized_pnl,
            unrealized_pnl_pct,
            time: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub ledger: Vec<LedgerEntry>,
    pub open_position: Option<OpenPositionSnapshot>,
    pub final_state: PositionState,
}

impl Reconstruction {
    pub fn realized_total(&self) -> f64 {
        self.ledger.iter().filter_map(|e| e.realized_pnl).sum()
    }
}

/// Replay `fills` of a single instrument in time order and mark the rest to `current_price`.
///
/// `quote` is only used to render the base asset in ledger descriptions.
pub fn reconstruct(fills: &[Fill], current_price: f64, quote: &str) -> Result<Reconstruction, PnlError> {
    let Some(first) = fills.first() else {
        return Ok(Reconstruction::default());
    };
    if !(current_price > 0.0) || !current_price.is_finite() {
        return Err(PnlError::NonPositivePrice(current_price));
    }
    let symbol = first.symbol.as_str();
    if let Some(other) = fills.iter().find(|f| f.symbol != symbol) {
        return Err(PnlError::MixedInstruments { expected: symbol.to_string(), found: other.symbol.clone() });
    }

    let mut ordered: Vec<&Fill> = fills.iter().collect();
    ordered.sort_by_key(|f| f.time_ms);

    let base = base_asset(symbol, quote);
    let mut state = PositionState::default();
    let mut ledger = Vec::with_capacity(ordered.len());

    for f in ordered {
        let effect = state.apply(f.side, f.price, f.qty);
        let (realized_pnl, realized_pnl_pct, outcome, opening_short) = match effect {
            FillEffect::Opened { short } => (None, None, Outcome::Opening, short),
            FillEffect::Realized { pnl, pct } => (Some(pnl), Some(pct), Outcome::from_pnl(pnl), false),
        };
        ledger.push(LedgerEntry {
            symbol: f.symbol.clone(),
            side: f.side,
            qty: f.qty,
            price: f.price,
            quote_total: f.quote_qty,
            realized_pnl,
            realized_pnl_pct,
            outcome,
            description: describe_fill(f.side, f.qty, base, f.price, opening_short),
            time: ms_to_utc(f.time_ms),
        });
    }

    Ok(Reconstruction { open_position: state.mark(symbol, current_price), ledger, final_state: state })
}
