// ===============================
// src/format.rs
// ===============================
//
// Display step only. Angka asli tetap di LedgerEntry / OpenPositionSnapshot,
// string di sini tidak pernah di-parse balik.
//
use serde::Serialize;

use crate::domain::{LedgerEntry, OpenPositionSnapshot, Outcome, Side};

pub const NOT_APPLICABLE: &str = "-";

pub fn format_usdt(v: f64) -> String {
    if v < 0.0 { format!("-${:.2}", v.abs()) } else { format!("${:.2}", v) }
}

pub fn format_pct(v: f64) -> String { format!("{:.2}%", v) }

fn opt(v: Option<f64>, f: fn(f64) -> String) -> String {
    v.map(f).unwrap_or_else(|| NOT_APPLICABLE.to_string())
}

/// "XRPUSDT" -> "XRP" for quote "USDT". Symbols without the suffix pass through.
pub fn base_asset<'a>(symbol: &'a str, quote: &str) -> &'a str {
    match symbol.strip_suffix(quote) {
        Some(base) if !base.is_empty() => base,
        _ => symbol,
    }
}

pub fn describe_fill(side: Side, qty: f64, base: &str, price: f64, opening_short: bool) -> String {
    let mut s = format!("{} {:.2} {} @ {}", side.label(), qty, base, format_usdt(price));
    if opening_short {
        s.push_str(" (opening short)");
    }
    s
}

pub fn describe_position(qty: f64, base: &str, price: f64) -> String {
    format!("Holding {:.4} {} @ {}", qty, base, format_usdt(price))
}

pub fn outcome_tag(o: Outcome) -> &'static str {
    match o {
        Outcome::Opening => "",
        Outcome::Profit => "profit",
        Outcome::Loss => "loss",
        Outcome::Breakeven => "breakeven",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Row {
    pub strategy: String,
    pub symbol: String,
    pub kind: String,
    pub qty: String,
    pub price: String,
    pub total: String,
    pub pnl: String,
    pub pnl_pct: String,
    pub tag: String,
    pub context: String,
    pub time: String,
}

impl Row {
    pub fn from_ledger(strategy: &str, e: &LedgerEntry) -> Self {
        Self {
            strategy: strategy.to_string(),
            symbol: e.symbol.clone(),
            kind: e.side.label().to_string(),
            qty: format!("{}", e.qty),
            price: format_usdt(e.price),
            total: format_usdt(e.quote_total),
            pnl: opt(e.realized_pnl, format_usdt),
            pnl_pct: opt(e.realized_pnl_pct, format_pct),
            tag: outcome_tag(e.outcome).to_string(),
            context: e.description.clone(),
            time: e.time.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn from_position(strategy: &str, p: &OpenPositionSnapshot, quote: &str) -> Self {
        let base = base_asset(&p.symbol, quote);
        Self {
            strategy: strategy.to_string(),
            symbol: p.symbol.clone(),
            kind: "Current Position".to_string(),
            qty: format!("{:.4}", p.qty),
            price: format_usdt(p.current_price),
            total: format_usdt(p.market_value),
            pnl: format_usdt(p.unrealized_pnl),
            pnl_pct: format_pct(p.unrealized_pnl_pct),
            tag: if p.unrealized_pnl >= 0.0 { "up" } else { "down" }.to_string(),
            context: describe_position(p.qty, base, p.current_price),
            time: p.time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ms_to_utc;

    #[test]
    fn currency_and_percent() {
        assert_eq!(format_usdt(3.4666), "$3.47");
        assert_eq!(format_usdt(-1.5), "-$1.50");
        assert_eq!(format_pct(12.3456), "12.35%");
    }

    #[test]
    fn base_asset_strips_quote_suffix() {
        assert_eq!(base_asset("XRPUSDT", "USDT"), "XRP");
        assert_eq!(base_asset("USDT", "USDT"), "USDT");
        assert_eq!(base_asset("ETHBTC", "USDT"), "ETHBTC");
    }

    #[test]
    fn non_realizing_row_shows_placeholder() {
        let e = LedgerEntry {
            symbol: "XRPUSDT".into(),
            side: Side::Buy,
            qty: 10.0,
            price: 1.0,
            quote_total: 10.0,
            realized_pnl: None,
            realized_pnl_pct: None,
            outcome: Outcome::Opening,
            description: describe_fill(Side::Buy, 10.0, "XRP", 1.0, false),
            time: ms_to_utc(0),
        };
        let row = Row::from_ledger("XRP Aggressive", &e);
        assert_eq!(row.pnl, NOT_APPLICABLE);
        assert_eq!(row.pnl_pct, NOT_APPLICABLE);
        assert_eq!(row.tag, "");
        assert_eq!(row.context, "Buy 10.00 XRP @ $1.00");
    }
}
