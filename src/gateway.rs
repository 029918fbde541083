// ===============================
// src/gateway.rs (exchange gateway contract + mock)
// ===============================
use std::sync::Mutex;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Balance, Fill, OpenOrder, Side, Transfer};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the exchange account. Everything the dashboard needs per refresh.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Own trades for `symbol`; order is not guaranteed.
    async fn fills(&self, symbol: &str) -> Result<Vec<Fill>, GatewayError>;
    async fn ticker_price(&self, symbol: &str) -> Result<f64, GatewayError>;
    async fn balance(&self, asset: &str) -> Result<Balance, GatewayError>;
    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, GatewayError>;
    async fn deposit_history(&self, asset: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Transfer>, GatewayError>;
    async fn withdrawal_history(&self, asset: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Transfer>, GatewayError>;
    /// Open of the first 1h candle starting at `day_start_ms`, if the exchange has one.
    async fn hourly_open_price(&self, symbol: &str, day_start_ms: i64) -> Result<Option<f64>, GatewayError>;
}

#[derive(Debug, Default)]
struct MockBook {
    fills: HashMap<String, Vec<Fill>>,
    prices: HashMap<String, f64>,
    balances: HashMap<String, Balance>,
    open_orders: Vec<OpenOrder>,
    deposits: HashMap<String, Vec<Transfer>>,
    withdrawals: HashMap<String, Vec<Transfer>>,
    open_prices: HashMap<String, f64>,
    failing: HashSet<String>,
    failing_transfers: bool,
}

/// In-memory gateway for `VENUE_MODE=mock` and tests.
///
/// Symbols listed via `fail_symbol` answer every call with `GatewayError::Unavailable`.
/// Transfer history ignores the time window; callers filter by day themselves.
#[derive(Debug, Default)]
pub struct MockGateway {
    book: Mutex<MockBook>,
}

impl MockGateway {
    pub fn new() -> Self { Self::default() }

    fn with<R>(&self, f: impl FnOnce(&mut MockBook) -> R) -> R {
        let mut guard = self.book.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn push_fill(&self, fill: Fill) {
        self.with(|b| b.fills.entry(fill.symbol.clone()).or_default().push(fill));
    }
    pub fn set_price(&self, symbol: &str, px: f64) {
        self.with(|b| { b.prices.insert(symbol.to_string(), px); });
    }
    pub fn set_balance(&self, asset: &str, free: f64, locked: f64) {
        self.with(|b| { b.balances.insert(asset.to_string(), Balance { free, locked }); });
    }
    pub fn push_open_order(&self, o: OpenOrder) {
        self.with(|b| b.open_orders.push(o));
    }
    pub fn push_deposit(&self, asset: &str, amount: f64, status: i64) {
        self.with(|b| b.deposits.entry(asset.to_string()).or_default().push(Transfer { amount, status }));
    }
    pub fn push_withdrawal(&self, asset: &str, amount: f64, status: i64) {
        self.with(|b| b.withdrawals.entry(asset.to_string()).or_default().push(Transfer { amount, status }));
    }
    pub fn set_open_price(&self, symbol: &str, px: f64) {
        self.with(|b| { b.open_prices.insert(symbol.to_string(), px); });
    }
    pub fn fail_symbol(&self, symbol: &str) {
        self.with(|b| { b.failing.insert(symbol.to_string()); });
    }
    pub fn fail_transfers(&self, on: bool) {
        self.with(|b| b.failing_transfers = on);
    }

    /// Deterministic sample account so the binary runs without credentials.
    pub fn demo(symbols: &[String], quote: &str, now_ms: i64) -> Self {
        let gw = Self::new();
        let hour = 3_600_000;
        for (i, sym) in symbols.iter().enumerate() {
            let base_px = 1.0 + i as f64;
            let t0 = now_ms - 48 * hour;
            gw.push_fill(Fill::new(sym, Side::Buy, base_px, 100.0, t0));
            gw.push_fill(Fill::new(sym, Side::Buy, base_px * 1.2, 50.0, t0 + hour));
            gw.push_fill(Fill::new(sym, Side::Sell, base_px * 1.5, 80.0, t0 + 30 * hour));
            gw.push_fill(Fill::new(sym, Side::Buy, base_px * 1.1, 20.0, now_ms - hour));
            gw.set_price(sym, base_px * 1.3);
            gw.set_open_price(sym, base_px * 1.25);
            let base = crate::format::base_asset(sym, quote);
            gw.set_balance(base, 90.0, 0.0);
        }
        gw.set_balance(quote, 250.0, 0.0);
        gw
    }

    fn check(&self, key: &str) -> Result<(), GatewayError> {
        if self.with(|b| b.failing.contains(key)) {
            return Err(GatewayError::Unavailable(format!("mock failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn fills(&self, symbol: &str) -> Result<Vec<Fill>, GatewayError> {
        self.check(symbol)?;
        Ok(self.with(|b| b.fills.get(symbol).cloned().unwrap_or_default()))
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        self.check(symbol)?;
        self.with(|b| b.prices.get(symbol).copied())
            .ok_or_else(|| GatewayError::UnknownSymbol(symbol.to_string()))
    }

    async fn balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        self.check(asset)?;
        Ok(self.with(|b| b.balances.get(asset).copied().unwrap_or_default()))
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, GatewayError> {
        if let Some(s) = symbol { self.check(s)?; }
        Ok(self.with(|b| {
            b.open_orders.iter().filter(|o| symbol.map_or(true, |s| o.symbol == s)).cloned().collect()
        }))
    }

    async fn deposit_history(&self, asset: &str, _start_ms: i64, _end_ms: i64) -> Result<Vec<Transfer>, GatewayError> {
        if self.with(|b| b.failing_transfers) {
            return Err(GatewayError::Unavailable("deposit history".into()));
        }
        Ok(self.with(|b| b.deposits.get(asset).cloned().unwrap_or_default()))
    }

    async fn withdrawal_history(&self, asset: &str, _start_ms: i64, _end_ms: i64) -> Result<Vec<Transfer>, GatewayError> {
        if self.with(|b| b.failing_transfers) {
            return Err(GatewayError::Unavailable("withdrawal history".into()));
        }
        Ok(self.with(|b| b.withdrawals.get(asset).cloned().unwrap_or_default()))
    }

    async fn hourly_open_price(&self, symbol: &str, _day_start_ms: i64) -> Result<Option<f64>, GatewayError> {
        self.check(symbol)?;
        Ok(self.with(|b| b.open_prices.get(symbol).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_answers_and_fails_per_symbol() {
        let gw = MockGateway::new();
        gw.push_fill(Fill::new("AUSDT", Side::Buy, 1.0, 1.0, 1));
        gw.set_price("AUSDT", 2.0);
        gw.fail_symbol("BUSDT");

        assert_eq!(gw.fills("AUSDT").await.unwrap().len(), 1);
        assert_eq!(gw.ticker_price("AUSDT").await.unwrap(), 2.0);
        assert!(matches!(gw.ticker_price("CUSDT").await, Err(GatewayError::UnknownSymbol(_))));
        assert!(matches!(gw.fills("BUSDT").await, Err(GatewayError::Unavailable(_))));
        assert_eq!(gw.hourly_open_price("AUSDT", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn open_orders_filter_by_symbol() {
        let gw = MockGateway::new();
        for sym in ["AUSDT", "BUSDT"] {
            gw.push_open_order(OpenOrder {
                symbol: sym.into(),
                side: Side::Buy,
                qty: 1.0,
                price: 1.0,
                status: "NEW".into(),
                created_at_ms: 0,
            });
        }
        assert_eq!(gw.open_orders(None).await.unwrap().len(), 2);
        assert_eq!(gw.open_orders(Some("BUSDT")).await.unwrap().len(), 1);
    }
}
