// ===============================
// src/binance.rs
// ===============================
//
// Helper signer + REST payload models untuk Binance Spot.
// Angka dari Binance datang sebagai string desimal.
//
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::domain::{Fill, OpenOrder, Side, Transfer};
use crate::gateway::GatewayError;

/// Deposit status "success/credited" in `/sapi/v1/capital/deposit/hisrec`.
pub const DEPOSIT_STATUS_CREDITED: i64 = 1;
/// Withdrawal status "completed" in `/sapi/v1/capital/withdraw/history`.
pub const WITHDRAW_STATUS_COMPLETED: i64 = 6;

pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn num(field: &'static str, s: &str) -> Result<f64, GatewayError> {
    s.parse::<f64>().map_err(|e| GatewayError::Decode(format!("{field}={s:?}: {e}")))
}

// ---- GET /api/v3/myTrades ----
/// Max page size accepted by myTrades.
pub const MY_TRADES_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTrade {
    pub id: i64,
    pub symbol: String,
    pub price: String,
    pub qty: String,
    pub quote_qty: String,
    pub time: i64,
    pub is_buyer: bool,
}

impl MyTrade {
    pub fn into_fill(self) -> Result<Fill, GatewayError> {
        if Utc.timestamp_millis_opt(self.time).single().is_none() {
            return Err(GatewayError::Decode(format!("trade {} time={} out of range", self.id, self.time)));
        }
        Ok(Fill {
            price: num("price", &self.price)?,
            qty: num("qty", &self.qty)?,
            quote_qty: num("quoteQty", &self.quote_qty)?,
            side: Side::from_is_buyer(self.is_buyer),
            time_ms: self.time,
            symbol: self.symbol,
        })
    }
}

/// Query for one myTrades page. Without `fromId` Binance returns only the most
/// recent trades, so paging always starts from id 0.
pub fn trade_page_params(symbol: &str, from_id: i64, limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", symbol.to_ascii_uppercase()),
        ("fromId", from_id.to_string()),
        ("limit", limit.to_string()),
    ]
}

/// `fromId` of the page after `page`, or `None` when `page` was the last one.
pub fn next_trade_id(page: &[MyTrade], limit: usize) -> Option<i64> {
    if page.len() < limit {
        return None;
    }
    page.iter().map(|t| t.id).max().map(|id| id + 1)
}

// ---- GET /api/v3/ticker/price ----
#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

impl TickerPrice {
    pub fn value(&self) -> Result<f64, GatewayError> { num("price", &self.price) }
}

// ---- GET /api/v3/account ----
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AssetBalance {
    pub fn amounts(&self) -> Result<(f64, f64), GatewayError> {
        Ok((num("free", &self.free)?, num("locked", &self.locked)?))
    }
}

// ---- GET /api/v3/openOrders ----
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOpenOrder {
    pub symbol: String,
    pub side: String,
    pub orig_qty: String,
    pub price: String,
    pub status: String,
    pub time: i64,
}

impl RawOpenOrder {
    pub fn into_order(self) -> Result<OpenOrder, GatewayError> {
        let side = match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => return Err(GatewayError::Decode(format!("side={other:?}"))),
        };
        Ok(OpenOrder {
            qty: num("origQty", &self.orig_qty)?,
            price: num("price", &self.price)?,
            side,
            status: self.status,
            created_at_ms: self.time,
            symbol: self.symbol,
        })
    }
}

// ---- deposit / withdraw history ----
#[derive(Debug, Deserialize)]
pub struct RawTransfer {
    pub amount: String,
    pub status: i64,
}

impl RawTransfer {
    pub fn into_transfer(self) -> Result<Transfer, GatewayError> {
        Ok(Transfer { amount: num("amount", &self.amount)?, status: self.status })
    }
}

// ---- GET /api/v3/klines ----
// Tiap kline berupa array campuran: [openTime, "open", "high", "low", "close", ...]
pub fn kline_open(rows: &[Vec<serde_json::Value>]) -> Result<Option<f64>, GatewayError> {
    let Some(first) = rows.first() else { return Ok(None) };
    match first.get(1).and_then(|v| v.as_str()) {
        Some(s) => num("open", s).map(Some),
        None => Err(GatewayError::Decode("kline without open price".into())),
    }
}
