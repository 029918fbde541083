// ===============================
// src/daily.rs (daily account PnL)
// ===============================
//
// PnL harian = saldo sekarang - saldo awal hari (baseline) - transfer bersih hari ini.
// Deposit/withdraw tidak boleh terbaca sebagai profit trading.
//
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::warn;

use crate::baseline::{BaselineStore, StoreError};
use crate::binance::{DEPOSIT_STATUS_CREDITED, WITHDRAW_STATUS_COMPLETED};
use crate::domain::{DailyPnl, Fill, OpenPriceDailyPnl, Side, Transfer};
use crate::gateway::ExchangeGateway;

#[derive(Debug, Error)]
pub enum DailyPnlError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// UTC midnight of `now`, in ms.
pub fn day_start_ms(now: DateTime<Utc>) -> i64 {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

pub fn utc_day(now: DateTime<Utc>) -> NaiveDate { now.date_naive() }

fn sum_with_status(rows: &[Transfer], status: i64) -> f64 {
    rows.iter().filter(|t| t.status == status).map(|t| t.amount).sum()
}

/// Credited deposits minus completed withdrawals in `[start_ms, end_ms]`.
/// A failing history call counts as zero for that side.
pub async fn net_transfers(gw: &dyn ExchangeGateway, asset: &str, start_ms: i64, end_ms: i64) -> f64 {
    let deposits = match gw.deposit_history(asset, start_ms, end_ms).await {
        Ok(rows) => sum_with_status(&rows, DEPOSIT_STATUS_CREDITED),
        Err(e) => {
            warn!(%asset, error = %e, "deposit history unavailable, assuming none");
            0.0
        }
    };
    let withdrawals = match gw.withdrawal_history(asset, start_ms, end_ms).await {
        Ok(rows) => sum_with_status(&rows, WITHDRAW_STATUS_COMPLETED),
        Err(e) => {
            warn!(%asset, error = %e, "withdrawal history unavailable, assuming none");
            0.0
        }
    };
    deposits - withdrawals
}

pub async fn daily_pnl(
    gw: &dyn ExchangeGateway,
    store: &BaselineStore,
    asset: &str,
    current_balance: f64,
    current_price: f64,
    now: DateTime<Utc>,
) -> Result<DailyPnl, DailyPnlError> {
    let baseline = store.get_or_init_async(utc_day(now), asset, current_balance).await?;
    let net = net_transfers(gw, asset, day_start_ms(now), now.timestamp_millis()).await;
    let pnl_qty = current_balance - baseline - net;
    Ok(DailyPnl {
        asset: asset.to_string(),
        baseline,
        net_transfers: net,
        pnl_qty,
        pnl_quote: pnl_qty * current_price,
    })
}

/// Cross-check against the day's opening price:
/// `qty*price - (qty - bought_today)*open - bought_today_quote`.
///
/// `open_price = None` falls back to `current_price` and sets `fallback`.
pub fn daily_pnl_from_open(
    symbol: &str,
    qty_now: f64,
    current_price: f64,
    open_price: Option<f64>,
    fills: &[Fill],
    now: DateTime<Utc>,
) -> OpenPriceDailyPnl {
    let start = day_start_ms(now);
    let (bought_today_qty, bought_today_quote) = fills
        .iter()
        .filter(|f| f.side == Side::Buy && f.time_ms >= start)
        .fold((0.0, 0.0), |(q, v), f| (q + f.qty, v + f.qty * f.price));

    let (open, fallback) = match open_price {
        Some(p) if p > 0.0 => (p, false),
        _ => (current_price, true),
    };
    let value_now = qty_now * current_price;
    let value_open = (qty_now - bought_today_qty) * open;
    OpenPriceDailyPnl {
        symbol: symbol.to_string(),
        open_price: open,
        fallback,
        bought_today_qty,
        bought_today_quote,
        pnl_quote: value_now - value_open - bought_today_quote,
    }
}
