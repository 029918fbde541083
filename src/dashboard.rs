// ===============================
// src/dashboard.rs (refresh cycle)
// ===============================
//
// Satu siklus: fetch -> reconstruct -> daily PnL -> report/metrics/recorder.
// Gagal di satu instrumen tidak boleh menghentikan instrumen lain.
//
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::baseline::BaselineStore;
use crate::config::StrategyCfg;
use crate::daily::{daily_pnl, daily_pnl_from_open, day_start_ms};
use crate::domain::{DailyPnl, Event};
use crate::format::{base_asset, format_pct, format_usdt, Row};
use crate::gateway::{ExchangeGateway, GatewayError};
use crate::metrics::{DAILY_PNL, FILLS, GATEWAY_ERRORS, PNL_REALIZED, PNL_UNREALIZED, POSITION_QTY, REFRESH_CYCLES};
use crate::positions::{reconstruct, PnlError};
use crate::report::{DayCache, InstrumentReport, Overview};

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("{op}: {source}")]
    Gateway { op: &'static str, source: GatewayError },
    #[error(transparent)]
    Pnl(#[from] PnlError),
}

fn gw_err<'a>(op: &'static str, symbol: &'a str) -> impl FnOnce(GatewayError) -> InstrumentError + 'a {
    move |source| {
        GATEWAY_ERRORS.with_label_values(&[op, symbol]).inc();
        InstrumentError::Gateway { op, source }
    }
}

pub struct Dashboard {
    gw: Arc<dyn ExchangeGateway>,
    store: BaselineStore,
    strategies: Vec<StrategyCfg>,
    quote: String,
    rec_tx: Option<mpsc::Sender<Event>>,
    cache: DayCache<Overview>,
}

impl Dashboard {
    pub fn new(gw: Arc<dyn ExchangeGateway>, store: BaselineStore, strategies: Vec<StrategyCfg>, quote: &str) -> Self {
        Self { gw, store, strategies, quote: quote.to_string(), rec_tx: None, cache: DayCache::default() }
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.rec_tx = Some(tx);
        self
    }

    /// Overview from the last cycle of the current UTC day.
    pub fn last(&self) -> Option<&Overview> { self.cache.get() }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }

    async fn refresh_instrument(
        &self,
        s: &StrategyCfg,
        now: DateTime<Utc>,
    ) -> Result<(InstrumentReport, Option<DailyPnl>), InstrumentError> {
        let gw = self.gw.as_ref();
        let sym = s.symbol.as_str();
        let base = base_asset(sym, &self.quote);

        let fills = gw.fills(sym).await.map_err(gw_err("fills", sym))?;
        let price = gw.ticker_price(sym).await.map_err(gw_err("ticker_price", sym))?;
        let balance = gw.balance(base).await.map_err(gw_err("balance", sym))?;

        let recon = reconstruct(&fills, price, &self.quote)?;

        // yang di bawah ini opsional: gagal -> log, lanjut
        let open_orders = match gw.open_orders(Some(sym)).await {
            Ok(v) => v.len(),
            Err(e) => {
                GATEWAY_ERRORS.with_label_values(&["open_orders", sym]).inc();
                warn!(symbol = %sym, error = %e, "open orders unavailable");
                0
            }
        };
        let open_px = match gw.hourly_open_price(sym, day_start_ms(now)).await {
            Ok(p) => p,
            Err(e) => {
                GATEWAY_ERRORS.with_label_values(&["hourly_open_price", sym]).inc();
                warn!(symbol = %sym, error = %e, "opening price unavailable");
                None
            }
        };
        let daily_vs_open = daily_pnl_from_open(sym, balance.total(), price, open_px, &fills, now);
        if daily_vs_open.fallback {
            warn!(symbol = %sym, "no opening candle for today, using current price");
        }

        let daily = match daily_pnl(gw, &self.store, base, balance.total(), price, now).await {
            Ok(d) => Some(d),
            Err(e) => {
                error!(asset = %base, error = %e, "daily pnl skipped");
                None
            }
        };

        FILLS.with_label_values(&[sym]).set(fills.len() as i64);
        PNL_REALIZED.with_label_values(&[sym]).set(recon.realized_total());
        PNL_UNREALIZED
            .with_label_values(&[sym])
            .set(recon.open_position.as_ref().map_or(0.0, |p| p.unrealized_pnl));
        POSITION_QTY.with_label_values(&[sym]).set(recon.final_state.net_qty);

        Ok((
            InstrumentReport {
                strategy: s.name.clone(),
                symbol: s.symbol.clone(),
                price,
                ledger: recon.ledger,
                open_position: recon.open_position,
                free_balance: balance.free,
                open_orders,
                daily_vs_open: Some(daily_vs_open),
            },
            daily,
        ))
    }

    /// Run one refresh cycle. Never fails as a whole; per-instrument errors land in `failures`.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Overview {
        if self.cache.invalidate_if_date_changed(now.date_naive()) {
            info!(day = %now.date_naive(), "day rolled over, cached overview dropped");
        }

        let results = join_all(self.strategies.iter().map(|s| self.refresh_instrument(s, now))).await;

        let mut reports = Vec::new();
        let mut daily = Vec::new();
        let mut failures = Vec::new();
        for (s, res) in self.strategies.iter().zip(results) {
            match res {
                Ok((r, d)) => {
                    reports.push(r);
                    daily.extend(d);
                }
                Err(e) => {
                    error!(symbol = %s.symbol, strategy = %s.name, error = %e, "instrument refresh failed");
                    failures.push((s.symbol.clone(), e.to_string()));
                }
            }
        }

        let quote_balance = match self.gw.balance(&self.quote).await {
            Ok(b) => b.free,
            Err(e) => {
                GATEWAY_ERRORS.with_label_values(&["balance", &self.quote]).inc();
                warn!(asset = %self.quote, error = %e, "quote balance unavailable");
                0.0
            }
        };

        let mut overview = Overview::build(&reports, daily, quote_balance);
        overview.failures = failures;

        for d in &overview.daily {
            DAILY_PNL.with_label_values(&[&d.asset]).set(d.pnl_quote);
        }
        self.emit(&reports, &overview);
        log_overview(&reports, &overview, &self.quote);
        REFRESH_CYCLES.inc();

        self.cache.set(overview.clone());
        overview
    }

    fn emit(&self, reports: &[InstrumentReport], overview: &Overview) {
        if self.rec_tx.is_none() {
            return;
        }
        for r in reports {
            for e in &r.ledger {
                self.record(Event::Ledger { strategy: r.strategy.clone(), entry: e.clone() });
            }
            if let Some(p) = &r.open_position {
                self.record(Event::Position { strategy: r.strategy.clone(), snapshot: p.clone() });
            }
            if let Some(d) = &r.daily_vs_open {
                self.record(Event::DailyOpen(d.clone()));
            }
        }
        for d in &overview.daily {
            self.record(Event::Daily(d.clone()));
        }
        for (sym, err) in &overview.failures {
            self.record(Event::Note(format!("{sym}: {err}")));
        }
    }
}

fn log_overview(reports: &[InstrumentReport], o: &Overview, quote: &str) {
    info!(
        realized = %format_usdt(o.realized_total),
        mean_per_trade = %format_usdt(o.realized_mean),
        holdings = %format_usdt(o.holdings_value),
        quote_balance = %format_usdt(o.quote_balance),
        failed = o.failures.len(),
        "portfolio"
    );
    for s in &o.strategies {
        info!(strategy = %s.name, wins = s.wins, losses = s.losses, realized = %format_usdt(s.realized), "strategy");
    }
    for r in reports {
        if let Some(p) = &r.open_position {
            let row = Row::from_position(&r.strategy, p, quote);
            info!(strategy = %row.strategy, qty = %row.qty, value = %row.total, pnl = %row.pnl, pnl_pct = %row.pnl_pct, "{}", row.context);
        }
        if r.open_orders > 0 {
            info!(symbol = %r.symbol, open_orders = r.open_orders, "open orders");
        }
        // histori terbaru dulu
        for e in r.ledger.iter().rev() {
            let row = Row::from_ledger(&r.strategy, e);
            tracing::debug!(strategy = %row.strategy, time = %row.time, pnl = %row.pnl, pnl_pct = %row.pnl_pct, tag = %row.tag, "{}", row.context);
        }
        if let Some(d) = &r.daily_vs_open {
            info!(symbol = %d.symbol, open = d.open_price, fallback = d.fallback, pnl = %format_usdt(d.pnl_quote), "daily vs open");
        }
    }
    for d in &o.daily {
        let pct = if d.baseline > 0.0 { d.pnl_qty / d.baseline * 100.0 } else { 0.0 };
        info!(
            asset = %d.asset,
            baseline = d.baseline,
            net_transfers = d.net_transfers,
            pnl_qty = d.pnl_qty,
            pnl = %format_usdt(d.pnl_quote),
            pnl_pct = %format_pct(pct),
            "daily"
        );
    }
    for (day, t) in o.by_day.iter().rev().take(7) {
        info!(%day, realized = %format_usdt(t.realized), cumulative = %format_usdt(t.cumulative),
            status = if t.realized > 0.0 { "positive" } else { "negative" }, "day");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fill, Side};
    use crate::gateway::MockGateway;
    use chrono::TimeZone;

    #[tokio::test]
    async fn failing_instrument_does_not_abort_cycle() {
        let gw = MockGateway::new();
        gw.push_fill(Fill::new("AUSDT", Side::Buy, 1.0, 10.0, 1));
        gw.set_price("AUSDT", 1.5);
        gw.set_balance("A", 10.0, 0.0);
        gw.fail_symbol("BUSDT");

        let dir = tempfile::tempdir().unwrap();
        let strategies = vec![
            StrategyCfg { symbol: "AUSDT".into(), name: "A".into() },
            StrategyCfg { symbol: "BUSDT".into(), name: "B".into() },
        ];
        let mut dash = Dashboard::new(Arc::new(gw), BaselineStore::new(dir.path().join("b.json")), strategies, "USDT");
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let o = dash.refresh(now).await;

        assert_eq!(o.failures.len(), 1);
        assert_eq!(o.failures[0].0, "BUSDT");
        assert_eq!(o.daily.len(), 1);
        assert_eq!(o.daily[0].asset, "A");
        assert!(dash.last().is_some());
    }
}
