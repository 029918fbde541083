// ===============================
// src/main.rs
// ===============================
/*
 # satu siklus saja (mock, tanpa kredensial)
 VENUE_MODE=mock cargo run -- --once

 # metrics
 curl -s localhost:9899/metrics | egrep '^(pnl_|daily_pnl|gateway_errors)'
*/
/*
=============================================================================
Project : pnl_dash_rust : Binance Spot PnL dashboard in Rust
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Polls Binance Spot for fills, prices, balances and transfers,
          rebuilds average-cost positions per strategy, computes daily PnL
          net of deposits/withdrawals, logs a report every refresh, exposes
          Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pnl_dash_rust::baseline::BaselineStore;
use pnl_dash_rust::config::{self, Cli, MarketMode};
use pnl_dash_rust::dashboard::Dashboard;
use pnl_dash_rust::domain::Event;
use pnl_dash_rust::gateway::{ExchangeGateway, MockGateway};
use pnl_dash_rust::gateway_binance::BinanceGateway;
use pnl_dash_rust::{metrics, recorder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Load config ----
    let cli = Cli::parse();
    let args = config::load(&cli);

    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(args.metrics_port)
        .with_context(|| format!("metrics bind on port {}", args.metrics_port))?;

    let symbols: Vec<String> = args.strategies.iter().map(|s| s.symbol.clone()).collect();
    info!(
        venue_mode = %args.venue_mode.label(),
        strategies = ?args.strategies.iter().map(|s| (&s.symbol, &s.name)).collect::<Vec<_>>(),
        quote = %args.quote_asset,
        refresh_secs = args.refresh.as_secs(),
        baseline_file = %args.baseline_file.display(),
        binance_rest = %args.binance_rest_url,
        "startup config"
    );
    metrics::CONFIG_VENUE_MODE.with_label_values(&[args.venue_mode.label()]).set(1);
    for s in &args.strategies {
        metrics::CONFIG_STRATEGY.with_label_values(&[&s.name, &s.symbol]).set(1);
    }

    // ---- Gateway ----
    let gw: Arc<dyn ExchangeGateway> = match args.venue_mode {
        MarketMode::Mock => {
            warn!("VENUE_MODE=mock: serving deterministic demo account");
            Arc::new(MockGateway::demo(&symbols, &args.quote_asset, Utc::now().timestamp_millis()))
        }
        MarketMode::BinanceSandbox | MarketMode::BinanceMainnet => {
            if args.credentials.is_none() {
                warn!("BINANCE_API_KEY / BINANCE_API_SECRET missing, account calls will fail");
            }
            Arc::new(BinanceGateway::new(&args).context("build binance http client")?)
        }
    };

    let mut dash = Dashboard::new(
        gw,
        BaselineStore::new(args.baseline_file.clone()),
        args.strategies.clone(),
        &args.quote_asset,
    );

    // ---- Recorder (optional) ----
    let mut rec_task = None;
    if let Some(path) = args.record_file.clone() {
        let writer = recorder::open_writer(&path)
            .await
            .with_context(|| format!("open record file {path}"))?;
        let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
        rec_task = Some(tokio::spawn(recorder::run(rec_rx, path, writer)));
        dash = dash.with_recorder(rec_tx);
    }

    // ---- Refresh loop ----
    let mut tick = interval(args.refresh);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let o = dash.refresh(Utc::now()).await;
                info!(instruments = args.strategies.len(), failed = o.failures.len(), "refresh done");
                if args.once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, shutting down");
                break;
            }
        }
    }

    // drop sender agar recorder flush lalu selesai
    drop(dash);
    if let Some(t) = rec_task {
        let _ = t.await;
    }
    Ok(())
}
