// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : pnl_dash_rust : Binance Spot PnL dashboard in Rust
Module  : config.rs
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
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

/// Mode venue: data mock (tanpa kredensial) atau REST Binance
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketMode {
    Mock,
    BinanceSandbox,
    BinanceMainnet,
}

impl MarketMode {
    pub fn parse(s: &str, default_mode: MarketMode) -> MarketMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock"            => MarketMode::Mock,
            "binance_sandbox" => MarketMode::BinanceSandbox,
            "binance_mainnet" => MarketMode::BinanceMainnet,
            _ => default_mode,
        }
    }

    pub fn from_env(key: &str, default_mode: MarketMode) -> MarketMode {
        Self::parse(&env::var(key).unwrap_or_default(), default_mode)
    }

    pub fn default_rest_url(&self) -> &'static str {
        match self {
            MarketMode::Mock           => "https://testnet.binance.vision", // tidak dipakai saat mock
            MarketMode::BinanceSandbox => "https://testnet.binance.vision",
            MarketMode::BinanceMainnet => "https://api.binance.com",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketMode::Mock => "mock",
            MarketMode::BinanceSandbox => "binance_sandbox",
            MarketMode::BinanceMainnet => "binance_mainnet",
        }
    }
}

/// One tracked instrument and the strategy label it is reported under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyCfg {
    pub symbol: String,
    pub name: String,
}

/// `XRPUSDT:XRP Aggressive,CAKEUSDT:CAKE Scalping`. A bare symbol names itself.
pub fn parse_strategies(raw: &str) -> Vec<StrategyCfg> {
    let mut out: Vec<StrategyCfg> = Vec::new();
    for item in raw.split(',') {
        let (sym, name) = match item.split_once(':') {
            Some((s, n)) => (s.trim(), n.trim()),
            None => (item.trim(), item.trim()),
        };
        if sym.is_empty() {
            continue;
        }
        let symbol = sym.to_ascii_uppercase();
        if out.iter().any(|s| s.symbol == symbol) {
            continue;
        }
        let name = if name.is_empty() { symbol.clone() } else { name.to_string() };
        out.push(StrategyCfg { symbol, name });
    }
    out
}

fn default_strategies() -> Vec<StrategyCfg> {
    parse_strategies("XRPUSDT:XRP Aggressive,CAKEUSDT:CAKE Scalping")
}

#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone, Debug)]
pub struct Args {
    // venue
    pub venue_mode: MarketMode,
    pub binance_rest_url: String,
    pub credentials: Option<Credentials>,
    pub recv_window: u64,
    pub http_timeout: Duration,

    // what to track
    pub strategies: Vec<StrategyCfg>,
    pub quote_asset: String,

    // loop
    pub refresh: Duration,
    pub once: bool,

    // files/metrics
    pub baseline_file: PathBuf,
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

/// Command-line overrides on top of the environment.
#[derive(Parser, Debug, Default)]
#[command(name = "pnl_dash_rust", about = "Binance Spot PnL dashboard")]
pub struct Cli {
    /// Run a single refresh cycle and exit
    #[arg(long)]
    pub once: bool,
    /// Seconds between refresh cycles (overrides REFRESH_SECS)
    #[arg(long)]
    pub refresh_secs: Option<u64>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

pub fn load(cli: &Cli) -> Args {
    // Pastikan .env dibaca (agar BINANCE_API_KEY, STRATEGIES, dll ter-load)
    let _ = dotenv();

    // ===== Venue =====
    let venue_mode = MarketMode::from_env("VENUE_MODE", MarketMode::Mock);
    let binance_rest_url = env::var("BINANCE_REST_URL")
        .unwrap_or_else(|_| venue_mode.default_rest_url().to_string());
    let credentials = match (env::var("BINANCE_API_KEY"), env::var("BINANCE_API_SECRET")) {
        (Ok(api_key), Ok(api_secret)) if !api_key.is_empty() && !api_secret.is_empty() => {
            Some(Credentials { api_key, api_secret })
        }
        _ => None,
    };
    let recv_window = env_parse("BINANCE_RECV_WINDOW", 5000u64);
    let http_timeout = Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 10u64));

    // ===== Strategies =====
    // Contoh:
    //   STRATEGIES=XRPUSDT:XRP Aggressive,CAKEUSDT:CAKE Scalping
    let strategies = env::var("STRATEGIES")
        .ok()
        .map(|s| parse_strategies(&s))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(default_strategies);
    let quote_asset = env::var("QUOTE_ASSET")
        .map(|s| s.trim().to_ascii_uppercase())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "USDT".to_string());

    // ===== Loop ===== (default 6 menit)
    let refresh_secs = cli.refresh_secs.unwrap_or_else(|| env_parse("REFRESH_SECS", 360u64)).max(1);

    let baseline_file = PathBuf::from(
        env::var("BASELINE_FILE").unwrap_or_else(|_| "daily_balances.json".to_string()),
    );
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.is_empty());
    let metrics_port = env_parse("METRICS_PORT", 9899u16);

    Args {
        venue_mode,
        binance_rest_url,
        credentials,
        recv_window,
        http_timeout,
        strategies,
        quote_asset,
        refresh: Duration::from_secs(refresh_secs),
        once: cli.once,
        baseline_file,
        record_file,
        metrics_port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_parse_labels_and_dedup() {
        let s = parse_strategies(" xrpusdt:XRP Aggressive , CAKEUSDT , ,XRPUSDT:dup");
        assert_eq!(
            s,
            vec![
                StrategyCfg { symbol: "XRPUSDT".into(), name: "XRP Aggressive".into() },
                StrategyCfg { symbol: "CAKEUSDT".into(), name: "CAKEUSDT".into() },
            ]
        );
    }

    #[test]
    fn market_mode_falls_back_to_default() {
        assert_eq!(MarketMode::parse("Binance_Mainnet", MarketMode::Mock), MarketMode::BinanceMainnet);
        assert_eq!(MarketMode::parse("kraken", MarketMode::Mock), MarketMode::Mock);
        assert_eq!(MarketMode::BinanceMainnet.default_rest_url(), "https://api.binance.com");
    }
}
