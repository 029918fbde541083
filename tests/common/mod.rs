use chrono::{DateTime, TimeZone, Utc};

use pnl_dash_rust::config::StrategyCfg;
use pnl_dash_rust::domain::{Fill, Side};
use pnl_dash_rust::gateway::MockGateway;

pub const HOUR: i64 = 3_600_000;

/// Fixed "now" so day boundaries are deterministic.
#[allow(dead_code)]
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn strategy(symbol: &str, name: &str) -> StrategyCfg {
    StrategyCfg { symbol: symbol.into(), name: name.into() }
}

/// Mock account holding the worked example: buy 10 @ 1.00, buy 5 @ 1.20, sell 8 @ 1.50.
#[allow(dead_code)]
pub fn seeded_gateway(symbol: &str, base: &str, t0: i64) -> MockGateway {
    let gw = MockGateway::new();
    // pushed out of order on purpose
    gw.push_fill(Fill::new(symbol, Side::Sell, 1.50, 8.0, t0 + 2 * HOUR));
    gw.push_fill(Fill::new(symbol, Side::Buy, 1.00, 10.0, t0));
    gw.push_fill(Fill::new(symbol, Side::Buy, 1.20, 5.0, t0 + HOUR));
    gw.set_price(symbol, 1.30);
    gw.set_balance(base, 7.0, 0.0);
    gw.set_balance("USDT", 100.0, 0.0);
    gw
}
