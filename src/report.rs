// ===============================
// src/report.rs (aggregation across strategies)
// ===============================
use std::collections::BTreeMap;

use ahash::AHashMap as HashMap;
use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{DailyPnl, LedgerEntry, OpenPositionSnapshot, OpenPriceDailyPnl};

/// Result of one instrument in one refresh cycle.
#[derive(Debug, Clone)]
pub struct InstrumentReport {
    pub strategy: String,
    pub symbol: String,
    pub price: f64,
    pub ledger: Vec<LedgerEntry>,
    pub open_position: Option<OpenPositionSnapshot>,
    pub free_balance: f64,
    pub open_orders: usize,
    pub daily_vs_open: Option<OpenPriceDailyPnl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategySummary {
    pub name: String,
    pub wins: usize,
    /// breakeven counts here too
    pub losses: usize,
    pub realized: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayTotal {
    pub realized: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Overview {
    pub realized_total: f64,
    pub realized_mean: f64,
    pub holdings_value: f64,
    pub quote_balance: f64,
    pub strategies: Vec<StrategySummary>,
    pub by_day: BTreeMap<NaiveDate, DayTotal>,
    pub by_symbol: BTreeMap<String, f64>,
    pub daily: Vec<DailyPnl>,
    pub failures: Vec<(String, String)>,
}

impl Overview {
    pub fn build(reports: &[InstrumentReport], daily: Vec<DailyPnl>, quote_balance: f64) -> Self {
        let mut per_strategy: HashMap<&str, StrategySummary> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        let mut by_day: BTreeMap<NaiveDate, DayTotal> = BTreeMap::new();
        let mut by_symbol: BTreeMap<String, f64> = BTreeMap::new();
        let mut realized: Vec<f64> = Vec::new();

        for r in reports {
            let s = per_strategy.entry(r.strategy.as_str()).or_insert_with(|| {
                order.push(r.strategy.as_str());
                StrategySummary { name: r.strategy.clone(), ..Default::default() }
            });
            for e in &r.ledger {
                let Some(pnl) = e.realized_pnl else { continue };
                if pnl > 0.0 { s.wins += 1 } else { s.losses += 1 }
                s.realized += pnl;
                realized.push(pnl);
                by_day.entry(e.time.date_naive()).or_default().realized += pnl;
                *by_symbol.entry(e.symbol.clone()).or_default() += pnl;
            }
        }

        let mut running = 0.0;
        for t in by_day.values_mut() {
            running += t.realized;
            t.cumulative = running;
        }

        let realized_total: f64 = realized.iter().sum();
        let realized_mean = if realized.is_empty() { 0.0 } else { realized_total / realized.len() as f64 };

        Self {
            realized_total,
            realized_mean,
            holdings_value: reports.iter().map(|r| r.free_balance * r.price).sum(),
            quote_balance,
            strategies: order.into_iter().filter_map(|n| per_strategy.remove(n)).collect(),
            by_day,
            by_symbol,
            daily,
            failures: Vec::new(),
        }
    }

    pub fn realized_on(&self, day: NaiveDate) -> f64 {
        self.by_day.get(&day).map_or(0.0, |t| t.realized)
    }
}

/// Process-wide cache dropped when the observed UTC date changes.
#[derive(Debug)]
pub struct DayCache<T> {
    day: Option<NaiveDate>,
    value: Option<T>,
}

impl<T> Default for DayCache<T> {
    fn default() -> Self { Self { day: None, value: None } }
}

impl<T> DayCache<T> {
    /// Returns true when the cache was cleared.
    pub fn invalidate_if_date_changed(&mut self, today: NaiveDate) -> bool {
        let changed = self.day.map_or(false, |d| d != today);
        if changed {
            self.value = None;
        }
        self.day = Some(today);
        changed
    }

    pub fn get(&self) -> Option<&T> { self.value.as_ref() }
    pub fn set(&mut self, v: T) { self.value = Some(v); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ms_to_utc, Outcome, Side};

    fn realized(symbol: &str, pnl: f64, ms: i64) -> LedgerEntry {
        LedgerEntry {
            symbol: symbol.into(),
            side: Side::Sell,
            qty: 1.0,
            price: 1.0,
            quote_total: 1.0,
            realized_pnl: Some(pnl),
            realized_pnl_pct: Some(0.0),
            outcome: Outcome::from_pnl(pnl),
            description: String::new(),
            time: ms_to_utc(ms),
        }
    }

    fn report(strategy: &str, symbol: &str, ledger: Vec<LedgerEntry>) -> InstrumentReport {
        InstrumentReport {
            strategy: strategy.into(),
            symbol: symbol.into(),
            price: 2.0,
            ledger,
            open_position: None,
            free_balance: 5.0,
            open_orders: 0,
            daily_vs_open: None,
        }
    }

    #[test]
    fn aggregates_per_strategy_and_day() {
        const DAY: i64 = 86_400_000;
        let reports = vec![
            report("A", "AUSDT", vec![realized("AUSDT", 3.0, 0), realized("AUSDT", -1.0, DAY)]),
            report("B", "BUSDT", vec![realized("BUSDT", 0.0, DAY)]),
        ];
        let o = Overview::build(&reports, vec![], 7.0);

        assert_eq!(o.strategies[0], StrategySummary { name: "A".into(), wins: 1, losses: 1, realized: 2.0 });
        assert_eq!(o.strategies[1].losses, 1);
        assert_eq!(o.realized_total, 2.0);
        assert!((o.realized_mean - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(o.holdings_value, 20.0);

        let d2 = ms_to_utc(DAY).date_naive();
        assert_eq!(o.realized_on(d2), -1.0);
        assert_eq!(o.by_day[&d2].cumulative, 2.0);
        assert_eq!(o.by_symbol["AUSDT"], 2.0);
    }

    #[test]
    fn day_cache_clears_on_rollover() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let d2 = d1.succ_opt().unwrap();
        let mut c: DayCache<u32> = DayCache::default();
        assert!(!c.invalidate_if_date_changed(d1));
        c.set(7);
        assert!(!c.invalidate_if_date_changed(d1));
        assert_eq!(c.get(), Some(&7));
        assert!(c.invalidate_if_date_changed(d2));
        assert_eq!(c.get(), None);
    }
}
