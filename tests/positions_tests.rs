use pnl_dash_rust::domain::{Fill, Outcome, Side};
use pnl_dash_rust::positions::reconstruct;

fn buy(px: f64, qty: f64, t: i64) -> Fill { Fill::new("ZUSDT", Side::Buy, px, qty, t) }
fn sell(px: f64, qty: f64, t: i64) -> Fill { Fill::new("ZUSDT", Side::Sell, px, qty, t) }

#[test]
fn buys_only_never_realize() {
    let fills: Vec<Fill> = (0..20).map(|i| buy(1.0 + i as f64 * 0.1, 0.5 + i as f64, i)).collect();
    let total: f64 = fills.iter().map(|f| f.qty).sum();
    let r = reconstruct(&fills, 2.0, "USDT").unwrap();

    assert!(r.ledger.iter().all(|e| e.outcome == Outcome::Opening && e.realized_pnl.is_none()));
    assert!((r.final_state.net_qty - total).abs() < 1e-9);
    assert_eq!(r.realized_total(), 0.0);
}

#[test]
fn round_trip_realizes_price_difference() {
    for (p, p2, q) in [(1.0, 1.5, 10.0), (3.2, 2.9, 4.0), (0.0041, 0.0043, 25_000.0)] {
        let r = reconstruct(&[buy(p, q, 1), sell(p2, q, 2)], p2, "USDT").unwrap();
        let pnl = r.ledger[1].realized_pnl.unwrap();
        assert!((pnl - (p2 - p) * q).abs() < 1e-9, "{p} -> {p2}");
        assert!(r.open_position.is_none());
    }
}

#[test]
fn two_buys_weight_the_average() {
    let r = reconstruct(&[buy(2.0, 3.0, 1), buy(5.0, 1.0, 2)], 4.0, "USDT").unwrap();
    let avg: f64 = (3.0 * 2.0 + 1.0 * 5.0) / 4.0;
    assert!((r.final_state.avg_cost - avg).abs() < 1e-12);
    let p = r.open_position.unwrap();
    assert!((p.unrealized_pnl - (4.0 - avg) * 4.0).abs() < 1e-9);
}

#[test]
fn dust_leaves_no_open_position() {
    let r = reconstruct(&[buy(1.0, 10.0, 1), sell(1.1, 9.999_995, 2)], 1.2, "USDT").unwrap();
    assert!(r.open_position.is_none());
}

#[test]
fn worked_example() {
    let fills = [sell(1.50, 8.0, 3), buy(1.00, 10.0, 1), buy(1.20, 5.0, 2)];
    let r = reconstruct(&fills, 1.30, "USDT").unwrap();

    assert_eq!(r.ledger.len(), 3);
    assert_eq!(r.ledger[0].description, "Buy 10.00 Z @ $1.00");
    assert!((r.ledger[1].price - 1.20).abs() < 1e-12);
    let realized = r.ledger[2].realized_pnl.unwrap();
    assert!((realized - 3.4667).abs() < 1e-3);
    assert_eq!(r.ledger[2].outcome, Outcome::Profit);

    let p = r.open_position.unwrap();
    assert!((p.qty - 7.0).abs() < 1e-9);
    assert!((p.avg_cost - 16.0 / 15.0).abs() < 1e-9);
    assert!((p.unrealized_pnl - 1.6333).abs() < 1e-3);
}
