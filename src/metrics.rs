// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Refresh loop --------
pub static REFRESH_CYCLES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("refresh_cycles_total", "completed refresh cycles").unwrap());

pub static GATEWAY_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_errors_total", "gateway call failures (labels: op, symbol)"),
        &["op", "symbol"],
    )
    .unwrap()
});

pub static FILLS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("fills_replayed", "fills replayed in the last cycle"), &["symbol"]).unwrap()
});

// -------- PnL --------
pub static PNL_REALIZED: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("pnl_realized_quote", "realized PnL from full fill history"), &["symbol"]).unwrap()
});

pub static PNL_UNREALIZED: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("pnl_unrealized_quote", "unrealized PnL of the open position"), &["symbol"]).unwrap()
});

pub static POSITION_QTY: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("position_net_qty", "net qty (negative = short)"), &["symbol"]).unwrap()
});

pub static DAILY_PNL: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("daily_pnl_quote", "today's PnL net of transfers, in quote currency"),
        &["asset"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_VENUE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_venue_mode", "venue mode (label: mode)"), &["mode"]).unwrap()
});

pub static CONFIG_STRATEGY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_strategy", "tracked strategies (labels: strategy, symbol)"),
        &["strategy", "symbol"],
    )
    .unwrap()
});

fn register<M: prometheus::core::Collector + Clone + 'static>(name: &str, m: &Lazy<M>) {
    if let Err(e) = REGISTRY.register(Box::new((**m).clone())) {
        // AlreadyReg is expected when init() runs twice (tests)
        tracing::debug!(metric = name, error = %e, "metric not registered");
    }
}

pub fn init() {
    register("refresh_cycles_total", &REFRESH_CYCLES);
    register("gateway_errors_total", &GATEWAY_ERRORS);
    register("fills_replayed", &FILLS);
    register("pnl_realized_quote", &PNL_REALIZED);
    register("pnl_unrealized_quote", &PNL_UNREALIZED);
    register("position_net_qty", &POSITION_QTY);
    register("daily_pnl_quote", &DAILY_PNL);
    register("config_venue_mode", &CONFIG_VENUE_MODE);
    register("config_strategy", &CONFIG_STRATEGY);
}

/// Prometheus text exposition of everything in `REGISTRY`.
pub fn encode_metrics() -> Vec<u8> {
    let mut out = Vec::new();
    match TextEncoder::new().encode(&REGISTRY.gather(), &mut out) {
        Ok(()) if !out.is_empty() => out,
        _ => b"# no metrics\n".to_vec(),
    }
}

/// Path of the request line, e.g. `GET /metrics HTTP/1.1` -> `/metrics`.
fn request_path(req: &[u8]) -> &str {
    let line = std::str::from_utf8(req).unwrap_or("").lines().next().unwrap_or("");
    line.split_whitespace().nth(1).unwrap_or("/")
}

fn respond(stream: &mut TcpStream, status: &str, body: &[u8]) -> std::io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)?;
    stream.flush()
}

fn handle_client(mut stream: TcpStream) {
    let mut req = [0u8; 1024];
    let n = stream.read(&mut req).unwrap_or(0);
    let res = match request_path(&req[..n]) {
        "/" | "/metrics" => respond(&mut stream, "200 OK", &encode_metrics()),
        "/healthz" => respond(&mut stream, "200 OK", b"ok\n"),
        _ => respond(&mut stream, "404 Not Found", b"not found\n"),
    };
    if let Err(e) = res {
        tracing::debug!(error = %e, "metrics client write failed");
    }
}

/// Bind first so a busy port is reported at startup, then serve from an OS thread.
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    tracing::info!(%addr, "metrics listening (/metrics, /healthz)");
    thread::Builder::new().name("metrics-http".into()).spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(error = %e, "metrics accept error"),
            }
        }
    })?;
    Ok(())
}
