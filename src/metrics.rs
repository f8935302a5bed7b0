// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market data --------
pub static BOOK_UPDATES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("book_updates_total", "applied order book updates").unwrap());

pub static PARSE_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("md_parse_errors_total", "malformed market data frames/levels").unwrap());

pub static SEQ_GAPS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("md_sequence_gaps_total", "sequence gaps that forced a resync").unwrap());

pub static CROSSED_REJECTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("md_crossed_rejects_total", "crossing updates rejected by the book").unwrap());

pub static SNAPSHOT_DROPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "top_snapshot_drops_total",
        "top-of-book snapshots overwritten before the quoting loop consumed them",
    )
    .unwrap()
});

pub static WS_CONNECTED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("md_ws_connected", "1 if the market data stream is up").unwrap());

pub static WS_RECONNECTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("md_ws_reconnects_total", "market data reconnect attempts").unwrap());

// -------- Orders --------
pub static ORDERS_SUBMITTED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_submitted_total", "orders sent to the venue").unwrap());

pub static ORDERS_FILLED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_filled_total", "orders fully filled").unwrap());

pub static ORDERS_CANCELED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_canceled_total", "orders canceled").unwrap());

pub static ORDERS_EXPIRED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("orders_expired_total", "orders expired locally without an ack").unwrap());

pub static ORDERS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_rejected_total", "rejected orders (label: source)"),
        &["source"],
    )
    .unwrap()
});

pub static FILLS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("fills_total", "fill events applied to the ledger").unwrap());

// -------- Risk --------
pub static RISK_REJECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("risk_rejects_total", "pre-trade rejections (label: reason)"),
        &["reason"],
    )
    .unwrap()
});

pub static RISK_WARNINGS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("risk_warnings_total", "non-rejecting risk warnings (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static CIRCUIT_BREAKER: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("circuit_breaker_active", "1 while the circuit breaker is latched").unwrap());

// -------- Inventory & PnL --------
pub static NET_POSITION: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("net_position", "signed base-asset inventory").unwrap());

pub static PNL_REALIZED: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_realized", "realized PnL (quote asset)").unwrap());

pub static PNL_UNREALIZED: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("pnl_unrealized", "unrealized PnL (quote asset)").unwrap());

pub static SPREAD_BPS: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("spread_bps", "last observed top-of-book spread (bps)").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(BOOK_UPDATES.clone())),
        REGISTRY.register(Box::new(PARSE_ERRORS.clone())),
        REGISTRY.register(Box::new(SEQ_GAPS.clone())),
        REGISTRY.register(Box::new(CROSSED_REJECTS.clone())),
        REGISTRY.register(Box::new(SNAPSHOT_DROPS.clone())),
        REGISTRY.register(Box::new(WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(ORDERS_SUBMITTED.clone())),
        REGISTRY.register(Box::new(ORDERS_FILLED.clone())),
        REGISTRY.register(Box::new(ORDERS_CANCELED.clone())),
        REGISTRY.register(Box::new(ORDERS_EXPIRED.clone())),
        REGISTRY.register(Box::new(ORDERS_REJECTED.clone())),
        REGISTRY.register(Box::new(FILLS.clone())),
        REGISTRY.register(Box::new(RISK_REJECTS.clone())),
        REGISTRY.register(Box::new(RISK_WARNINGS.clone())),
        REGISTRY.register(Box::new(CIRCUIT_BREAKER.clone())),
        REGISTRY.register(Box::new(NET_POSITION.clone())),
        REGISTRY.register(Box::new(PNL_REALIZED.clone())),
        REGISTRY.register(Box::new(PNL_UNREALIZED.clone())),
        REGISTRY.register(Box::new(SPREAD_BPS.clone())),
    ] {
        let _ = m;
    }
}

/// Answer one scrape. Every request gets the full registry dump, so the
/// request line and headers are drained without being parsed.
fn serve_scrape(mut stream: TcpStream) {
    let _ = stream.read(&mut [0u8; 1024]);

    let encoder = TextEncoder::new();
    let mut response = Vec::with_capacity(4096);
    let mut dump = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut dump).is_err() {
        dump = b"# metrics encoding failed\n".to_vec();
    }

    response.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
    response.extend_from_slice(format!("Content-Type: {}\r\n", encoder.format_type()).as_bytes());
    response.extend_from_slice(format!("Content-Length: {}\r\n\r\n", dump.len()).as_bytes());
    response.extend_from_slice(&dump);

    if let Err(e) = stream.write_all(&response).and_then(|_| stream.flush()) {
        tracing::debug!(?e, "metrics scrape response failed");
    }
}

// Exporter runs on a dedicated OS thread so scrapes never touch the runtime.
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        tracing::info!(%addr, "metrics exporter listening");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => serve_scrape(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}
