// ===============================
// src/feed.rs
// ===============================
//
// Market-data ingress:
// - run       : venue L2 stream (snapshot + deltas) -> order book -> TopOfBook bus
// - run_mock  : random-walk L2 generator driving the same pipeline (paper/dev)
//
// The ingress task is the sole writer of the order book. Consumers only ever
// see TopOfBook snapshots published on a bounded broadcast bus; a lagging
// consumer loses the oldest snapshots (latest-wins) and counts the drops.
//
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;

use crate::book::{BookError, OrderBook};
use crate::domain::TopOfBook;
use crate::metrics::{BOOK_UPDATES, CROSSED_REJECTS, PARSE_ERRORS, SEQ_GAPS, WS_CONNECTED, WS_RECONNECTS};
use crate::venue::{self, FeedMessage, SubscribeRequest};

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub ws_url: String,
    pub symbol: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub heartbeat_timeout: Duration,
    pub max_reconnect_attempts: u32,
}

/// Connection lifecycle, mostly for logging and health introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Authenticating,
    Subscribed,
    Streaming,
}

/// What a single inbound frame did to the book.
#[derive(Debug, PartialEq, Eq)]
enum ApplyOutcome {
    /// At least one level applied; publish a fresh TopOfBook.
    Publish,
    /// Sequence gap: re-subscribe and wait for a snapshot.
    NeedResync,
    /// Heartbeat, ack, stale or dropped frame.
    Ignored,
}

fn apply_message(
    msg: FeedMessage,
    book: &mut OrderBook,
    awaiting_snapshot: &mut bool,
    symbol: &str,
) -> ApplyOutcome {
    match msg {
        FeedMessage::Snapshot { symbol: s, sequence, bids, asks } => {
            if s != symbol {
                return ApplyOutcome::Ignored;
            }
            let mut parsed_bids = Vec::with_capacity(bids.len());
            for level in &bids {
                match venue::parse_level(level) {
                    Some(l) => parsed_bids.push(l),
                    None => PARSE_ERRORS.inc(),
                }
            }
            let mut parsed_asks = Vec::with_capacity(asks.len());
            for level in &asks {
                match venue::parse_level(level) {
                    Some(l) => parsed_asks.push(l),
                    None => PARSE_ERRORS.inc(),
                }
            }
            book.apply_snapshot(&parsed_bids, &parsed_asks, Some(sequence));
            *awaiting_snapshot = false;
            BOOK_UPDATES.inc();
            ApplyOutcome::Publish
        }
        FeedMessage::L2Update { symbol: s, sequence, changes } => {
            if s != symbol || *awaiting_snapshot {
                return ApplyOutcome::Ignored;
            }
            let mut applied = 0usize;
            for change in &changes {
                let Some((side, price, qty)) = venue::parse_change(change) else {
                    PARSE_ERRORS.inc();
                    continue;
                };
                match book.apply_delta(side, price, qty, Some(sequence)) {
                    Ok(crate::book::Applied::Update) => applied += 1,
                    Ok(crate::book::Applied::Stale) => {}
                    Err(BookError::SequenceGap { expected, got }) => {
                        SEQ_GAPS.inc();
                        warn!(expected, got, "market data sequence gap, resyncing");
                        *awaiting_snapshot = true;
                        return ApplyOutcome::NeedResync;
                    }
                    Err(BookError::Crossed { .. }) => {
                        CROSSED_REJECTS.inc();
                    }
                    Err(BookError::InvalidLevel { .. }) => PARSE_ERRORS.inc(),
                }
            }
            if applied > 0 {
                BOOK_UPDATES.inc();
                ApplyOutcome::Publish
            } else {
                ApplyOutcome::Ignored
            }
        }
        FeedMessage::Subscriptions { .. } | FeedMessage::Heartbeat { .. } => ApplyOutcome::Ignored,
        FeedMessage::Error { message } => {
            warn!(%message, "venue feed error frame");
            ApplyOutcome::Ignored
        }
    }
}

fn subscribe_frame(cfg: &FeedConfig) -> (String, ConnState) {
    let req = SubscribeRequest::level2(&cfg.symbol);
    match (&cfg.api_key, &cfg.api_secret) {
        (Some(key), Some(secret)) => {
            let signed = req.signed(key, secret);
            (serde_json::to_string(&signed).unwrap_or_default(), ConnState::Authenticating)
        }
        _ => (serde_json::to_string(&req).unwrap_or_default(), ConnState::Subscribed),
    }
}

/// Ingress worker: maintain the L2 subscription, apply frames to the book,
/// publish a TopOfBook per applied update. Reconnects with capped exponential
/// backoff until told to stop or the attempt budget runs out.
pub async fn run(
    cfg: FeedConfig,
    top_tx: broadcast::Sender<TopOfBook>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut book = OrderBook::new(cfg.symbol.clone());
    let mut attempt: u32 = 0;

    'reconnect: loop {
        if *stop_rx.borrow() {
            break;
        }

        let url = match Url::parse(&cfg.ws_url) {
            Ok(u) => u,
            Err(e) => {
                error!(?e, url = %cfg.ws_url, "bad market data url");
                return;
            }
        };

        let mut state = ConnState::Connecting;
        info!(url = %cfg.ws_url, symbol = %cfg.symbol, "connecting market data stream");
        match connect_async(url.as_str()).await {
            Ok((mut ws, _resp)) => {
                let (frame, after_open) = subscribe_frame(&cfg);
                state = after_open;
                if let Err(e) = ws.send(Message::Text(frame)).await {
                    error!(?e, "subscribe send failed");
                } else {
                    WS_CONNECTED.set(1);
                    attempt = 0;
                    let mut awaiting_snapshot = true;

                    loop {
                        tokio::select! {
                            _ = stop_rx.changed() => {
                                if *stop_rx.borrow() {
                                    let _ = ws.close(None).await;
                                    WS_CONNECTED.set(0);
                                    info!("market data stream stopped");
                                    break 'reconnect;
                                }
                            }
                            frame = timeout(cfg.heartbeat_timeout, ws.next()) => {
                                match frame {
                                    Err(_) => {
                                        warn!(timeout_s = cfg.heartbeat_timeout.as_secs(), "heartbeat timeout, dropping connection");
                                        break;
                                    }
                                    Ok(None) => {
                                        warn!("market data stream closed by peer");
                                        break;
                                    }
                                    Ok(Some(Err(e))) => {
                                        error!(?e, "market data read error");
                                        break;
                                    }
                                    Ok(Some(Ok(m))) if m.is_text() => {
                                        let txt = m.into_text().unwrap_or_default();
                                        let msg = match serde_json::from_str::<FeedMessage>(&txt) {
                                            Ok(msg) => msg,
                                            Err(_) => {
                                                PARSE_ERRORS.inc();
                                                continue;
                                            }
                                        };
                                        if state != ConnState::Streaming {
                                            if let FeedMessage::Subscriptions { channels } = &msg {
                                                state = ConnState::Streaming;
                                                info!(?channels, "market data subscription acknowledged");
                                                continue;
                                            }
                                        }
                                        match apply_message(msg, &mut book, &mut awaiting_snapshot, &cfg.symbol) {
                                            ApplyOutcome::Publish => {
                                                let _ = top_tx.send(book.snapshot_top());
                                            }
                                            ApplyOutcome::NeedResync => {
                                                let (frame, _) = subscribe_frame(&cfg);
                                                if ws.send(Message::Text(frame)).await.is_err() {
                                                    break;
                                                }
                                            }
                                            ApplyOutcome::Ignored => {}
                                        }
                                    }
                                    Ok(Some(Ok(_))) => {
                                        // binary/ping/pong frames handled by the transport
                                    }
                                }
                            }
                        }
                    }
                    WS_CONNECTED.set(0);
                }
            }
            Err(e) => {
                error!(?e, state = ?state, "market data connect failed");
            }
        }

        // Exponential backoff + jitter, bounded attempts (explicit stop wins).
        attempt = attempt.saturating_add(1);
        if attempt > cfg.max_reconnect_attempts {
            error!(attempt, "market data reconnect budget exhausted");
            break;
        }
        WS_RECONNECTS.inc();
        let shift = attempt.min(6);
        let base_ms = 500u64.saturating_mul(1u64 << shift);
        let jitter = rand::thread_rng().gen_range(0..=250);
        tokio::select! {
            _ = sleep(Duration::from_millis(base_ms + jitter)) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Random-walk L2 generator for paper/dev runs (~200 updates/s). Drives the
/// same book and bus as the live feed.
pub async fn run_mock(
    symbol: String,
    top_tx: broadcast::Sender<TopOfBook>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut book = OrderBook::new(symbol);
    let mut mid = dec!(100.00);
    let tick = dec!(0.01);
    let mut seq: u64 = 0;

    // Seed both sides so the first snapshot is valid.
    book.apply_snapshot(
        &[(mid - tick, dec!(1)), (mid - tick * dec!(2), dec!(2))],
        &[(mid + tick, dec!(1)), (mid + tick * dec!(2), dec!(2))],
        Some(seq),
    );
    let _ = top_tx.send(book.snapshot_top());

    loop {
        if *stop_rx.borrow() {
            break;
        }
        // do not hold ThreadRng across an await
        let step: i64 = rand::thread_rng().gen_range(-3..=3);
        let qty_step: i64 = rand::thread_rng().gen_range(1..=5);
        mid = (mid + Decimal::from(step) * tick).max(dec!(50.00));
        seq += 1;

        book.apply_snapshot(
            &[(mid - tick, Decimal::from(qty_step)), (mid - tick * dec!(2), dec!(2))],
            &[(mid + tick, Decimal::from(qty_step)), (mid + tick * dec!(2), dec!(2))],
            Some(seq),
        );
        BOOK_UPDATES.inc();
        let _ = top_tx.send(book.snapshot_top());

        tokio::select! {
            _ = sleep(Duration::from_millis(5)) => {}
            _ = stop_rx.changed() => {}
        }
    }
}
