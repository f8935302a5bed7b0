// ===============================
// src/quoter.rs (quoting/execution worker)
// ===============================
//
// Sole consumer of the top-of-book bus and sole caller of the order
// manager's submit/cancel. Quotes on every fresh snapshot and on a steady
// cadence tick; the cadence tick also drives the stale-order sweep. Falling
// behind the bus is fine: the oldest snapshots are dropped (latest-wins) and
// counted.
//
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::domain::{Side, TopOfBook};
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::metrics::{SNAPSHOT_DROPS, SPREAD_BPS};
use crate::orders::OrderManager;
use crate::strategy::{compute_intent, ladder};

pub async fn run(
    mut top_rx: broadcast::Receiver<TopOfBook>,
    om: Arc<OrderManager>,
    ledger: Arc<Ledger>,
    params: StrategyConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut cadence = interval(Duration::from_millis(params.order_refresh_ms.max(1)));
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut latest: Option<TopOfBook> = None;

    info!(refresh_ms = params.order_refresh_ms, levels = params.num_levels, "quoting worker started");

    loop {
        tokio::select! {
            r = top_rx.recv() => match r {
                Ok(top) => {
                    if top.is_valid {
                        ledger.mark_to_market(top.mid());
                        SPREAD_BPS.set(top.spread_bps.to_f64().unwrap_or(0.0));
                    }
                    om.observe_top(top);
                    latest = Some(top);
                    quote(&om, &ledger, &top, &params).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    SNAPSHOT_DROPS.inc_by(n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("top-of-book bus closed, quoting worker exiting");
                    break;
                }
            },
            _ = cadence.tick() => {
                om.sweep_stale().await;
                if let Some(top) = latest {
                    quote(&om, &ledger, &top, &params).await;
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn quote(om: &OrderManager, ledger: &Ledger, top: &TopOfBook, params: &StrategyConfig) {
    let intent = compute_intent(top, ledger.net_position(), params);
    if intent.is_empty() {
        return;
    }

    if intent.place_bid {
        for (price, qty) in ladder(Side::Buy, intent.bid_price, intent.bid_qty, intent.num_levels, params.tick_size) {
            submit_quiet(om, Side::Buy, price, qty).await;
        }
    }
    if intent.place_ask {
        for (price, qty) in ladder(Side::Sell, intent.ask_price, intent.ask_qty, intent.num_levels, params.tick_size) {
            submit_quiet(om, Side::Sell, price, qty).await;
        }
    }
}

/// Risk and validation rejects are routine at this call rate; they are
/// already counted, so keep the log noise at debug.
async fn submit_quiet(om: &OrderManager, side: Side, price: Decimal, qty: Decimal) {
    match om.submit(side, price, qty).await {
        Ok(_) => {}
        Err(EngineError::Validation(reason)) => {
            debug!(side = side.as_str(), %price, %qty, %reason, "quote suppressed");
        }
        Err(e) => {
            debug!(side = side.as_str(), %price, %qty, error = %e, "quote submission failed");
        }
    }
}
