// ===============================
// src/engine.rs (supervisor)
// ===============================
//
// Owns every component and the worker lifecycle. Ownership is a strict tree;
// components reference each other only through narrow capabilities (the order
// manager can ask risk `may_place`, risk can read the ledger). Stop is
// cooperative: a watch flag fans out to the workers, which are then joined
// with a bounded timeout and detached with a warning if they lag.
//
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration};
use tracing::{error, info, warn};

use chrono::Utc;

use crate::cache::{FileOrderCache, OrderCache};
use crate::config::{Config, TradeMode};
use crate::domain::{ExchangeEvent, Fill, LogRecord, OrderStatus, TopOfBook};
use crate::error::EngineError;
use crate::feed::{self, FeedConfig};
use crate::gateway::{ExchangeClient, PaperExchange, RestExchange};
use crate::ledger::Ledger;
use crate::metrics::{NET_POSITION, PNL_REALIZED, PNL_UNREALIZED};
use crate::orders::{OrderCfg, OrderManager};
use crate::quoter;
use crate::recorder::{self, LogPaths};
use crate::risk::{self, RiskSupervisor};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Engine {
    cfg: Config,
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub async fn run(self) -> Result<(), EngineError> {
        let cfg = self.cfg;

        // ---- Shared state ----
        let ledger = Arc::new(Ledger::new());
        let risk = Arc::new(RiskSupervisor::new(cfg.risk.clone()));

        // ---- Buses ----
        let (top_tx, _top_rx) = broadcast::channel::<TopOfBook>(64);
        let (event_tx, mut event_rx) = mpsc::channel::<ExchangeEvent>(4096);
        let (rec_tx, rec_rx) = mpsc::channel::<LogRecord>(8192);
        let (stop_tx, stop_rx) = watch::channel(false);

        // ---- Collaborators ----
        let cache: Option<Arc<dyn OrderCache>> = match &cfg.system.cache_path {
            Some(path) => Some(Arc::new(FileOrderCache::open(path)?)),
            None => None,
        };

        let exchange: Arc<dyn ExchangeClient> = match cfg.mode {
            TradeMode::Paper => Arc::new(PaperExchange::new(
                ledger.clone(),
                event_tx.clone(),
                cfg.strategy.inventory_neutral_band,
            )),
            TradeMode::Testnet | TradeMode::Live => Arc::new(RestExchange::new(
                cfg.system.rest_url.clone(),
                cfg.system.api_key.clone().unwrap_or_default(),
                cfg.system.api_secret.clone().unwrap_or_default(),
                Duration::from_millis(cfg.system.request_timeout_ms),
            )?),
        };
        let poll_exchange = exchange.clone();
        let poll_event_tx = event_tx.clone();
        drop(event_tx); // venues and the poller hold the remaining senders

        let order_cfg = OrderCfg {
            symbol: cfg.symbol.symbol.clone(),
            tick_size: cfg.strategy.tick_size,
            min_qty: cfg.strategy.min_qty,
            max_qty: cfg.strategy.max_qty,
            price_band_pct: cfg.strategy.price_band_pct,
            order_timeout: Duration::from_secs(cfg.strategy.order_timeout_s),
            cancel_grace: Duration::from_millis(cfg.strategy.cancel_grace_ms),
            max_retries: cfg.system.max_retries,
        };
        let om = Arc::new(OrderManager::new(
            order_cfg,
            risk.clone(),
            ledger.clone(),
            exchange,
            cache,
            Some(rec_tx.clone()),
        ));
        om.recover();

        // ---- Workers ----
        let log_streams = recorder::open(&LogPaths {
            trades: cfg.system.trades_log.clone(),
            pnl: cfg.system.pnl_log.clone(),
            summary: cfg.system.summary_log.clone(),
        })
        .await?;
        let recorder_handle = tokio::spawn(recorder::run(rec_rx, log_streams));

        let feed_handle: JoinHandle<()> = match cfg.mode {
            TradeMode::Paper => tokio::spawn(feed::run_mock(
                cfg.symbol.symbol.clone(),
                top_tx.clone(),
                stop_rx.clone(),
            )),
            TradeMode::Testnet | TradeMode::Live => tokio::spawn(feed::run(
                FeedConfig {
                    ws_url: cfg.system.ws_url.clone(),
                    symbol: cfg.symbol.symbol.clone(),
                    api_key: cfg.system.api_key.clone(),
                    api_secret: cfg.system.api_secret.clone(),
                    heartbeat_timeout: Duration::from_secs(cfg.system.heartbeat_timeout_s),
                    max_reconnect_attempts: cfg.system.max_reconnect_attempts,
                },
                top_tx.clone(),
                stop_rx.clone(),
            )),
        };

        let dispatch_om = om.clone();
        let mut dispatch_stop = stop_rx.clone();
        let dispatch_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    ev = event_rx.recv() => match ev {
                        Some(ev) => dispatch_om.on_exchange_event(ev),
                        None => break,
                    },
                    _ = dispatch_stop.changed() => {
                        if *dispatch_stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let quoter_handle = tokio::spawn(quoter::run(
            top_tx.subscribe(),
            om.clone(),
            ledger.clone(),
            cfg.strategy.clone(),
            stop_rx.clone(),
        ));

        let risk_handle = tokio::spawn(risk::run(risk.clone(), ledger.clone(), stop_rx.clone()));

        // The REST venue has no push channel for executions, so open orders
        // are reconciled by polling the collaborator's status call. The paper
        // venue pushes events directly and needs no poller.
        let poller_handle: Option<JoinHandle<()>> = match cfg.mode {
            TradeMode::Paper => {
                drop(poll_event_tx);
                None
            }
            TradeMode::Testnet | TradeMode::Live => {
                let om = om.clone();
                let mut stop = stop_rx.clone();
                Some(tokio::spawn(async move {
                    let mut tick = interval(Duration::from_millis(500));
                    loop {
                        tokio::select! {
                            _ = tick.tick() => {
                                for order in om.open_orders() {
                                    if order.exchange_id.is_none() {
                                        continue;
                                    }
                                    let event = match poll_exchange.status(&order.client_order_id).await {
                                        Ok(Some(OrderStatus::Filled)) => Some(ExchangeEvent::Fill(Fill {
                                            client_order_id: order.client_order_id.clone(),
                                            side: order.side,
                                            qty: order.remaining_qty(),
                                            price: order.price,
                                            ts: Utc::now(),
                                        })),
                                        Ok(Some(OrderStatus::Canceled)) => Some(ExchangeEvent::CancelAck {
                                            client_order_id: order.client_order_id.clone(),
                                        }),
                                        Ok(Some(OrderStatus::Rejected)) => Some(ExchangeEvent::Reject {
                                            client_order_id: order.client_order_id.clone(),
                                            reason: "rejected on status poll".to_string(),
                                        }),
                                        _ => None,
                                    };
                                    if let Some(ev) = event {
                                        let _ = poll_event_tx.send(ev).await;
                                    }
                                }
                            }
                            _ = stop.changed() => {
                                if *stop.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                }))
            }
        };

        info!(
            mode = cfg.mode.as_str(),
            venue = om.venue_name(),
            symbol = %cfg.symbol.symbol,
            "engine started, all workers running"
        );

        // ---- Metrics / heartbeat loop; first interrupt begins shutdown ----
        let mut tick = interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if risk.breaker_active() {
                        error!(reason = %risk.breaker_reason(), "circuit breaker active, halting session");
                        break;
                    }
                    let st = ledger.snapshot();
                    NET_POSITION.set(st.net_position.to_f64().unwrap_or(0.0));
                    PNL_REALIZED.set(st.realized_pnl.to_f64().unwrap_or(0.0));
                    PNL_UNREALIZED.set(st.unrealized_pnl.to_f64().unwrap_or(0.0));
                    info!(
                        position = %st.net_position,
                        realized_pnl = %st.realized_pnl,
                        unrealized_pnl = %st.unrealized_pnl,
                        daily_pnl = %risk.daily_pnl(),
                        open_orders = om.open_order_count(),
                        breaker = risk.breaker_active(),
                        "heartbeat"
                    );
                }
            }
        }

        // A second interrupt skips the graceful path entirely.
        tokio::spawn(async {
            let _ = signal::ctrl_c().await;
            warn!("second interrupt, forcing exit");
            std::process::exit(130);
        });

        let _ = stop_tx.send(true);

        let mut workers: Vec<(&str, JoinHandle<()>)> = vec![
            ("feed", feed_handle),
            ("quoter", quoter_handle),
            ("risk", risk_handle),
            ("dispatch", dispatch_handle),
        ];
        if let Some(h) = poller_handle {
            workers.push(("status-poll", h));
        }
        for (name, handle) in workers {
            if timeout(JOIN_TIMEOUT, handle).await.is_err() {
                warn!(worker = name, "worker did not stop in time, detaching");
            }
        }

        // ---- Final session summary, then let the recorder drain ----
        let summary = om.session_summary();
        info!(
            trades = summary.buy_trades + summary.sell_trades,
            realized_pnl = %summary.realized_pnl,
            final_position = %summary.final_position,
            "session complete"
        );
        let _ = rec_tx.send(LogRecord::Summary(summary)).await;
        drop(rec_tx);
        drop(om);
        if timeout(JOIN_TIMEOUT, recorder_handle).await.is_err() {
            warn!("recorder did not flush in time");
        }

        Ok(())
    }
}
