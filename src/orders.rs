// ===============================
// src/orders.rs
// ===============================
//
// Order manager: open-order table, client id allocation, the order state
// machine, and fill accounting. Submissions pass local validation and the
// risk gate before anything reaches the order-entry collaborator; fills flow
// through here into the ledger and on to risk.
//
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap as HashMap;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::cache::OrderCache;
use crate::domain::{
    ExchangeEvent, Fill, LogRecord, Order, OrderStatus, PnlRecord, SessionSummary, Side, TopOfBook,
    TradeRecord,
};
use crate::error::EngineError;
use crate::gateway::ExchangeClient;
use crate::ledger::Ledger;
use crate::metrics::{
    FILLS, ORDERS_CANCELED, ORDERS_EXPIRED, ORDERS_FILLED, ORDERS_REJECTED, ORDERS_SUBMITTED,
};
use crate::risk::RiskSupervisor;
use crate::venue::timestamp_ms;

#[derive(Clone, Debug)]
pub struct OrderCfg {
    pub symbol: String,
    pub tick_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    /// Sanity band around the last mid, as a fraction.
    pub price_band_pct: Decimal,
    pub order_timeout: Duration,
    pub cancel_grace: Duration,
    pub max_retries: u32,
}

#[derive(Default)]
struct SessionCounters {
    placed: AtomicU64,
    filled: AtomicU64,
    canceled: AtomicU64,
    rejected: AtomicU64,
}

pub struct OrderManager {
    cfg: OrderCfg,
    table: Mutex<HashMap<String, Order>>,
    next_id: AtomicU64,
    counters: SessionCounters,
    risk: Arc<RiskSupervisor>,
    ledger: Arc<Ledger>,
    exchange: Arc<dyn ExchangeClient>,
    cache: Option<Arc<dyn OrderCache>>,
    rec_tx: Option<mpsc::Sender<LogRecord>>,
    last_top: Mutex<Option<TopOfBook>>,
}

impl OrderManager {
    pub fn new(
        cfg: OrderCfg,
        risk: Arc<RiskSupervisor>,
        ledger: Arc<Ledger>,
        exchange: Arc<dyn ExchangeClient>,
        cache: Option<Arc<dyn OrderCache>>,
        rec_tx: Option<mpsc::Sender<LogRecord>>,
    ) -> Self {
        Self {
            cfg,
            table: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: SessionCounters::default(),
            risk,
            ledger,
            exchange,
            cache,
            rec_tx,
            last_top: Mutex::new(None),
        }
    }

    /// Reload non-terminal orders left behind by a previous run.
    pub fn recover(&self) {
        let Some(cache) = &self.cache else { return };
        let mut table = self.table.lock().expect("order table lock");
        let mut restored = 0usize;
        for order in cache.load_all() {
            if !order.status.is_terminal() {
                table.insert(order.client_order_id.clone(), order);
                restored += 1;
            }
        }
        if restored > 0 {
            info!(restored, "recovered open orders from cache");
        }
    }

    /// Latest top-of-book, used for the price sanity band and the session
    /// spread range.
    pub fn observe_top(&self, top: TopOfBook) {
        *self.last_top.lock().expect("top lock") = Some(top);
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.table.lock().expect("order table lock").values().cloned().collect()
    }

    pub fn open_order_count(&self) -> usize {
        self.table.lock().expect("order table lock").len()
    }

    pub fn venue_name(&self) -> &str {
        self.exchange.name()
    }

    fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("MM-{}-{}", timestamp_ms(), n)
    }

    /// Validate, consult risk, register and forward one order. Returns the
    /// client order id on success.
    pub async fn submit(&self, side: Side, price: Decimal, qty: Decimal) -> Result<String, EngineError> {
        if let Err(e) = self.validate(price, qty) {
            ORDERS_REJECTED.with_label_values(&["validation"]).inc();
            return Err(e);
        }

        if let Err(reason) = self.risk.may_place(side, qty, self.ledger.net_position()) {
            debug!(%reason, side = side.as_str(), %price, %qty, "submission vetoed by risk");
            return Err(EngineError::Validation(reason.to_string()));
        }

        let order = Order::new(self.allocate_id(), self.cfg.symbol.clone(), side, price, qty);
        self.submit_order(order).await
    }

    /// Submission with a caller-provided order (same id across retries).
    /// A duplicate id with a live table entry is a no-op.
    pub async fn submit_order(&self, order: Order) -> Result<String, EngineError> {
        let cl_id = order.client_order_id.clone();
        {
            let mut table = self.table.lock().expect("order table lock");
            if let Some(existing) = table.get(&cl_id) {
                if !existing.status.is_terminal() {
                    return Ok(cl_id);
                }
            }
            table.insert(cl_id.clone(), order.clone());
        }
        if let Some(cache) = &self.cache {
            cache.save(&order);
        }

        if let Some(top) = *self.last_top.lock().expect("top lock") {
            if top.is_valid {
                self.ledger.observe_spread(top.spread_bps);
            }
        }

        match self.place_with_retry(&order).await {
            Ok(exchange_id) => {
                if let Some(entry) = self.table.lock().expect("order table lock").get_mut(&cl_id) {
                    entry.exchange_id = Some(exchange_id);
                    entry.update_ts = Utc::now();
                }
                self.risk.record_submission();
                ORDERS_SUBMITTED.inc();
                self.counters.placed.fetch_add(1, Ordering::Relaxed);
                Ok(cl_id)
            }
            Err(e) => {
                self.finish(&cl_id, OrderStatus::Rejected);
                let source = match &e {
                    EngineError::RateLimited { .. } => "rate_limit",
                    EngineError::Validation(_) => "venue",
                    _ => "transport",
                };
                ORDERS_REJECTED.with_label_values(&[source]).inc();
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%cl_id, error = %e, "order submission failed");
                Err(e)
            }
        }
    }

    async fn place_with_retry(&self, order: &Order) -> Result<String, EngineError> {
        let mut attempt = 0u32;
        loop {
            match self.exchange.place(order).await {
                Ok(ack) => {
                    debug!(cl_id = %order.client_order_id, status = ?ack.status, "place acknowledged");
                    return Ok(ack.exchange_id);
                }
                Err(e) if e.is_transient() && attempt < self.cfg.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(100u64.saturating_mul(1 << attempt.min(6)));
                    debug!(attempt, error = %e, "transient place error, retrying");
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancel by client order id. Unknown or already-terminal ids succeed
    /// silently; a cancel already in flight is not re-sent.
    pub async fn cancel(&self, cl_id: &str) -> Result<(), EngineError> {
        let exchange_id = {
            let mut table = self.table.lock().expect("order table lock");
            match table.get_mut(cl_id) {
                None => return Ok(()),
                Some(o) if o.status.is_terminal() || o.pending_cancel => return Ok(()),
                Some(o) => {
                    o.pending_cancel = true;
                    o.update_ts = Utc::now();
                    o.exchange_id.clone()
                }
            }
        };
        if let Some(cache) = &self.cache {
            if let Some(o) = self.table.lock().expect("order table lock").get(cl_id) {
                cache.save(o);
            }
        }
        self.exchange.cancel(cl_id, exchange_id.as_deref()).await
    }

    /// Apply one event from the order-entry collaborator. Duplicate events
    /// for terminal or unknown orders are no-ops.
    pub fn on_exchange_event(&self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Ack { client_order_id, exchange_id } => {
                let mut table = self.table.lock().expect("order table lock");
                if let Some(o) = table.get_mut(&client_order_id) {
                    if o.exchange_id.is_none() {
                        o.exchange_id = Some(exchange_id);
                        o.update_ts = Utc::now();
                    }
                }
            }
            ExchangeEvent::Fill(fill) => self.on_fill(fill),
            ExchangeEvent::CancelAck { client_order_id } => {
                if self.finish(&client_order_id, OrderStatus::Canceled) {
                    ORDERS_CANCELED.inc();
                    self.counters.canceled.fetch_add(1, Ordering::Relaxed);
                }
            }
            ExchangeEvent::Reject { client_order_id, reason } => {
                if self.finish(&client_order_id, OrderStatus::Rejected) {
                    ORDERS_REJECTED.with_label_values(&["venue"]).inc();
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(%client_order_id, %reason, "order rejected by venue");
                }
            }
        }
    }

    fn on_fill(&self, fill: Fill) {
        let (symbol, fully_filled) = {
            let mut table = self.table.lock().expect("order table lock");
            let Some(order) = table.get_mut(&fill.client_order_id) else {
                debug!(cl_id = %fill.client_order_id, "fill for unknown order ignored");
                return;
            };
            if order.status.is_terminal() {
                return;
            }
            order.filled_qty = (order.filled_qty + fill.qty).min(order.qty);
            order.update_ts = fill.ts;
            let full = order.filled_qty >= order.qty;
            order.status = if full {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            let symbol = order.symbol.clone();
            if full {
                table.remove(&fill.client_order_id);
            }
            (symbol, full)
        };

        if let Some(cache) = &self.cache {
            if fully_filled {
                cache.remove(&fill.client_order_id);
            } else if let Some(o) = self.table.lock().expect("order table lock").get(&fill.client_order_id) {
                cache.save(o);
            }
        }

        let delta = self.ledger.apply_fill(&fill);
        self.risk.on_pnl_delta(delta);

        FILLS.inc();
        if fully_filled {
            ORDERS_FILLED.inc();
            self.counters.filled.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(tx) = &self.rec_tx {
            let st = self.ledger.snapshot();
            let _ = tx.try_send(LogRecord::Trade(TradeRecord {
                ts: fill.ts,
                symbol: symbol.clone(),
                side: fill.side,
                qty: fill.qty,
                price: fill.price,
                client_order_id: fill.client_order_id.clone(),
            }));
            let _ = tx.try_send(LogRecord::Pnl(PnlRecord {
                ts: fill.ts,
                symbol,
                net_position: st.net_position,
                vwap_entry_price: st.vwap_entry_price,
                realized_delta: delta.realized_delta,
                realized_pnl: st.realized_pnl,
                unrealized_pnl: st.unrealized_pnl,
            }));
        }
    }

    /// Move an order to a terminal state and drop it from the table.
    /// Returns false when the id is unknown or already terminal.
    fn finish(&self, cl_id: &str, status: OrderStatus) -> bool {
        let removed = {
            let mut table = self.table.lock().expect("order table lock");
            match table.get_mut(cl_id) {
                Some(o) if !o.status.is_terminal() => {
                    o.status = status;
                    o.update_ts = Utc::now();
                    table.remove(cl_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            if let Some(cache) = &self.cache {
                cache.remove(cl_id);
            }
        }
        removed
    }

    /// Issue cancels for orders past `order_timeout` and locally expire
    /// cancels that never got an ack within the grace window.
    pub async fn sweep_stale(&self) {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(self.cfg.order_timeout).unwrap_or_default();
        let grace = chrono::Duration::from_std(self.cfg.cancel_grace).unwrap_or_default();

        let (to_cancel, to_expire) = {
            let table = self.table.lock().expect("order table lock");
            let mut to_cancel = Vec::new();
            let mut to_expire = Vec::new();
            for o in table.values() {
                if o.pending_cancel {
                    if now - o.update_ts >= grace {
                        to_expire.push(o.client_order_id.clone());
                    }
                } else if o.status == OrderStatus::New && now - o.create_ts >= timeout {
                    to_cancel.push(o.client_order_id.clone());
                }
            }
            (to_cancel, to_expire)
        };

        for cl_id in to_expire {
            if self.finish(&cl_id, OrderStatus::Expired) {
                ORDERS_EXPIRED.inc();
                warn!(%cl_id, "order expired locally without a cancel ack");
            }
        }
        for cl_id in to_cancel {
            if let Err(e) = self.cancel(&cl_id).await {
                debug!(%cl_id, error = %e, "stale-order cancel failed");
            }
        }
    }

    fn validate(&self, price: Decimal, qty: Decimal) -> Result<(), EngineError> {
        if self.cfg.symbol.is_empty() {
            return Err(EngineError::Validation("empty symbol".to_string()));
        }
        if price <= Decimal::ZERO || !(price % self.cfg.tick_size).is_zero() {
            return Err(EngineError::Validation(format!(
                "price {price} is not a positive multiple of tick {}",
                self.cfg.tick_size
            )));
        }
        if qty < self.cfg.min_qty || qty > self.cfg.max_qty {
            return Err(EngineError::Validation(format!(
                "qty {qty} outside [{}, {}]",
                self.cfg.min_qty, self.cfg.max_qty
            )));
        }
        if let Some(top) = *self.last_top.lock().expect("top lock") {
            if top.is_valid {
                let mid = top.mid();
                if (price - mid).abs() > mid * self.cfg.price_band_pct {
                    return Err(EngineError::Validation(format!(
                        "price {price} outside sanity band around mid {mid}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Session summary for the logging collaborator, emitted on shutdown.
    pub fn session_summary(&self) -> SessionSummary {
        let st = self.ledger.snapshot();
        let end = Utc::now();
        SessionSummary {
            session_start: st.session_start,
            session_end: end,
            duration_secs: (end - st.session_start).num_seconds(),
            symbol: self.cfg.symbol.clone(),
            buy_trades: st.buy_trades,
            sell_trades: st.sell_trades,
            buy_volume: st.buy_volume,
            sell_volume: st.sell_volume,
            min_spread_bps: st.min_spread_bps,
            max_spread_bps: st.max_spread_bps,
            final_position: st.net_position,
            realized_pnl: st.realized_pnl,
            orders_placed: self.counters.placed.load(Ordering::Relaxed),
            orders_filled: self.counters.filled.load(Ordering::Relaxed),
            orders_canceled: self.counters.canceled.load(Ordering::Relaxed),
            orders_rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskLimits;
    use crate::gateway::MockExchange;
    use rust_decimal_macros::dec;

    fn cfg() -> OrderCfg {
        OrderCfg {
            symbol: "ETH-USD".to_string(),
            tick_size: dec!(0.01),
            min_qty: dec!(0.001),
            max_qty: dec!(10),
            price_band_pct: dec!(0.05),
            order_timeout: Duration::from_secs(1),
            cancel_grace: Duration::from_millis(500),
            max_retries: 2,
        }
    }

    fn limits() -> RiskLimits {
        RiskLimits {
            position_limit: dec!(0.02),
            daily_loss_limit: dec!(-100),
            drawdown_limit: dec!(100),
            order_rate_limit: 1000,
            circuit_breaker_enabled: true,
        }
    }

    fn manager(exchange: Arc<MockExchange>) -> OrderManager {
        OrderManager::new(
            cfg(),
            Arc::new(RiskSupervisor::new(limits())),
            Arc::new(Ledger::new()),
            exchange,
            None,
            None,
        )
    }

    fn fill(cl_id: &str, side: Side, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            client_order_id: cl_id.to_string(),
            side,
            qty,
            price,
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submit_registers_and_forwards() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let cl_id = om.submit(Side::Buy, dec!(100.00), dec!(0.001)).await.unwrap();
        assert_eq!(exchange.place_calls(), 1);
        assert_eq!(om.open_order_count(), 1);
        assert_eq!(om.open_orders()[0].client_order_id, cl_id);
    }

    #[tokio::test]
    async fn duplicate_client_id_submits_once() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let order = Order::new("dup-1".to_string(), "ETH-USD".to_string(), Side::Buy, dec!(100.00), dec!(0.001));
        om.submit_order(order.clone()).await.unwrap();
        om.submit_order(order).await.unwrap();

        assert_eq!(exchange.place_calls(), 1);
        assert_eq!(om.open_order_count(), 1);
    }

    #[tokio::test]
    async fn risk_veto_never_reaches_the_exchange() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        // Position limit is 0.02; a 0.021 buy projects past it.
        let err = om.submit(Side::Buy, dec!(100.00), dec!(0.021)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(exchange.place_calls(), 0);
        assert_eq!(om.open_order_count(), 0);
    }

    #[tokio::test]
    async fn local_validation_rejects_off_tick_prices() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let err = om.submit(Side::Buy, dec!(100.005), dec!(0.001)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = om.submit(Side::Buy, dec!(100.00), dec!(0.0001)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(exchange.place_calls(), 0);
    }

    #[tokio::test]
    async fn price_outside_sanity_band_is_rejected() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());
        om.observe_top(top(dec!(100.00), dec!(100.01)));

        let err = om.submit(Side::Buy, dec!(200.00), dec!(0.001)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(exchange.place_calls(), 0);
    }

    fn top(bid: Decimal, ask: Decimal) -> TopOfBook {
        TopOfBook {
            bid_price: bid,
            bid_qty: dec!(1),
            ask_price: ask,
            ask_qty: dec!(1),
            spread: ask - bid,
            spread_bps: dec!(1),
            ts: Utc::now(),
            seq: 1,
            is_valid: true,
        }
    }

    #[tokio::test]
    async fn transient_place_errors_are_retried() {
        let exchange = Arc::new(MockExchange::default());
        exchange.fail_times(2); // transient failures, then success
        let om = manager(exchange.clone());

        om.submit(Side::Buy, dec!(100.00), dec!(0.001)).await.unwrap();
        assert_eq!(exchange.place_calls(), 3);
        assert_eq!(om.open_order_count(), 1);
    }

    #[tokio::test]
    async fn fills_advance_the_state_machine_and_the_ledger() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let cl_id = om.submit(Side::Buy, dec!(100.00), dec!(0.01)).await.unwrap();

        om.on_exchange_event(ExchangeEvent::Fill(fill(&cl_id, Side::Buy, dec!(0.004), dec!(100.00))));
        assert_eq!(om.open_orders()[0].status, OrderStatus::PartiallyFilled);

        om.on_exchange_event(ExchangeEvent::Fill(fill(&cl_id, Side::Buy, dec!(0.006), dec!(100.00))));
        assert_eq!(om.open_order_count(), 0);
        assert_eq!(om.ledger.net_position(), dec!(0.01));

        // A duplicate fill for the now-terminal order is a no-op.
        om.on_exchange_event(ExchangeEvent::Fill(fill(&cl_id, Side::Buy, dec!(0.01), dec!(100.00))));
        assert_eq!(om.ledger.net_position(), dec!(0.01));
    }

    #[tokio::test]
    async fn round_trip_reports_realized_pnl() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let buy = om.submit(Side::Buy, dec!(100.00), dec!(0.01)).await.unwrap();
        om.on_exchange_event(ExchangeEvent::Fill(fill(&buy, Side::Buy, dec!(0.01), dec!(100.00))));

        let sell = om.submit(Side::Sell, dec!(100.50), dec!(0.01)).await.unwrap();
        om.on_exchange_event(ExchangeEvent::Fill(fill(&sell, Side::Sell, dec!(0.01), dec!(100.50))));

        assert_eq!(om.ledger.net_position(), Decimal::ZERO);
        assert_eq!(om.ledger.realized_pnl(), dec!(0.005));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let cl_id = om.submit(Side::Sell, dec!(100.00), dec!(0.001)).await.unwrap();
        om.cancel(&cl_id).await.unwrap();
        om.cancel(&cl_id).await.unwrap();
        assert_eq!(exchange.cancel_calls(), 1);

        om.on_exchange_event(ExchangeEvent::CancelAck { client_order_id: cl_id.clone() });
        assert_eq!(om.open_order_count(), 0);

        // Cancel of a terminal/unknown id succeeds without another call.
        om.cancel(&cl_id).await.unwrap();
        om.cancel("never-existed").await.unwrap();
        assert_eq!(exchange.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn stale_orders_get_canceled_then_expired() {
        let exchange = Arc::new(MockExchange::default());
        let mut c = cfg();
        c.order_timeout = Duration::from_millis(0);
        c.cancel_grace = Duration::from_millis(0);
        let om = OrderManager::new(
            c,
            Arc::new(RiskSupervisor::new(limits())),
            Arc::new(Ledger::new()),
            exchange.clone(),
            None,
            None,
        );

        let cl_id = om.submit(Side::Buy, dec!(100.00), dec!(0.001)).await.unwrap();

        // Age >= timeout: the sweep issues a cancel.
        om.sweep_stale().await;
        assert_eq!(exchange.cancel_calls(), 1);
        assert!(om.open_orders()[0].pending_cancel);

        // No ack within the grace window: expired locally.
        om.sweep_stale().await;
        assert_eq!(om.open_order_count(), 0);

        // Late cancel ack for the expired id is a no-op.
        om.on_exchange_event(ExchangeEvent::CancelAck { client_order_id: cl_id });
        assert_eq!(om.open_order_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ack_is_a_no_op() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());
        let cl_id = om.submit(Side::Buy, dec!(100.00), dec!(0.001)).await.unwrap();

        om.on_exchange_event(ExchangeEvent::Ack {
            client_order_id: cl_id.clone(),
            exchange_id: "first".to_string(),
        });
        om.on_exchange_event(ExchangeEvent::Ack {
            client_order_id: cl_id.clone(),
            exchange_id: "second".to_string(),
        });

        // Exchange id from the place ack (the mock's) wins; later acks don't
        // overwrite it.
        let ex_id = om.open_orders()[0].exchange_id.clone().unwrap();
        assert_ne!(ex_id, "second");
    }

    #[tokio::test]
    async fn permanent_rejects_do_not_retry() {
        let exchange = Arc::new(MockExchange::default());
        exchange.reject_all();
        let om = manager(exchange.clone());

        let err = om.submit(Side::Buy, dec!(100.00), dec!(0.001)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(exchange.place_calls(), 1);
        assert_eq!(om.open_order_count(), 0);
    }

    #[tokio::test]
    async fn session_summary_aggregates_counters() {
        let exchange = Arc::new(MockExchange::default());
        let om = manager(exchange.clone());

        let buy = om.submit(Side::Buy, dec!(100.00), dec!(0.01)).await.unwrap();
        om.on_exchange_event(ExchangeEvent::Fill(fill(&buy, Side::Buy, dec!(0.01), dec!(100.00))));

        let summary = om.session_summary();
        assert_eq!(summary.orders_placed, 1);
        assert_eq!(summary.orders_filled, 1);
        assert_eq!(summary.buy_trades, 1);
        assert_eq!(summary.final_position, dec!(0.01));
    }
}
