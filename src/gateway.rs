// ===============================
// src/gateway.rs (order-entry collaborators)
// ===============================
//
// The engine talks to the venue through `ExchangeClient` only. Two
// implementations: a paper venue with probabilistic fills for simulated
// trading, and a signed REST venue for testnet/live. Both report asynchronous
// lifecycle events (acks, fills, cancel acks, rejects) on the exchange event
// bus; idempotence across retries rides on the client order id.
//
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::domain::{ExchangeEvent, Fill, Order, OrderStatus, Side};
use crate::error::{EngineError, Result};
use crate::ledger::Ledger;
use crate::venue::{sign_payload, timestamp_ms};

#[derive(Debug, Clone)]
pub struct PlaceAck {
    pub exchange_id: String,
    pub status: OrderStatus,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place(&self, order: &Order) -> Result<PlaceAck>;
    async fn cancel(&self, client_order_id: &str, exchange_id: Option<&str>) -> Result<()>;
    async fn status(&self, client_order_id: &str) -> Result<Option<OrderStatus>>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Paper venue
// ---------------------------------------------------------------------------

/// Simulated venue: immediate ack, then a probabilistic fill after a short
/// latency. Fill odds favor orders that reduce the current inventory and
/// penalize ones that grow it, so paper sessions behave like a maker being
/// picked off by flow.
pub struct PaperExchange {
    ledger: Arc<Ledger>,
    events_tx: mpsc::Sender<ExchangeEvent>,
    neutral_band: Decimal,
    fill_latency: Duration,
    next_id: AtomicU64,
}

const PAPER_BASE_FILL_PROB: f64 = 0.3;
const PAPER_REBALANCE_BOOST: f64 = 1.8;
const PAPER_BUILD_PENALTY: f64 = 0.4;
const PAPER_MAX_FILL_PROB: f64 = 0.65;

impl PaperExchange {
    pub fn new(ledger: Arc<Ledger>, events_tx: mpsc::Sender<ExchangeEvent>, neutral_band: Decimal) -> Self {
        Self {
            ledger,
            events_tx,
            neutral_band,
            fill_latency: Duration::from_millis(20),
            next_id: AtomicU64::new(1),
        }
    }

    fn fill_probability(side: Side, position: Decimal, band: Decimal) -> f64 {
        let mut p = PAPER_BASE_FILL_PROB;
        let rebalancing = (side == Side::Sell && position > band) || (side == Side::Buy && position < -band);
        let building = (side == Side::Buy && position > band) || (side == Side::Sell && position < -band);
        if rebalancing {
            p *= PAPER_REBALANCE_BOOST;
        }
        if building {
            p *= PAPER_BUILD_PENALTY;
        }
        p.min(PAPER_MAX_FILL_PROB)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place(&self, order: &Order) -> Result<PlaceAck> {
        let exchange_id = format!("SIM-{}", self.next_id.fetch_add(1, Ordering::Relaxed));

        let _ = self
            .events_tx
            .send(ExchangeEvent::Ack {
                client_order_id: order.client_order_id.clone(),
                exchange_id: exchange_id.clone(),
            })
            .await;

        let events_tx = self.events_tx.clone();
        let ledger = self.ledger.clone();
        let band = self.neutral_band;
        let latency = self.fill_latency;
        let cl_id = order.client_order_id.clone();
        let side = order.side;
        let qty = order.qty;
        let price = order.price;

        tokio::spawn(async move {
            sleep(latency).await;
            let p = PaperExchange::fill_probability(side, ledger.net_position(), band);
            let roll: f64 = rand::random();
            if roll < p {
                let _ = events_tx
                    .send(ExchangeEvent::Fill(Fill {
                        client_order_id: cl_id,
                        side,
                        qty,
                        price,
                        ts: Utc::now(),
                    }))
                    .await;
            }
        });

        Ok(PlaceAck {
            exchange_id,
            status: OrderStatus::New,
        })
    }

    async fn cancel(&self, client_order_id: &str, _exchange_id: Option<&str>) -> Result<()> {
        let _ = self
            .events_tx
            .send(ExchangeEvent::CancelAck {
                client_order_id: client_order_id.to_string(),
            })
            .await;
        Ok(())
    }

    async fn status(&self, _client_order_id: &str) -> Result<Option<OrderStatus>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// REST venue
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    order_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Signed REST order entry. The engine supplies payload fields only; request
/// framing and idempotence-by-client-id are the venue contract.
pub struct RestExchange {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl RestExchange {
    pub fn new(
        base_url: String,
        api_key: String,
        api_secret: String,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::Fatal(format!("http client: {e}")))?;
        info!(%base_url, "order entry client ready");
        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
        })
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let sig = sign_payload(&self.api_secret, &query);
        format!("{query}&signature={sig}")
    }

    async fn classify(resp: reqwest::Response) -> EngineError {
        let code = resp.status();
        if code.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(1000);
            return EngineError::RateLimited { retry_after_ms };
        }
        let body = resp.text().await.unwrap_or_default();
        if code.is_server_error() {
            EngineError::Transport(format!("{code}: {body}"))
        } else {
            EngineError::Validation(format!("{code}: {body}"))
        }
    }
}

fn parse_status(s: &str) -> Option<OrderStatus> {
    match s {
        "NEW" => Some(OrderStatus::New),
        "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
        "FILLED" => Some(OrderStatus::Filled),
        "CANCELED" => Some(OrderStatus::Canceled),
        "REJECTED" => Some(OrderStatus::Rejected),
        "EXPIRED" => Some(OrderStatus::Expired),
        _ => None,
    }
}

#[async_trait]
impl ExchangeClient for RestExchange {
    async fn place(&self, order: &Order) -> Result<PlaceAck> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", order.qty.to_string()),
            ("price", order.price.to_string()),
            ("clientOrderId", order.client_order_id.clone()),
            ("timestamp", timestamp_ms().to_string()),
        ];
        let url = format!("{}/api/v1/orders?{}", self.base_url, self.signed_query(&params));

        let resp = self.http.post(url).header("X-API-KEY", &self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }
        let body: PlaceResponse = resp.json().await?;
        debug!(cl_id = %order.client_order_id, exchange_id = %body.order_id, "order accepted");
        // small pacing between live submissions to stay under venue limits
        sleep(Duration::from_millis(50)).await;
        Ok(PlaceAck {
            exchange_id: body.order_id,
            status: body
                .status
                .as_deref()
                .and_then(parse_status)
                .unwrap_or(OrderStatus::New),
        })
    }

    async fn cancel(&self, client_order_id: &str, exchange_id: Option<&str>) -> Result<()> {
        let mut params = vec![
            ("clientOrderId", client_order_id.to_string()),
            ("timestamp", timestamp_ms().to_string()),
        ];
        if let Some(ex) = exchange_id {
            params.push(("orderId", ex.to_string()));
        }
        let url = format!("{}/api/v1/orders?{}", self.base_url, self.signed_query(&params));

        let resp = self.http.delete(url).header("X-API-KEY", &self.api_key).send().await?;
        if !resp.status().is_success() {
            let err = Self::classify(resp).await;
            // Canceling something already gone is success for our purposes.
            if let EngineError::Validation(_) = err {
                warn!(%client_order_id, %err, "cancel treated as no-op");
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    async fn status(&self, client_order_id: &str) -> Result<Option<OrderStatus>> {
        let params = [
            ("clientOrderId", client_order_id.to_string()),
            ("timestamp", timestamp_ms().to_string()),
        ];
        let url = format!("{}/api/v1/orders?{}", self.base_url, self.signed_query(&params));

        let resp = self.http.get(url).header("X-API-KEY", &self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(Self::classify(resp).await);
        }
        let body: StatusResponse = resp.json().await?;
        Ok(body.status.as_deref().and_then(parse_status))
    }

    fn name(&self) -> &str {
        "rest"
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Default)]
pub struct MockExchange {
    places: AtomicU64,
    cancels: AtomicU64,
    fail_remaining: AtomicU64,
    reject_all: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockExchange {
    pub fn place_calls(&self) -> u64 {
        self.places.load(Ordering::Relaxed)
    }

    pub fn cancel_calls(&self) -> u64 {
        self.cancels.load(Ordering::Relaxed)
    }

    /// The next `n` place calls fail with a transient transport error.
    pub fn fail_times(&self, n: u64) {
        self.fail_remaining.store(n, Ordering::Relaxed);
    }

    /// Every place call fails with a permanent validation error.
    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[async_trait]
impl ExchangeClient for MockExchange {
    async fn place(&self, _order: &Order) -> Result<PlaceAck> {
        let n = self.places.fetch_add(1, Ordering::Relaxed) + 1;
        if self.reject_all.load(Ordering::Relaxed) {
            return Err(EngineError::Validation("rejected by mock".to_string()));
        }
        if self.fail_remaining.load(Ordering::Relaxed) > 0 {
            self.fail_remaining.fetch_sub(1, Ordering::Relaxed);
            return Err(EngineError::Transport("mock transport failure".to_string()));
        }
        Ok(PlaceAck {
            exchange_id: format!("X-{n}"),
            status: OrderStatus::New,
        })
    }

    async fn cancel(&self, _client_order_id: &str, _exchange_id: Option<&str>) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn status(&self, _client_order_id: &str) -> Result<Option<OrderStatus>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fill_odds_favor_rebalancing() {
        let band = dec!(0.01);
        let flat = PaperExchange::fill_probability(Side::Buy, Decimal::ZERO, band);
        assert!((flat - PAPER_BASE_FILL_PROB).abs() < 1e-9);

        let long = dec!(0.02);
        let sell_when_long = PaperExchange::fill_probability(Side::Sell, long, band);
        let buy_when_long = PaperExchange::fill_probability(Side::Buy, long, band);
        assert!(sell_when_long > flat);
        assert!(buy_when_long < flat);
        assert!(sell_when_long <= PAPER_MAX_FILL_PROB);
    }

    #[test]
    fn fill_odds_are_symmetric_for_shorts() {
        let band = dec!(0.01);
        let short = dec!(-0.02);
        assert_eq!(
            PaperExchange::fill_probability(Side::Buy, short, band),
            PaperExchange::fill_probability(Side::Sell, -short, band),
        );
    }

    #[test]
    fn venue_status_strings_map_to_the_state_machine() {
        assert_eq!(parse_status("NEW"), Some(OrderStatus::New));
        assert_eq!(parse_status("PARTIALLY_FILLED"), Some(OrderStatus::PartiallyFilled));
        assert_eq!(parse_status("FILLED"), Some(OrderStatus::Filled));
        assert_eq!(parse_status("CANCELED"), Some(OrderStatus::Canceled));
        assert_eq!(parse_status("weird"), None);
    }

    #[tokio::test]
    async fn paper_place_acks_then_maybe_fills() {
        let (tx, mut rx) = mpsc::channel(16);
        let ledger = Arc::new(Ledger::new());
        let venue = PaperExchange::new(ledger, tx, dec!(0.01));

        let order = Order::new(
            "P-1".to_string(),
            "ETH-USD".to_string(),
            Side::Buy,
            dec!(100.00),
            dec!(0.001),
        );
        let ack = venue.place(&order).await.unwrap();
        assert!(ack.exchange_id.starts_with("SIM-"));

        match rx.recv().await.unwrap() {
            ExchangeEvent::Ack { client_order_id, .. } => assert_eq!(client_order_id, "P-1"),
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn paper_cancel_always_acks() {
        let (tx, mut rx) = mpsc::channel(16);
        let venue = PaperExchange::new(Arc::new(Ledger::new()), tx, dec!(0.01));
        venue.cancel("P-2", None).await.unwrap();
        match rx.recv().await.unwrap() {
            ExchangeEvent::CancelAck { client_order_id } => assert_eq!(client_order_id, "P-2"),
            other => panic!("expected cancel ack, got {other:?}"),
        }
    }
}
