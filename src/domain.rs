// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Signed quantity as seen by the position ledger: buys add, sells subtract.
    pub fn signed(&self, qty: Decimal) -> Decimal {
        match self {
            Side::Buy => qty,
            Side::Sell => -qty,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

/// Compact top-of-book snapshot published by ingress on every applied update.
/// `seq` is the book's internal monotonic counter, not the venue sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
    pub spread: Decimal,
    pub spread_bps: Decimal,
    pub ts: DateTime<Utc>,
    pub seq: u64,
    pub is_valid: bool,
}

impl TopOfBook {
    pub fn invalid(seq: u64) -> Self {
        Self {
            bid_price: Decimal::ZERO,
            bid_qty: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            ask_qty: Decimal::ZERO,
            spread: Decimal::ZERO,
            spread_bps: Decimal::ZERO,
            ts: Utc::now(),
            seq,
            is_valid: false,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid_price + self.ask_price) / Decimal::TWO
    }
}

/// Per-tick quoting decision. Prices/sizes are for the innermost level;
/// `num_levels` tells the execution side how deep to ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteIntent {
    pub place_bid: bool,
    pub place_ask: bool,
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
    pub num_levels: u32,
}

impl QuoteIntent {
    pub fn empty() -> Self {
        Self {
            place_bid: false,
            place_ask: false,
            bid_price: Decimal::ZERO,
            bid_qty: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            ask_qty: Decimal::ZERO,
            num_levels: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.place_bid && !self.place_ask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub exchange_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Decimal,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    pub status: OrderStatus,
    pub pending_cancel: bool,
    pub create_ts: DateTime<Utc>,
    pub update_ts: DateTime<Utc>,
}

impl Order {
    pub fn new(client_order_id: String, symbol: String, side: Side, price: Decimal, qty: Decimal) -> Self {
        let now = Utc::now();
        Self {
            client_order_id,
            exchange_id: None,
            symbol,
            side,
            kind: OrderKind::Limit,
            price,
            qty,
            filled_qty: Decimal::ZERO,
            status: OrderStatus::New,
            pending_cancel: false,
            create_ts: now,
            update_ts: now,
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }
}

/// A single execution against one of our resting orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub client_order_id: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub ts: DateTime<Utc>,
}

/// Events reported back by the order-entry collaborator.
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Ack {
        client_order_id: String,
        exchange_id: String,
    },
    Fill(Fill),
    CancelAck {
        client_order_id: String,
    },
    Reject {
        client_order_id: String,
        reason: String,
    },
}

// ---- Records handed to the logging collaborator ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlRecord {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub net_position: Decimal,
    pub vwap_entry_price: Decimal,
    pub realized_delta: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub duration_secs: i64,
    pub symbol: String,
    pub buy_trades: u64,
    pub sell_trades: u64,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub min_spread_bps: Option<Decimal>,
    pub max_spread_bps: Option<Decimal>,
    pub final_position: Decimal,
    pub realized_pnl: Decimal,
    pub orders_placed: u64,
    pub orders_filled: u64,
    pub orders_canceled: u64,
    pub orders_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    Trade(TradeRecord),
    Pnl(PnlRecord),
    Summary(SessionSummary),
}
