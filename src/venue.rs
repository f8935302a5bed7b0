// ===============================
// src/venue.rs
// ===============================
//
// Wire schema for the venue's L2 market-data channel plus the signing helper
// for credentialed subscriptions and order-entry requests. The engine only
// fills payload fields; transport framing and venue-specific auth beyond the
// HMAC claim stay with the transport collaborator.
//
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::BookSide;

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// HMAC-SHA256 over the canonical payload, hex-encoded.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Subscription frame sent after the transport opens. `key`/`signature` are
/// present only on credentialed channels.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub channel: &'static str,
    pub symbols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SubscribeRequest {
    pub fn level2(symbol: &str) -> Self {
        Self {
            kind: "subscribe",
            channel: "level2",
            symbols: vec![symbol.to_string()],
            key: None,
            timestamp: None,
            signature: None,
        }
    }

    /// Attach a signed claim: HMAC over "<ts>|<channel>|<symbols,joined>".
    pub fn signed(mut self, key: &str, secret: &str) -> Self {
        let ts = timestamp_ms();
        let payload = format!("{}|{}|{}", ts, self.channel, self.symbols.join(","));
        self.key = Some(key.to_string());
        self.timestamp = Some(ts);
        self.signature = Some(sign_payload(secret, &payload));
        self
    }
}

/// One price level on the wire: [price, qty] as strings.
pub type WireLevel = [String; 2];

/// Inbound market-data frames. Snapshots carry both full sides; updates carry
/// per-level changes with qty "0" meaning removal.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Snapshot {
        symbol: String,
        sequence: u64,
        bids: Vec<WireLevel>,
        asks: Vec<WireLevel>,
    },
    L2Update {
        symbol: String,
        sequence: u64,
        changes: Vec<WireChange>,
    },
    Subscriptions {
        #[serde(default)]
        channels: Vec<String>,
    },
    Heartbeat {},
    Error {
        message: String,
    },
}

/// ["bid"|"ask", price, qty]
#[derive(Debug, Deserialize)]
pub struct WireChange(pub String, pub String, pub String);

impl WireChange {
    pub fn book_side(&self) -> Option<BookSide> {
        match self.0.as_str() {
            "bid" | "buy" => Some(BookSide::Bid),
            "ask" | "offer" | "sell" => Some(BookSide::Ask),
            _ => None,
        }
    }
}

/// Parse a wire level into decimals. Malformed numerics are parse errors:
/// the caller drops the level and counts it, leaving the book untouched.
pub fn parse_level(level: &WireLevel) -> Option<(Decimal, Decimal)> {
    let price = level[0].parse::<Decimal>().ok()?;
    let qty = level[1].parse::<Decimal>().ok()?;
    Some((price, qty))
}

pub fn parse_change(change: &WireChange) -> Option<(BookSide, Decimal, Decimal)> {
    let side = change.book_side()?;
    let price = change.1.parse::<Decimal>().ok()?;
    let qty = change.2.parse::<Decimal>().ok()?;
    Some((side, price, qty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_frame_decodes() {
        let raw = r#"{
            "type": "snapshot",
            "symbol": "ETH-USD",
            "sequence": 42,
            "bids": [["100.00", "1.5"], ["99.99", "2"]],
            "asks": [["100.01", "0.7"]]
        }"#;
        match serde_json::from_str::<FeedMessage>(raw).unwrap() {
            FeedMessage::Snapshot { symbol, sequence, bids, asks } => {
                assert_eq!(symbol, "ETH-USD");
                assert_eq!(sequence, 42);
                assert_eq!(parse_level(&bids[0]), Some((dec!(100.00), dec!(1.5))));
                assert_eq!(asks.len(), 1);
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn update_frame_decodes_sides() {
        let raw = r#"{
            "type": "l2_update",
            "symbol": "ETH-USD",
            "sequence": 43,
            "changes": [["bid", "100.00", "0"], ["ask", "100.02", "3"]]
        }"#;
        match serde_json::from_str::<FeedMessage>(raw).unwrap() {
            FeedMessage::L2Update { changes, .. } => {
                let (side, price, qty) = parse_change(&changes[0]).unwrap();
                assert_eq!(side, BookSide::Bid);
                assert_eq!(price, dec!(100.00));
                assert!(qty.is_zero());
                assert_eq!(parse_change(&changes[1]).unwrap().0, BookSide::Ask);
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn malformed_numeric_is_a_parse_error() {
        let level: WireLevel = ["abc".to_string(), "1".to_string()];
        assert!(parse_level(&level).is_none());
        let change = WireChange("bid".into(), "100.0".into(), "x".into());
        assert!(parse_change(&change).is_none());
    }

    #[test]
    fn signed_subscribe_carries_claim() {
        let req = SubscribeRequest::level2("ETH-USD").signed("key-1", "secret");
        assert_eq!(req.key.as_deref(), Some("key-1"));
        assert!(req.timestamp.is_some());
        let sig = req.signature.as_deref().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(sign_payload("s", "payload"), sign_payload("s", "payload"));
        assert_ne!(sign_payload("s", "payload"), sign_payload("s2", "payload"));
    }
}
