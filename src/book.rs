// ===============================
// src/book.rs
// ===============================
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{BookSide, TopOfBook};

/// Levels retained per side; anything worse is trimmed.
const MAX_LEVELS: usize = 100;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The level was installed/removed and a new snapshot should be published.
    Update,
    /// Venue sequence at or below the last applied one; dropped.
    Stale,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
    #[error("crossing update rejected: {side:?} at {price}")]
    Crossed { side: BookSide, price: Decimal },
    #[error("invalid level: price {price}, qty {qty}")]
    InvalidLevel { price: Decimal, qty: Decimal },
}

/// Incremental L2 book for a single symbol. Bids iterate highest-first,
/// asks lowest-first. Mutated only by the ingress worker.
pub struct OrderBook {
    pub symbol: String,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update: DateTime<Utc>,
    /// Internal monotonic counter, bumped once per applied update.
    seq: u64,
    last_venue_seq: Option<u64>,
    crossed_rejects: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: Utc::now(),
            seq: 0,
            last_venue_seq: None,
            crossed_rejects: 0,
        }
    }

    /// Replace both sides with the given levels. Zero-quantity levels are
    /// skipped. Resets venue sequence tracking to `venue_seq`.
    pub fn apply_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        venue_seq: Option<u64>,
    ) {
        self.bids.clear();
        self.asks.clear();
        for &(p, q) in bids {
            if q > Decimal::ZERO && p > Decimal::ZERO {
                self.bids.insert(p, q);
            }
        }
        for &(p, q) in asks {
            if q > Decimal::ZERO && p > Decimal::ZERO {
                self.asks.insert(p, q);
            }
        }
        self.trim();
        self.last_venue_seq = venue_seq;
        self.seq += 1;
        self.last_update = Utc::now();
    }

    /// Absolute replacement of one level; qty == 0 removes it. Out-of-order
    /// venue sequences are dropped, gaps surface so ingress can resync, and
    /// updates that would cross the book are rejected and counted.
    pub fn apply_delta(
        &mut self,
        side: BookSide,
        price: Decimal,
        qty: Decimal,
        venue_seq: Option<u64>,
    ) -> Result<Applied, BookError> {
        if let (Some(vs), Some(last)) = (venue_seq, self.last_venue_seq) {
            if vs <= last {
                return Ok(Applied::Stale);
            }
            if vs > last + 1 {
                return Err(BookError::SequenceGap {
                    expected: last + 1,
                    got: vs,
                });
            }
        }

        if price <= Decimal::ZERO || qty < Decimal::ZERO {
            return Err(BookError::InvalidLevel { price, qty });
        }

        if qty > Decimal::ZERO {
            let crossed = match side {
                BookSide::Bid => self.best_ask().map_or(false, |(ask, _)| price >= ask),
                BookSide::Ask => self.best_bid().map_or(false, |(bid, _)| price <= bid),
            };
            if crossed {
                self.crossed_rejects += 1;
                return Err(BookError::Crossed { side, price });
            }
        }

        let levels = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        if qty.is_zero() {
            levels.remove(&price);
        } else {
            levels.insert(price, qty);
        }

        self.trim();
        if let Some(vs) = venue_seq {
            self.last_venue_seq = Some(vs);
        }
        self.seq += 1;
        self.last_update = Utc::now();
        Ok(Applied::Update)
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(p, q)| (*p, *q))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(p, q)| (*p, *q))
    }

    /// Top `depth` levels, best first.
    pub fn depth(&self, side: BookSide, depth: usize) -> Vec<(Decimal, Decimal)> {
        match side {
            BookSide::Bid => self.bids.iter().rev().take(depth).map(|(p, q)| (*p, *q)).collect(),
            BookSide::Ask => self.asks.iter().take(depth).map(|(p, q)| (*p, *q)).collect(),
        }
    }

    pub fn snapshot_top(&self) -> TopOfBook {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, bid_qty)), Some((ask, ask_qty))) => {
                let spread = ask - bid;
                let mid = (ask + bid) / Decimal::TWO;
                let spread_bps = if mid > Decimal::ZERO {
                    spread / mid * BPS
                } else {
                    Decimal::ZERO
                };
                TopOfBook {
                    bid_price: bid,
                    bid_qty,
                    ask_price: ask,
                    ask_qty,
                    spread,
                    spread_bps,
                    ts: self.last_update,
                    seq: self.seq,
                    is_valid: true,
                }
            }
            _ => TopOfBook::invalid(self.seq),
        }
    }

    pub fn crossed_rejects(&self) -> u64 {
        self.crossed_rejects
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    fn trim(&mut self) {
        while self.bids.len() > MAX_LEVELS {
            let _ = self.bids.pop_first();
        }
        while self.asks.len() > MAX_LEVELS {
            let _ = self.asks.pop_last();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book_with_top() -> OrderBook {
        let mut b = OrderBook::new("ETH-USD");
        b.apply_snapshot(
            &[(dec!(100.00), dec!(1)), (dec!(99.99), dec!(2))],
            &[(dec!(100.01), dec!(1)), (dec!(100.02), dec!(3))],
            Some(10),
        );
        b
    }

    #[test]
    fn snapshot_installs_sorted_sides() {
        let b = book_with_top();
        assert_eq!(b.best_bid(), Some((dec!(100.00), dec!(1))));
        assert_eq!(b.best_ask(), Some((dec!(100.01), dec!(1))));
        assert_eq!(b.bid_levels(), 2);
        assert_eq!(b.ask_levels(), 2);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let mut b = OrderBook::new("ETH-USD");
        let bids = [(dec!(100.00), dec!(1))];
        let asks = [(dec!(100.01), dec!(1))];
        b.apply_snapshot(&bids, &asks, Some(1));
        let first = b.snapshot_top();
        b.apply_snapshot(&bids, &asks, Some(1));
        let second = b.snapshot_top();
        assert_eq!(first.bid_price, second.bid_price);
        assert_eq!(first.ask_price, second.ask_price);
        assert_eq!(b.bid_levels(), 1);
        assert_eq!(b.ask_levels(), 1);
    }

    #[test]
    fn delta_sets_and_removes_levels() {
        let mut b = book_with_top();
        b.apply_delta(BookSide::Bid, dec!(99.98), dec!(5), Some(11)).unwrap();
        assert_eq!(b.bid_levels(), 3);

        // Absolute replacement, not additive.
        b.apply_delta(BookSide::Bid, dec!(99.98), dec!(1), Some(12)).unwrap();
        assert_eq!(b.depth(BookSide::Bid, 3)[2], (dec!(99.98), dec!(1)));

        b.apply_delta(BookSide::Bid, dec!(99.98), dec!(0), Some(13)).unwrap();
        assert_eq!(b.bid_levels(), 2);
    }

    #[test]
    fn stale_sequence_is_dropped() {
        let mut b = book_with_top();
        let r = b.apply_delta(BookSide::Bid, dec!(99.00), dec!(1), Some(10)).unwrap();
        assert_eq!(r, Applied::Stale);
        assert_eq!(b.bid_levels(), 2);
    }

    #[test]
    fn sequence_gap_surfaces_for_resync() {
        let mut b = book_with_top();
        let err = b.apply_delta(BookSide::Bid, dec!(99.00), dec!(1), Some(12)).unwrap_err();
        assert_eq!(err, BookError::SequenceGap { expected: 11, got: 12 });
        // Book unchanged; a fresh snapshot recovers.
        assert_eq!(b.bid_levels(), 2);
        b.apply_snapshot(&[(dec!(101.00), dec!(1))], &[(dec!(101.02), dec!(1))], Some(20));
        assert_eq!(b.best_bid(), Some((dec!(101.00), dec!(1))));
        assert!(b
            .apply_delta(BookSide::Bid, dec!(100.99), dec!(2), Some(21))
            .is_ok());
    }

    #[test]
    fn crossing_update_is_rejected_and_counted() {
        let mut b = book_with_top();
        let err = b.apply_delta(BookSide::Bid, dec!(100.01), dec!(1), Some(11)).unwrap_err();
        assert!(matches!(err, BookError::Crossed { .. }));
        assert_eq!(b.crossed_rejects(), 1);

        let top = b.snapshot_top();
        assert!(top.bid_price < top.ask_price);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut b = book_with_top();
        let err = b.apply_delta(BookSide::Ask, dec!(100.05), dec!(-1), Some(11)).unwrap_err();
        assert!(matches!(err, BookError::InvalidLevel { .. }));
    }

    #[test]
    fn depth_is_capped() {
        let mut b = OrderBook::new("ETH-USD");
        b.apply_snapshot(&[], &[(dec!(200), dec!(1))], Some(0));
        for i in 0..150u32 {
            let px = dec!(100.00) - Decimal::from(i) * dec!(0.01);
            b.apply_delta(BookSide::Bid, px, dec!(1), None).unwrap();
        }
        assert_eq!(b.bid_levels(), 100);
        // Best levels survive the trim.
        assert_eq!(b.best_bid(), Some((dec!(100.00), dec!(1))));
    }

    #[test]
    fn empty_side_yields_invalid_top() {
        let mut b = OrderBook::new("ETH-USD");
        b.apply_snapshot(&[(dec!(100.00), dec!(1))], &[], Some(1));
        let top = b.snapshot_top();
        assert!(!top.is_valid);
    }

    #[test]
    fn spread_bps_uses_midprice() {
        let mut b = OrderBook::new("ETH-USD");
        b.apply_snapshot(&[(dec!(100.00), dec!(1))], &[(dec!(100.01), dec!(1))], Some(1));
        let top = b.snapshot_top();
        assert_eq!(top.spread, dec!(0.01));
        // 0.01 / 100.005 * 10_000 ~= 0.99995 bps
        assert!(top.spread_bps > dec!(0.9999) && top.spread_bps < dec!(1.0));
    }
}
