// ===============================
// src/ledger.rs (position, VWAP entry, realized PnL)
// ===============================
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use crate::domain::{Fill, Side};

/// Outcome of one ledger mutation, forwarded to the risk supervisor so it can
/// maintain peak/drawdown without re-reading the ledger.
#[derive(Debug, Clone, Copy)]
pub struct PnlDelta {
    pub realized_delta: Decimal,
    pub net_position: Decimal,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct LedgerState {
    pub net_position: Decimal,
    pub vwap_entry_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub last_mid: Decimal,
    pub buy_trades: u64,
    pub sell_trades: u64,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub min_spread_bps: Option<Decimal>,
    pub max_spread_bps: Option<Decimal>,
    pub session_start: DateTime<Utc>,
}

impl LedgerState {
    fn new() -> Self {
        Self {
            net_position: Decimal::ZERO,
            vwap_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            last_mid: Decimal::ZERO,
            buy_trades: 0,
            sell_trades: 0,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            min_spread_bps: None,
            max_spread_bps: None,
            session_start: Utc::now(),
        }
    }
}

/// Sole writer of position, entry VWAP, realized PnL and session counters.
/// Every mutation happens under one critical section so two fills can never
/// observe the same previous position.
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::new()),
        }
    }

    /// Apply one fill. Reductions realize PnL against the entry VWAP; a fill
    /// that crosses zero closes the open quantity first and re-opens the
    /// remainder at the fill price.
    pub fn apply_fill(&self, fill: &Fill) -> PnlDelta {
        let mut st = self.state.lock().expect("ledger lock");

        let signed_qty = fill.side.signed(fill.qty);
        let prev = st.net_position;
        let next = prev + signed_qty;

        let mut realized = Decimal::ZERO;

        let increases = prev.is_zero() || prev.signum() == signed_qty.signum();
        if increases {
            // Same direction: blend the entry VWAP.
            st.vwap_entry_price = if prev.is_zero() {
                fill.price
            } else {
                (st.vwap_entry_price * prev.abs() + fill.qty * fill.price) / next.abs()
            };
        } else {
            // Opposite direction: realize on the closed quantity.
            let closed = fill.qty.min(prev.abs());
            realized = if prev > Decimal::ZERO {
                (fill.price - st.vwap_entry_price) * closed
            } else {
                (st.vwap_entry_price - fill.price) * closed
            };
            st.realized_pnl += realized;

            if next.is_zero() {
                st.vwap_entry_price = Decimal::ZERO;
            } else if prev.signum() != next.signum() {
                // Crossed zero: the leftover quantity opened at this fill.
                st.vwap_entry_price = fill.price;
            }
        }

        st.net_position = next;

        match fill.side {
            Side::Buy => {
                st.buy_trades += 1;
                st.buy_volume += fill.qty;
            }
            Side::Sell => {
                st.sell_trades += 1;
                st.sell_volume += fill.qty;
            }
        }

        if !st.last_mid.is_zero() {
            st.unrealized_pnl = (st.last_mid - st.vwap_entry_price) * st.net_position;
        }

        PnlDelta {
            realized_delta: realized,
            net_position: st.net_position,
            realized_pnl: st.realized_pnl,
        }
    }

    /// Mark the open position against the latest mid.
    pub fn mark_to_market(&self, mid: Decimal) {
        let mut st = self.state.lock().expect("ledger lock");
        st.last_mid = mid;
        st.unrealized_pnl = if st.net_position.is_zero() {
            Decimal::ZERO
        } else {
            (mid - st.vwap_entry_price) * st.net_position
        };
    }

    /// Track min/max spread seen this session (captured at submission time).
    pub fn observe_spread(&self, spread_bps: Decimal) {
        let mut st = self.state.lock().expect("ledger lock");
        st.min_spread_bps = Some(st.min_spread_bps.map_or(spread_bps, |m| m.min(spread_bps)));
        st.max_spread_bps = Some(st.max_spread_bps.map_or(spread_bps, |m| m.max(spread_bps)));
    }

    pub fn net_position(&self) -> Decimal {
        self.state.lock().expect("ledger lock").net_position
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.state.lock().expect("ledger lock").realized_pnl
    }

    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().expect("ledger lock").clone()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: Side, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            client_order_id: "t".to_string(),
            side,
            qty,
            price,
            ts: Utc::now(),
        }
    }

    #[test]
    fn round_trip_realizes_the_spread() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(0.01), dec!(100.00)));
        let d = ledger.apply_fill(&fill(Side::Sell, dec!(0.01), dec!(100.50)));

        assert_eq!(d.net_position, Decimal::ZERO);
        assert_eq!(d.realized_delta, dec!(0.005));
        assert_eq!(ledger.realized_pnl(), dec!(0.005));
    }

    #[test]
    fn buys_blend_the_entry_vwap() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(1), dec!(100)));
        ledger.apply_fill(&fill(Side::Buy, dec!(1), dec!(102)));
        let st = ledger.snapshot();
        assert_eq!(st.net_position, dec!(2));
        assert_eq!(st.vwap_entry_price, dec!(101));
        assert_eq!(st.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn partial_reduction_keeps_vwap() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(2), dec!(100)));
        let d = ledger.apply_fill(&fill(Side::Sell, dec!(1), dec!(103)));
        assert_eq!(d.realized_delta, dec!(3));
        let st = ledger.snapshot();
        assert_eq!(st.net_position, dec!(1));
        assert_eq!(st.vwap_entry_price, dec!(100));
    }

    #[test]
    fn short_side_is_symmetric() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Sell, dec!(1), dec!(100)));
        let st = ledger.snapshot();
        assert_eq!(st.net_position, dec!(-1));
        assert_eq!(st.vwap_entry_price, dec!(100));

        let d = ledger.apply_fill(&fill(Side::Buy, dec!(1), dec!(99)));
        assert_eq!(d.realized_delta, dec!(1));
        assert_eq!(d.net_position, Decimal::ZERO);
    }

    #[test]
    fn crossing_zero_reopens_at_fill_price() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(1), dec!(100)));
        let d = ledger.apply_fill(&fill(Side::Sell, dec!(3), dec!(101)));

        // Closed 1 @ +1, remainder opened short 2 @ 101.
        assert_eq!(d.realized_delta, dec!(1));
        let st = ledger.snapshot();
        assert_eq!(st.net_position, dec!(-2));
        assert_eq!(st.vwap_entry_price, dec!(101));
    }

    #[test]
    fn fills_sum_to_net_position() {
        let ledger = Ledger::new();
        let fills = [
            fill(Side::Buy, dec!(0.5), dec!(10)),
            fill(Side::Sell, dec!(0.2), dec!(11)),
            fill(Side::Buy, dec!(0.1), dec!(9)),
            fill(Side::Sell, dec!(0.6), dec!(10)),
        ];
        let mut expected = Decimal::ZERO;
        for f in &fills {
            expected += f.side.signed(f.qty);
            ledger.apply_fill(f);
        }
        assert_eq!(ledger.net_position(), expected);
    }

    #[test]
    fn spread_range_tracks_min_and_max() {
        let ledger = Ledger::new();
        ledger.observe_spread(dec!(2.5));
        ledger.observe_spread(dec!(1.0));
        ledger.observe_spread(dec!(4.0));
        let st = ledger.snapshot();
        assert_eq!(st.min_spread_bps, Some(dec!(1.0)));
        assert_eq!(st.max_spread_bps, Some(dec!(4.0)));
    }

    #[test]
    fn mark_to_market_updates_unrealized() {
        let ledger = Ledger::new();
        ledger.apply_fill(&fill(Side::Buy, dec!(2), dec!(100)));
        ledger.mark_to_market(dec!(101));
        assert_eq!(ledger.snapshot().unrealized_pnl, dec!(2));
        ledger.mark_to_market(dec!(99));
        assert_eq!(ledger.snapshot().unrealized_pnl, dec!(-2));
    }
}
