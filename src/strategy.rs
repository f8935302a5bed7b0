// ===============================
// src/strategy.rs
// ===============================
//
// Quoting policy for continuous two-sided market making. Pure functions, no
// I/O: (top-of-book, inventory, parameters) -> quoting intent. The execution
// worker in quoter.rs expands the intent into an order ladder.
//
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::StrategyConfig;
use crate::domain::{QuoteIntent, Side, TopOfBook};

/// Snap to the tick grid: bids round down, asks round up.
pub fn snap(price: Decimal, tick: Decimal, side: Side) -> Decimal {
    let ticks = price / tick;
    let snapped = match side {
        Side::Buy => ticks.floor(),
        Side::Sell => ticks.ceil(),
    };
    snapped * tick
}

/// Compute the quoting intent for one tick.
///
/// - invalid top of book quotes nothing;
/// - base prices sit `base_offset_ticks` outside the touch;
/// - our own spread is floored at `min_spread_ticks`, recentered on mid;
/// - inventory outside the neutral band skews sizes toward rebalancing and
///   tightens the unloading side by an extra half tick, with a linear size
///   penalty on the side that would grow the position further;
/// - a side is suppressed when its fill would push |position| past the cap.
pub fn compute_intent(top: &TopOfBook, net_position: Decimal, p: &StrategyConfig) -> QuoteIntent {
    if !top.is_valid {
        return QuoteIntent::empty();
    }

    let tick = p.tick_size;
    let mut bid = top.bid_price - p.base_offset_ticks * tick;
    let mut ask = top.ask_price + p.base_offset_ticks * tick;

    let floor = p.min_spread_ticks * tick;
    if ask - bid < floor {
        let mid = top.mid();
        let half = floor / Decimal::TWO;
        bid = mid - half;
        ask = mid + half;
    }

    let mut bid_qty = p.order_qty;
    let mut ask_qty = p.order_qty;

    let pos = net_position;
    if pos.abs() > p.inventory_neutral_band {
        // 1 at the band edge, 0 once |position| reaches twice the band.
        let penalty = (pos.abs() / (p.inventory_neutral_band * Decimal::TWO)).min(Decimal::ONE);
        let size_scale = Decimal::ONE - penalty;

        if pos > Decimal::ZERO {
            bid_qty = bid_qty * dec!(0.5) * size_scale;
            ask_qty *= dec!(1.5);
            ask -= tick / Decimal::TWO;
        } else {
            ask_qty = ask_qty * dec!(0.5) * size_scale;
            bid_qty *= dec!(1.5);
            bid += tick / Decimal::TWO;
        }
    }

    let mut place_bid = bid_qty > Decimal::ZERO;
    let mut place_ask = ask_qty > Decimal::ZERO;

    if (pos + bid_qty).abs() > p.max_position {
        place_bid = false;
    }
    if (pos - ask_qty).abs() > p.max_position {
        place_ask = false;
    }

    QuoteIntent {
        place_bid,
        place_ask,
        bid_price: snap(bid, tick, Side::Buy),
        bid_qty,
        ask_price: snap(ask, tick, Side::Sell),
        ask_qty,
        num_levels: p.num_levels.max(1),
    }
}

/// Expand one side of an intent into a ladder: level k sits k * 0.1 tick
/// further from the touch with size * (1 - 0.1k). Non-positive sizes are
/// dropped.
pub fn ladder(
    side: Side,
    price: Decimal,
    qty: Decimal,
    num_levels: u32,
    tick: Decimal,
) -> Vec<(Decimal, Decimal)> {
    let step = tick * dec!(0.1);
    let mut out = Vec::with_capacity(num_levels as usize);
    for level in 0..num_levels {
        let k = Decimal::from(level);
        let level_qty = qty * (Decimal::ONE - dec!(0.1) * k);
        if level_qty <= Decimal::ZERO {
            continue;
        }
        let raw = match side {
            Side::Buy => price - step * k,
            Side::Sell => price + step * k,
        };
        out.push((snap(raw, tick, side), level_qty));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn params() -> StrategyConfig {
        StrategyConfig {
            tick_size: dec!(0.01),
            base_offset_ticks: dec!(0.25),
            min_spread_ticks: dec!(0.5),
            order_qty: dec!(0.001),
            inventory_neutral_band: dec!(0.01),
            num_levels: 1,
            max_position: dec!(0.05),
            order_refresh_ms: 200,
            order_timeout_s: 1,
            cancel_grace_ms: 500,
            min_qty: dec!(0.001),
            max_qty: dec!(10),
            price_band_pct: dec!(0.05),
        }
    }

    fn top(bid: Decimal, ask: Decimal) -> TopOfBook {
        let spread = ask - bid;
        let mid = (ask + bid) / Decimal::TWO;
        TopOfBook {
            bid_price: bid,
            bid_qty: dec!(1),
            ask_price: ask,
            ask_qty: dec!(1),
            spread,
            spread_bps: spread / mid * dec!(10000),
            ts: Utc::now(),
            seq: 1,
            is_valid: true,
        }
    }

    #[test]
    fn invalid_top_quotes_nothing() {
        let intent = compute_intent(&TopOfBook::invalid(0), Decimal::ZERO, &params());
        assert!(intent.is_empty());
    }

    #[test]
    fn spread_floor_recenters_on_mid() {
        let mut p = params();
        p.min_spread_ticks = dec!(2);
        let intent = compute_intent(&top(dec!(100.00), dec!(100.01)), Decimal::ZERO, &p);

        // Mid 100.005, floor 0.02 wide: bid at or below 99.99, ask at or
        // above 100.02.
        assert!(intent.place_bid && intent.place_ask);
        assert!(intent.bid_price <= dec!(99.99));
        assert!(intent.ask_price >= dec!(100.02));
    }

    #[test]
    fn wide_market_keeps_base_offsets() {
        let intent = compute_intent(&top(dec!(100.00), dec!(100.10)), Decimal::ZERO, &params());
        // 0.25 ticks outside the touch, snapped outward.
        assert_eq!(intent.bid_price, dec!(99.99));
        assert_eq!(intent.ask_price, dec!(100.11));
        assert_eq!(intent.bid_qty, dec!(0.001));
        assert_eq!(intent.ask_qty, dec!(0.001));
    }

    #[test]
    fn long_inventory_skews_toward_selling() {
        let intent = compute_intent(&top(dec!(100.00), dec!(100.10)), dec!(0.02), &params());

        // At twice the neutral band the linear penalty zeroes the bid.
        assert!(!intent.place_bid || intent.bid_qty.is_zero());
        assert!(intent.place_ask);
        assert!(intent.ask_qty > dec!(0.001));
        assert!(intent.ask_price <= dec!(100.10));
    }

    #[test]
    fn short_inventory_is_symmetric() {
        let intent = compute_intent(&top(dec!(100.00), dec!(100.10)), dec!(-0.02), &params());
        assert!(!intent.place_ask || intent.ask_qty.is_zero());
        assert!(intent.place_bid);
        assert!(intent.bid_qty > dec!(0.001));
        assert!(intent.bid_price >= dec!(100.00));
    }

    #[test]
    fn inside_neutral_band_quotes_both_sides_evenly() {
        let intent = compute_intent(&top(dec!(100.00), dec!(100.10)), dec!(0.005), &params());
        assert!(intent.place_bid && intent.place_ask);
        assert_eq!(intent.bid_qty, intent.ask_qty);
    }

    #[test]
    fn side_that_would_breach_the_cap_is_suppressed() {
        let mut p = params();
        p.max_position = dec!(0.0055);
        // Inside the neutral band, so both sizes stay at order_qty; only the
        // bid projection (0.005 + 0.001) breaches the cap.
        let intent = compute_intent(&top(dec!(100.00), dec!(100.10)), dec!(0.005), &p);
        assert!(!intent.place_bid);
        assert!(intent.place_ask);
    }

    #[test]
    fn ladder_steps_out_and_shrinks() {
        let levels = ladder(Side::Sell, dec!(100.02), dec!(0.01), 3, dec!(0.01));
        assert_eq!(levels.len(), 3);
        // Prices never improve on the base level and sizes decay.
        assert!(levels[1].0 >= levels[0].0);
        assert!(levels[2].0 >= levels[1].0);
        assert_eq!(levels[1].1, dec!(0.009));
        assert_eq!(levels[2].1, dec!(0.008));
    }

    #[test]
    fn ladder_drops_non_positive_sizes() {
        let levels = ladder(Side::Buy, dec!(100.00), Decimal::ZERO, 3, dec!(0.01));
        assert!(levels.is_empty());
    }

    #[test]
    fn prices_snap_to_the_tick_grid() {
        assert_eq!(snap(dec!(99.995), dec!(0.01), Side::Buy), dec!(99.99));
        assert_eq!(snap(dec!(100.015), dec!(0.01), Side::Sell), dec!(100.02));
        assert_eq!(snap(dec!(100.02), dec!(0.01), Side::Sell), dec!(100.02));
    }
}
