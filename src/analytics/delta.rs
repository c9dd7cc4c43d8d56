//! Delta & imbalance: signed aggressor-volume imbalance over a trailing
//! window, plus the session-wide cumulative running sum.

use chrono::{Duration, Utc};

use crate::analytics::rolling_state::RollingState;
use crate::models::{DeltaMetrics, EPSILON};

pub fn calculate(state: &RollingState, window_ms: i64) -> DeltaMetrics {
    let cutoff = Utc::now() - Duration::milliseconds(window_ms);
    let (v_buy, v_sell) = state
        .trades
        .iter()
        .filter(|t| t.timestamp > cutoff)
        .fold((0.0, 0.0), |(buy, sell), t| {
            if t.is_buyer_maker {
                (buy, sell + t.quantity)
            } else {
                (buy + t.quantity, sell)
            }
        });

    let (d_bid, d_ask) = match state.latest_book() {
        Some(book) => (book.top_n_bid_depth(5), book.top_n_ask_depth(5)),
        None => (0.0, 0.0),
    };

    let raw_delta = v_buy - v_sell;
    DeltaMetrics {
        raw_delta,
        normalized_delta: raw_delta / (v_buy + v_sell + EPSILON),
        depth_aware_delta: raw_delta / (d_bid + d_ask + EPSILON),
        cumulative_delta: state.cumulative_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trade;

    fn trade(qty: f64, buyer_maker: bool) -> Trade {
        Trade {
            symbol: "BTCUSDT".to_string(),
            price: 100.0,
            quantity: qty,
            timestamp: Utc::now(),
            is_buyer_maker: buyer_maker,
            trade_id: "1".to_string(),
        }
    }

    #[test]
    fn all_buy_volume_normalizes_to_one() {
        let mut state = RollingState::new(14);
        state.add_trade(trade(1.0, false));
        let d = calculate(&state, 1000);
        assert_eq!(d.raw_delta, 1.0);
        assert!((d.normalized_delta - 1.0).abs() < 1e-9);
        assert_eq!(d.cumulative_delta, 1.0);
    }

    #[test]
    fn zero_window_returns_zero_delta() {
        let mut state = RollingState::new(14);
        state.add_trade(trade(1.0, false));
        let d = calculate(&state, 0);
        assert_eq!(d.raw_delta, 0.0);
    }

    #[test]
    fn normalized_delta_is_bounded() {
        let mut state = RollingState::new(14);
        for _ in 0..5 {
            state.add_trade(trade(3.0, false));
        }
        state.add_trade(trade(1.0, true));
        let d = calculate(&state, 1000);
        assert!(d.normalized_delta.abs() <= 1.0);
    }
}
