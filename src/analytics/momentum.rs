//! Order-Flow Momentum Burst Index: normalized delta scaled by tape speed
//! and deflated by spread (and, for the volatility-normalized variant, ATR).

use chrono::{Duration, Utc};

use crate::analytics::delta;
use crate::analytics::rolling_state::RollingState;
use crate::models::{MomentumMetrics, EPSILON};

pub fn calculate(state: &RollingState, window_ms: i64) -> MomentumMetrics {
    let delta_metrics = delta::calculate(state, window_ms);

    let cutoff = Utc::now() - Duration::milliseconds(window_ms);
    let recent: Vec<_> = state.trades.iter().filter(|t| t.timestamp > cutoff).collect();

    let window_secs = window_ms as f64 / 1000.0;
    let tape_speed = if window_ms > 0 {
        recent.len() as f64 / window_secs
    } else {
        0.0
    };
    let volume_velocity = if recent.is_empty() || window_ms <= 0 {
        0.0
    } else {
        recent.iter().map(|t| t.quantity).sum::<f64>() / window_secs
    };

    let spread = match state.latest_book() {
        Some(book) => book.spread,
        None => {
            if state.median_spread > 0.0 {
                state.median_spread
            } else {
                0.01
            }
        }
    };

    let atr = state.current_atr();
    let ofmbi = (delta_metrics.normalized_delta * tape_speed) / (spread + EPSILON);
    let ofmbi_vol_normalized = (delta_metrics.normalized_delta * tape_speed) / (spread * atr + EPSILON);

    MomentumMetrics {
        ofmbi,
        ofmbi_vol_normalized,
        tape_speed,
        volume_velocity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderBook, OrderBookLevel, Trade};
    use chrono::Utc;

    #[test]
    fn buy_burst_produces_large_positive_ofmbi() {
        let mut state = RollingState::new(14);
        for _ in 0..50 {
            state.add_trade(Trade {
                symbol: "BTCUSDT".to_string(),
                price: 100.0,
                quantity: 1.0,
                timestamp: Utc::now(),
                is_buyer_maker: false,
                trade_id: "1".to_string(),
            });
        }
        let book = OrderBook::from_levels(
            "BTCUSDT".to_string(),
            Utc::now(),
            vec![OrderBookLevel { price: 99.99, quantity: 100.0, orders_count: 1 }],
            vec![OrderBookLevel { price: 100.01, quantity: 100.0, orders_count: 1 }],
        );
        state.add_book(book);

        let m = calculate(&state, 500);
        assert!(m.ofmbi > 1000.0);
    }

    #[test]
    fn no_trades_gives_zero_velocity() {
        let state = RollingState::new(14);
        let m = calculate(&state, 1000);
        assert_eq!(m.volume_velocity, 0.0);
        assert_eq!(m.tape_speed, 0.0);
    }
}
