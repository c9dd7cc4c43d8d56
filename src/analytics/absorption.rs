//! Absorption: how much aggressor volume a displayed level has absorbed
//! without giving way, blended with an estimate of hidden reserve behind it.

use crate::analytics::level_index::LevelIndex;
use crate::analytics::rolling_state::RollingState;
use crate::models::{AbsorptionLevel, AbsorptionMetrics, EPSILON};

const REPORT_THRESHOLD: f64 = 0.30;

pub fn calculate(state: &RollingState, levels: &LevelIndex) -> AbsorptionMetrics {
    let Some(book) = state.latest_book() else {
        return AbsorptionMetrics::default();
    };

    let mut absorption_levels = Vec::new();
    let mut max_bid_absorption = 0.0f64;
    let mut max_ask_absorption = 0.0f64;

    for level in book.bids.iter().take(10) {
        if let Some((score, strength)) = score_level(levels, level.price, level.quantity) {
            absorption_levels.push(AbsorptionLevel {
                price: round2(level.price),
                side: "bid".to_string(),
                score,
                strength,
                volume_hit: levels.hit_volume(level.price),
            });
            max_bid_absorption = max_bid_absorption.max(strength);
        }
    }

    for level in book.asks.iter().take(10) {
        if let Some((score, strength)) = score_level(levels, level.price, level.quantity) {
            absorption_levels.push(AbsorptionLevel {
                price: round2(level.price),
                side: "ask".to_string(),
                score,
                strength,
                volume_hit: levels.hit_volume(level.price),
            });
            max_ask_absorption = max_ask_absorption.max(strength);
        }
    }

    let (overall_score, overall_strength) = if absorption_levels.is_empty() {
        (0.0, 0.0)
    } else {
        let n = absorption_levels.len() as f64;
        (
            absorption_levels.iter().map(|l| l.score).sum::<f64>() / n,
            absorption_levels.iter().map(|l| l.strength).sum::<f64>() / n,
        )
    };

    AbsorptionMetrics {
        score: overall_score,
        strength: overall_strength,
        bid_absorption: max_bid_absorption,
        ask_absorption: max_ask_absorption,
        absorption_levels,
    }
}

/// Returns `(score, strength)` only if the level has actually been hit by
/// trades (mirroring the reference's "price in level_hits" guard) and the
/// score clears the reporting threshold.
fn score_level(levels: &LevelIndex, price: f64, displayed_qty: f64) -> Option<(f64, f64)> {
    let v_hit = levels.hit_stats(price)?.volume;
    let l_vis = displayed_qty;
    let l_res = levels.estimate_hidden_liquidity(price);

    let score = v_hit / (v_hit + l_vis + EPSILON);
    let strength = (v_hit + l_res) / (v_hit + l_vis + l_res + EPSILON);

    (score > REPORT_THRESHOLD).then_some((score, strength))
}

fn round2(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderBook, OrderBookLevel, Trade};
    use chrono::Utc;

    #[test]
    fn absorption_reported_when_hit_volume_dominates() {
        let mut state = RollingState::new(14);
        let mut levels = LevelIndex::new(2, 60);

        for _ in 0..40 {
            let buyer_maker = false;
            state.add_trade(Trade {
                symbol: "BTCUSDT".to_string(),
                price: 100.0,
                quantity: 1.0,
                timestamp: Utc::now(),
                is_buyer_maker: buyer_maker,
                trade_id: "1".to_string(),
            });
            levels.record_trade(100.0, 1.0, Utc::now());
        }

        let book = OrderBook::from_levels(
            "BTCUSDT".to_string(),
            Utc::now(),
            vec![OrderBookLevel { price: 100.0, quantity: 5.0, orders_count: 1 }],
            vec![OrderBookLevel { price: 100.05, quantity: 5.0, orders_count: 1 }],
        );
        state.add_book(book);

        let metrics = calculate(&state, &levels);
        assert!(!metrics.absorption_levels.is_empty());
        let bid_level = metrics
            .absorption_levels
            .iter()
            .find(|l| l.side == "bid")
            .unwrap();
        assert!((bid_level.score - 40.0 / 45.0).abs() < 1e-6);
    }

    #[test]
    fn empty_book_returns_neutral() {
        let state = RollingState::new(14);
        let levels = LevelIndex::new(2, 60);
        let metrics = calculate(&state, &levels);
        assert_eq!(metrics.score, 0.0);
        assert!(metrics.absorption_levels.is_empty());
    }
}
