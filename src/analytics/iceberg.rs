//! Iceberg detection: a logistic model over fill-to-display ratio, refill
//! intensity, and persistence, applied per level and aggregated.

use crate::analytics::level_index::LevelIndex;
use crate::analytics::rolling_state::RollingState;
use crate::models::{IcebergCoeffs, IcebergLevel, IcebergMetrics, EPSILON};

const REPORT_THRESHOLD: f64 = 0.5;

pub fn calculate(state: &RollingState, levels: &LevelIndex, coeffs: &IcebergCoeffs) -> IcebergMetrics {
    let Some(book) = state.latest_book() else {
        return IcebergMetrics::default();
    };

    let mut detected = Vec::new();
    let mut max_probability = 0.0f64;

    let sides: [(_, &str); 2] = [(&book.bids, "bid"), (&book.asks, "ask")];
    for (side_levels, side_name) in sides {
        for level in side_levels.iter().take(10) {
            let v_exec = levels.hit_volume(level.price);
            let l_disp = level.quantity;
            let fdr = v_exec / (l_disp + EPSILON);
            let r_refill = levels.refill_intensity(level.price);
            let t_persist = levels.persistence(level.price);

            let z = coeffs.a0 + coeffs.a1 * fdr + coeffs.a2 * r_refill + coeffs.a3 * t_persist;
            let probability = sigmoid(z);

            if probability > REPORT_THRESHOLD {
                detected.push(IcebergLevel {
                    price: round2(level.price),
                    side: side_name.to_string(),
                    probability,
                    fdr,
                    estimated_hidden: (v_exec - l_disp).max(0.0),
                });
                max_probability = max_probability.max(probability);
            }
        }
    }

    // Aggregate fdr/refill/persistence are independent means over the top
    // 5 levels per side, decoupled from which level attained the maximum
    // detection probability (see SPEC_FULL.md Open Question 1).
    let top5: Vec<(f64, f64)> = book
        .bids
        .iter()
        .take(5)
        .chain(book.asks.iter().take(5))
        .map(|l| (l.price, l.quantity))
        .collect();

    let fill_to_display_ratio = mean(top5.iter().map(|(price, qty)| {
        let v_exec = levels.hit_volume(*price);
        v_exec / (qty + EPSILON)
    }));
    let refill_intensity = mean(top5.iter().map(|(price, _)| levels.refill_intensity(*price)));
    let persistence_score = mean(top5.iter().map(|(price, _)| levels.persistence(*price)));

    IcebergMetrics {
        probability: max_probability,
        fill_to_display_ratio,
        refill_intensity,
        persistence_score,
        detected_levels: detected,
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
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
    fn refill_pattern_drives_probability_high() {
        let mut state = RollingState::new(14);
        let mut levels = LevelIndex::new(2, 60);

        for d in [5.0, 1.0, 5.0, 1.0, 5.0, 1.0] {
            levels.record_depth(100.0, d);
        }
        for _ in 0..60 {
            levels.record_trade(100.0, 1.0, Utc::now());
        }
        state.add_trade(Trade {
            symbol: "BTCUSDT".to_string(),
            price: 100.0,
            quantity: 1.0,
            timestamp: Utc::now(),
            is_buyer_maker: false,
            trade_id: "1".to_string(),
        });

        let book = OrderBook::from_levels(
            "BTCUSDT".to_string(),
            Utc::now(),
            vec![OrderBookLevel { price: 100.0, quantity: 5.0, orders_count: 1 }],
            vec![OrderBookLevel { price: 101.0, quantity: 5.0, orders_count: 1 }],
        );
        state.add_book(book);

        let metrics = calculate(&state, &levels, &IcebergCoeffs::default());
        assert!(metrics.probability > 0.9);
        assert!(!metrics.detected_levels.is_empty());
    }

    #[test]
    fn empty_book_returns_neutral() {
        let state = RollingState::new(14);
        let levels = LevelIndex::new(2, 60);
        let metrics = calculate(&state, &levels, &IcebergCoeffs::default());
        assert_eq!(metrics.probability, 0.0);
    }
}
