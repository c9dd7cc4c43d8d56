//! Liquidity: VWAP, liquidity zones (levels with outsized displayed size),
//! a coarse volume profile, and premium/discount zone flags relative to VWAP.

use crate::analytics::rolling_state::RollingState;
use crate::models::{LiquidityMetrics, LiquidityZone, VolumeProfileBucket, EPSILON};

const VWAP_SAMPLES: usize = 100;
const VOLUME_PROFILE_SAMPLES: usize = 500;
const VOLUME_PROFILE_BUCKETS: usize = 20;
const ZONE_SIZE_MULTIPLIER: f64 = 1.5;
const PREMIUM_THRESHOLD: f64 = 1.002;
const DISCOUNT_THRESHOLD: f64 = 0.998;

pub fn calculate(state: &RollingState) -> LiquidityMetrics {
    let vwap = calculate_vwap(state);

    let Some(book) = state.latest_book() else {
        return LiquidityMetrics {
            vwap,
            ..LiquidityMetrics::default()
        };
    };

    let top10: Vec<(f64, f64, &str)> = book
        .bids
        .iter()
        .take(10)
        .map(|l| (l.price, l.quantity, "bid"))
        .chain(book.asks.iter().take(10).map(|l| (l.price, l.quantity, "ask")))
        .collect();

    let mean_size = if top10.is_empty() {
        0.0
    } else {
        top10.iter().map(|(_, qty, _)| qty).sum::<f64>() / top10.len() as f64
    };

    let zone_threshold = ZONE_SIZE_MULTIPLIER * mean_size;
    let liquidity_zones: Vec<LiquidityZone> = top10
        .iter()
        .filter(|(_, qty, _)| *qty > zone_threshold)
        .map(|(price, qty, side)| LiquidityZone {
            price: *price,
            side: side.to_string(),
            size: *qty,
        })
        .collect();

    let volume_profile = build_volume_profile(state);

    let price = state.last_price();
    let premium_zone = vwap > EPSILON && price > PREMIUM_THRESHOLD * vwap;
    let discount_zone = vwap > EPSILON && price < DISCOUNT_THRESHOLD * vwap;

    LiquidityMetrics {
        liquidity_zones,
        volume_profile,
        vwap,
        premium_zone,
        discount_zone,
    }
}

fn calculate_vwap(state: &RollingState) -> f64 {
    let n = state.prices.len().min(state.volumes.len()).min(VWAP_SAMPLES);
    if n == 0 {
        return 0.0;
    }
    let prices: Vec<f64> = state.prices.iter().rev().take(n).copied().collect();
    let volumes: Vec<f64> = state.volumes.iter().rev().take(n).copied().collect();

    let mut pv_sum = 0.0;
    let mut v_sum = 0.0;
    for (p, v) in prices.iter().zip(volumes.iter()) {
        pv_sum += p * v;
        v_sum += v;
    }
    pv_sum / (v_sum + EPSILON)
}

fn build_volume_profile(state: &RollingState) -> Vec<VolumeProfileBucket> {
    let n = state.prices.len().min(VOLUME_PROFILE_SAMPLES);
    if n == 0 {
        return Vec::new();
    }
    let prices: Vec<f64> = state.prices.iter().rev().take(n).copied().collect();
    let volumes: Vec<f64> = state.volumes.iter().rev().take(n).copied().collect();

    let lo = prices.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return vec![VolumeProfileBucket {
            price_low: lo,
            price_high: hi,
            volume: volumes.iter().sum(),
        }];
    }

    let bucket_width = (hi - lo) / VOLUME_PROFILE_BUCKETS as f64;
    let mut buckets = vec![0.0f64; VOLUME_PROFILE_BUCKETS];
    for (i, &p) in prices.iter().enumerate() {
        let vol = volumes.get(i).copied().unwrap_or(0.0);
        let mut idx = ((p - lo) / bucket_width) as usize;
        if idx >= VOLUME_PROFILE_BUCKETS {
            idx = VOLUME_PROFILE_BUCKETS - 1;
        }
        buckets[idx] += vol;
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(i, volume)| VolumeProfileBucket {
            price_low: lo + i as f64 * bucket_width,
            price_high: lo + (i + 1) as f64 * bucket_width,
            volume,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderBook, OrderBookLevel, Trade};
    use chrono::Utc;

    fn trade(price: f64, qty: f64) -> Trade {
        Trade {
            symbol: "BTCUSDT".to_string(),
            price,
            quantity: qty,
            timestamp: Utc::now(),
            is_buyer_maker: false,
            trade_id: "1".to_string(),
        }
    }

    #[test]
    fn vwap_is_volume_weighted() {
        let mut state = RollingState::new(14);
        state.add_trade(trade(100.0, 1.0));
        state.add_trade(trade(200.0, 1.0));
        let metrics = calculate(&state);
        assert!((metrics.vwap - 150.0).abs() < 1e-6);
    }

    #[test]
    fn empty_state_returns_neutral() {
        let state = RollingState::new(14);
        let metrics = calculate(&state);
        assert_eq!(metrics.vwap, 0.0);
        assert!(metrics.liquidity_zones.is_empty());
        assert!(!metrics.premium_zone);
        assert!(!metrics.discount_zone);
    }

    #[test]
    fn large_level_is_a_liquidity_zone() {
        let mut state = RollingState::new(14);
        state.add_trade(trade(100.0, 1.0));
        let book = OrderBook::from_levels(
            "BTCUSDT".to_string(),
            Utc::now(),
            vec![
                OrderBookLevel { price: 99.9, quantity: 500.0, orders_count: 1 },
                OrderBookLevel { price: 99.8, quantity: 5.0, orders_count: 1 },
            ],
            vec![OrderBookLevel { price: 100.1, quantity: 5.0, orders_count: 1 }],
        );
        state.add_book(book);
        let metrics = calculate(&state);
        assert!(metrics.liquidity_zones.iter().any(|z| z.price == 99.9));
    }

    #[test]
    fn premium_and_discount_flags_relative_to_vwap() {
        let mut state = RollingState::new(14);
        for _ in 0..10 {
            state.add_trade(trade(100.0, 1.0));
        }
        let book = OrderBook::from_levels(
            "BTCUSDT".to_string(),
            Utc::now(),
            vec![OrderBookLevel { price: 102.0, quantity: 5.0, orders_count: 1 }],
            vec![OrderBookLevel { price: 102.1, quantity: 5.0, orders_count: 1 }],
        );
        state.add_book(book);
        state.prices.push_back(102.05);
        let metrics = calculate(&state);
        assert!(metrics.premium_zone);
        assert!(!metrics.discount_zone);
    }
}
