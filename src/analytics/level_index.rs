//! Two price-keyed maps: aggregated trade activity per price (for
//! absorption) and a time series of displayed size per price (for
//! iceberg/absorption refill detection). Prices are quantized to a fixed
//! number of decimal places so ticks landing on the same quoted price
//! share a key regardless of floating-point representation noise.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

const DEPTH_HISTORY_MAXLEN: usize = 100;

/// Quantizes a price to `decimals` places and returns a hashable integer
/// key. `round(1.005, 2)` and `round(1.0051, 2)` collide on the same key.
pub fn quantize(price: f64, decimals: u32) -> i64 {
    let scale = 10f64.powi(decimals as i32);
    (price * scale).round() as i64
}

pub fn dequantize(key: i64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    key as f64 / scale
}

#[derive(Debug, Default, Clone)]
pub struct HitStats {
    pub hits: u32,
    pub volume: f64,
    pub timestamps: Vec<DateTime<Utc>>,
}

pub struct LevelIndex {
    quantum: u32,
    retention: Duration,
    hit_map: HashMap<i64, HitStats>,
    depth_history: HashMap<i64, Vec<f64>>,
}

impl LevelIndex {
    pub fn new(quantum: u32, retention_seconds: i64) -> Self {
        Self {
            quantum,
            retention: Duration::seconds(retention_seconds),
            hit_map: HashMap::new(),
            depth_history: HashMap::new(),
        }
    }

    pub fn key_for(&self, price: f64) -> i64 {
        quantize(price, self.quantum)
    }

    /// Records a trade's hit at its rounded price, then garbage-collects
    /// every level entry whose timestamps have all aged out of the
    /// retention window.
    pub fn record_trade(&mut self, price: f64, quantity: f64, timestamp: DateTime<Utc>) {
        let key = self.key_for(price);
        let entry = self.hit_map.entry(key).or_default();
        entry.hits += 1;
        entry.volume += quantity;
        entry.timestamps.push(timestamp);

        self.gc(Utc::now());
    }

    fn gc(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.hit_map.retain(|_, stats| {
            stats.timestamps.retain(|t| *t > cutoff);
            !stats.timestamps.is_empty()
        });
    }

    /// Appends the displayed size at `price` to its depth-history series,
    /// truncated to the most recent 100 samples.
    pub fn record_depth(&mut self, price: f64, quantity: f64) {
        let key = self.key_for(price);
        let series = self.depth_history.entry(key).or_default();
        series.push(quantity);
        if series.len() > DEPTH_HISTORY_MAXLEN {
            let excess = series.len() - DEPTH_HISTORY_MAXLEN;
            series.drain(0..excess);
        }
    }

    pub fn hit_volume(&self, price: f64) -> f64 {
        self.hit_map
            .get(&self.key_for(price))
            .map(|s| s.volume)
            .unwrap_or(0.0)
    }

    pub fn hit_stats(&self, price: f64) -> Option<&HitStats> {
        self.hit_map.get(&self.key_for(price))
    }

    pub fn depth_history(&self, price: f64) -> Option<&[f64]> {
        self.depth_history.get(&self.key_for(price)).map(|v| v.as_slice())
    }

    /// Hidden-reserve estimator: refill count / max(series length - 2, 1),
    /// scaled by hit volume at that price. 0 if fewer than 3 depth samples.
    pub fn estimate_hidden_liquidity(&self, price: f64) -> f64 {
        let Some(depths) = self.depth_history(price) else {
            return 0.0;
        };
        if depths.len() < 3 {
            return 0.0;
        }
        let mut refills = 0u32;
        for i in 2..depths.len() {
            if depths[i - 1] < depths[i - 2] && depths[i] > depths[i - 1] {
                refills += 1;
            }
        }
        let v_hit = self.hit_volume(price);
        v_hit * (refills as f64 / (depths.len() - 2).max(1) as f64)
    }

    /// Sum of positive first-differences over sum of |negative
    /// first-differences| in the depth series. 0 if fewer than 3 samples.
    pub fn refill_intensity(&self, price: f64) -> f64 {
        let Some(depths) = self.depth_history(price) else {
            return 0.0;
        };
        if depths.len() < 3 {
            return 0.0;
        }
        let mut refill_magnitude = 0.0;
        let mut consume_magnitude = 0.0;
        for i in 1..depths.len() {
            let diff = depths[i] - depths[i - 1];
            if diff > 0.0 {
                refill_magnitude += diff;
            } else {
                consume_magnitude += diff.abs();
            }
        }
        refill_magnitude / (consume_magnitude + crate::models::EPSILON)
    }

    /// `min(1, (span_seconds * hits) / 60)`. 0 if fewer than 2 hit timestamps.
    pub fn persistence(&self, price: f64) -> f64 {
        let Some(stats) = self.hit_stats(price) else {
            return 0.0;
        };
        if stats.timestamps.len() < 2 {
            return 0.0;
        }
        let span = (*stats.timestamps.last().unwrap() - *stats.timestamps.first().unwrap())
            .num_milliseconds() as f64
            / 1000.0;
        let hits = stats.timestamps.len() as f64;
        (span * hits / 60.0).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_collapses_representation_noise() {
        assert_eq!(quantize(100.004999, 2), quantize(100.005, 2));
    }

    #[test]
    fn gc_removes_stale_entries_relative_to_wall_clock() {
        let mut idx = LevelIndex::new(2, 60);
        let old = Utc::now() - Duration::seconds(120);
        idx.record_trade(100.0, 1.0, old);
        // the only timestamp at this key is already outside the retention
        // window relative to real wall-clock time, so gc removes the key.
        assert_eq!(idx.hit_volume(100.0), 0.0);

        idx.record_trade(100.0, 1.0, Utc::now());
        assert_eq!(idx.hit_volume(100.0), 1.0);
    }

    #[test]
    fn depth_history_truncates_to_100() {
        let mut idx = LevelIndex::new(2, 60);
        for i in 0..150 {
            idx.record_depth(100.0, i as f64);
        }
        assert_eq!(idx.depth_history(100.0).unwrap().len(), 100);
    }

    #[test]
    fn hidden_liquidity_needs_three_samples() {
        let mut idx = LevelIndex::new(2, 60);
        idx.record_depth(100.0, 5.0);
        idx.record_depth(100.0, 1.0);
        assert_eq!(idx.estimate_hidden_liquidity(100.0), 0.0);
        idx.record_depth(100.0, 5.0);
        idx.record_trade(100.0, 10.0, Utc::now());
        assert!(idx.estimate_hidden_liquidity(100.0) > 0.0);
    }
}
