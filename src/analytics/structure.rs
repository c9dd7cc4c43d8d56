//! Regime and structure-break detection: swing points, trend direction,
//! volatility/persistence regime classification, BOS/CHOCH, and
//! trendline-rejection probability.

use crate::analytics::delta;
use crate::analytics::rolling_state::RollingState;
use crate::models::{MarketRegime, StructureMetrics, TrendDirection, TrpCoeffs, EPSILON};

const SWING_LOOKBACK: usize = 5;
const MIN_PRICES_FOR_STRUCTURE: usize = 20;

pub fn calculate(state: &RollingState, trp_coeffs: &TrpCoeffs, default_window_ms: i64) -> StructureMetrics {
    let prices: Vec<f64> = state.prices.iter().copied().collect();
    if prices.len() < MIN_PRICES_FOR_STRUCTURE {
        return StructureMetrics::default();
    }

    let swing_highs = detect_swing_highs(&prices);
    let swing_lows = detect_swing_lows(&prices);
    let trend = determine_trend(&swing_highs, &swing_lows);
    let regime = detect_regime(&prices);
    let (bos, choch) = detect_structure_breaks(&prices, &swing_highs, &swing_lows, trend);
    let trp = trendline_rejection(state, &prices, &swing_highs, &swing_lows, trp_coeffs, default_window_ms);

    StructureMetrics {
        regime,
        trend_direction: trend,
        swing_highs: last_n(&swing_highs, 5),
        swing_lows: last_n(&swing_lows, 5),
        support_levels: last_n(&swing_lows, 3),
        resistance_levels: last_n(&swing_highs, 3),
        bos_detected: bos,
        choch_detected: choch,
        trendline_rejection_probability: trp,
    }
}

fn last_n(v: &[f64], n: usize) -> Vec<f64> {
    let start = v.len().saturating_sub(n);
    v[start..].to_vec()
}

fn detect_swing_highs(prices: &[f64]) -> Vec<f64> {
    let l = SWING_LOOKBACK;
    let mut out = Vec::new();
    if prices.len() <= 2 * l {
        return out;
    }
    for i in l..(prices.len() - l) {
        let window = &prices[i - l..=i + l];
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if prices[i] == max {
            out.push(prices[i]);
        }
    }
    out
}

fn detect_swing_lows(prices: &[f64]) -> Vec<f64> {
    let l = SWING_LOOKBACK;
    let mut out = Vec::new();
    if prices.len() <= 2 * l {
        return out;
    }
    for i in l..(prices.len() - l) {
        let window = &prices[i - l..=i + l];
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
        if prices[i] == min {
            out.push(prices[i]);
        }
    }
    out
}

fn determine_trend(highs: &[f64], lows: &[f64]) -> TrendDirection {
    if highs.len() < 2 || lows.len() < 2 {
        return TrendDirection::Neutral;
    }
    let hh = highs[highs.len() - 1] > highs[highs.len() - 2];
    let hl = lows[lows.len() - 1] > lows[lows.len() - 2];
    let lh = highs[highs.len() - 1] < highs[highs.len() - 2];
    let ll = lows[lows.len() - 1] < lows[lows.len() - 2];

    if hh && hl {
        TrendDirection::Up
    } else if lh && ll {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    }
}

fn detect_regime(prices: &[f64]) -> MarketRegime {
    if prices.len() < MIN_PRICES_FOR_STRUCTURE {
        return MarketRegime::Range;
    }
    let returns: Vec<f64> = prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let volatility = stdev(&returns);
    let mean_abs = returns.iter().map(|r| r.abs()).sum::<f64>() / returns.len() as f64;

    let persistence = if returns.len() > 1 {
        corr(&returns[..returns.len() - 1], &returns[1..])
    } else {
        0.0
    };

    if volatility > mean_abs * 3.0 {
        MarketRegime::Spike
    } else if persistence.abs() > 0.3 {
        MarketRegime::Trend
    } else if persistence < -0.2 {
        MarketRegime::MeanRevert
    } else {
        MarketRegime::Range
    }
}

fn detect_structure_breaks(
    prices: &[f64],
    highs: &[f64],
    lows: &[f64],
    trend: TrendDirection,
) -> (bool, bool) {
    if prices.len() < 3 {
        return (false, false);
    }
    let current = *prices.last().unwrap();

    let mut bos = false;
    let mut choch = false;

    match trend {
        TrendDirection::Up => {
            if let Some(m) = extremum(highs, 3, f64::max) {
                bos = current > m;
            }
            if let Some(m) = extremum(lows, 2, f64::min) {
                choch = current < m;
            }
        }
        TrendDirection::Down => {
            if let Some(m) = extremum(lows, 3, f64::min) {
                bos = current < m;
            }
            if let Some(m) = extremum(highs, 2, f64::max) {
                choch = current > m;
            }
        }
        TrendDirection::Neutral => {}
    }

    (bos, choch)
}

fn extremum(values: &[f64], last_n_count: usize, f: fn(f64, f64) -> f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let start = values.len().saturating_sub(last_n_count);
    Some(values[start..].iter().copied().fold(values[start], f))
}

fn trendline_rejection(
    state: &RollingState,
    prices: &[f64],
    highs: &[f64],
    lows: &[f64],
    coeffs: &TrpCoeffs,
    default_window_ms: i64,
) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let current = *prices.last().unwrap();
    let atr = state.current_atr();

    let candidates: Vec<f64> = last_n(highs, 3).into_iter().chain(last_n(lows, 3)).collect();
    let mut trendline_level = None;
    let mut min_distance = f64::INFINITY;
    for level in candidates {
        let distance = (current - level).abs();
        if distance < min_distance {
            min_distance = distance;
            trendline_level = Some(level);
        }
    }
    let Some(trendline_level) = trendline_level else {
        return 0.0;
    };

    let distance_normalized = min_distance / (coeffs.lambda * atr + EPSILON);
    let trp_dist = 1.0 - distance_normalized.min(1.0);

    let normalized_delta = delta::calculate(state, default_window_ms).normalized_delta;
    let rej_flow = if current > trendline_level {
        -normalized_delta
    } else {
        normalized_delta
    };

    let z = coeffs.b0 + coeffs.b1 * rej_flow;
    let rej_factor = 1.0 / (1.0 + (-z).exp());

    trp_dist * rej_factor
}

fn stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn corr(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
    let denom = (var_a * var_b).sqrt();
    if denom < EPSILON {
        0.0
    } else {
        cov / denom
    }
}
