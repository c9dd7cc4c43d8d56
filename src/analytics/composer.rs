//! Composer: normalizes each metric family to a bounded contribution,
//! combines them with configurable weights into the HFSS score, converts
//! that score to a three-way probability distribution, and renders the
//! categorical decision plus a human-readable reason string.

use crate::models::{
    AbsorptionMetrics, DeltaMetrics, IcebergMetrics, MomentumMetrics, SignalBreakdown,
    SignalType, StructureMetrics, TrendDirection,
};

/// All inputs the composer needs beyond the six metric families: the
/// current/median spread and ATR used for the spread-penalty term.
pub struct SpreadContext {
    pub spread: f64,
    pub median_spread: f64,
    pub atr: f64,
    pub median_atr: f64,
}

pub struct ComposedSignal {
    pub hfss: f64,
    pub probability_buy: f64,
    pub probability_sell: f64,
    pub probability_no_trade: f64,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub breakdown: SignalBreakdown,
    pub reason: String,
}

const BUY_SELL_THRESHOLD: f64 = 0.45;
const SOFTMAX_SCALE: f64 = 3.0;

pub fn compose(
    delta: &DeltaMetrics,
    absorption: &AbsorptionMetrics,
    iceberg: &IcebergMetrics,
    momentum: &MomentumMetrics,
    structure: &StructureMetrics,
    spread_ctx: &SpreadContext,
    weights: &crate::models::SignalWeights,
) -> ComposedSignal {
    let delta_contribution = clip(delta.normalized_delta, -1.0, 1.0);
    let absorption_contribution = clip(absorption.bid_absorption - absorption.ask_absorption, -1.0, 1.0);
    let iceberg_contribution = 0.5 * iceberg.probability;
    let momentum_contribution = clip(momentum.ofmbi / 100.0, -1.0, 1.0);
    let structure_contribution = structure_contribution(structure);
    let spread_penalty = spread_penalty(spread_ctx);

    let hfss = weights.delta_weight * delta_contribution
        + weights.absorption_weight * absorption_contribution
        + weights.iceberg_weight * iceberg_contribution
        + weights.ofmbi_weight * momentum_contribution
        + weights.structure_weight * structure_contribution
        - weights.spread_penalty_weight * spread_penalty;

    let (p_buy, p_sell, p_none) = softmax3(SOFTMAX_SCALE * hfss, -SOFTMAX_SCALE * hfss, 0.0);

    let signal_type = if p_buy > BUY_SELL_THRESHOLD && p_buy > p_sell {
        SignalType::Buy
    } else if p_sell > BUY_SELL_THRESHOLD && p_sell > p_buy {
        SignalType::Sell
    } else {
        SignalType::NoTrade
    };

    let confidence = match signal_type {
        SignalType::Buy => p_buy,
        SignalType::Sell => p_sell,
        SignalType::NoTrade => p_none,
    };

    let breakdown = SignalBreakdown {
        delta_contribution: weights.delta_weight * delta_contribution,
        absorption_contribution: weights.absorption_weight * absorption_contribution,
        iceberg_contribution: weights.iceberg_weight * iceberg_contribution,
        momentum_contribution: weights.ofmbi_weight * momentum_contribution,
        structure_contribution: weights.structure_weight * structure_contribution,
        spread_penalty: weights.spread_penalty_weight * spread_penalty,
    };

    let reason = build_reason(delta, absorption, iceberg, momentum, structure);

    ComposedSignal {
        hfss,
        probability_buy: p_buy,
        probability_sell: p_sell,
        probability_no_trade: p_none,
        signal_type,
        confidence,
        breakdown,
        reason,
    }
}

fn structure_contribution(structure: &StructureMetrics) -> f64 {
    let sign = match structure.trend_direction {
        TrendDirection::Up => 1.0,
        TrendDirection::Down => -1.0,
        TrendDirection::Neutral => 0.0,
    };
    let mut contribution = if structure.bos_detected {
        0.8 * sign
    } else {
        0.5 * sign
    };
    if structure.choch_detected {
        contribution *= -0.5;
    }
    contribution
}

fn spread_penalty(ctx: &SpreadContext) -> f64 {
    if ctx.median_spread <= 0.0 {
        return 0.0;
    }
    let ratio = (ctx.spread / ctx.median_spread) * (ctx.atr / (ctx.median_atr + crate::models::EPSILON));
    ratio.min(1.0).max(0.0)
}

fn clip(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Three-way softmax; monotone in `x` for the first logit, and in `-x` for
/// the second, with the third maximized at `x = 0`.
fn softmax3(a: f64, b: f64, c: f64) -> (f64, f64, f64) {
    let m = a.max(b).max(c);
    let ea = (a - m).exp();
    let eb = (b - m).exp();
    let ec = (c - m).exp();
    let sum = ea + eb + ec;
    (ea / sum, eb / sum, ec / sum)
}

fn build_reason(
    delta: &DeltaMetrics,
    absorption: &AbsorptionMetrics,
    iceberg: &IcebergMetrics,
    momentum: &MomentumMetrics,
    structure: &StructureMetrics,
) -> String {
    let mut fragments = Vec::new();

    if delta.normalized_delta.abs() > 0.3 {
        let side = if delta.normalized_delta > 0.0 { "buy" } else { "sell" };
        fragments.push(format!("strong {side}-side delta ({:.2})", delta.normalized_delta));
    }
    if absorption.strength > 0.3 {
        fragments.push(format!("absorption detected (strength {:.2})", absorption.strength));
    }
    if iceberg.probability > 0.5 {
        fragments.push(format!("iceberg probability {:.2}", iceberg.probability));
    }
    if momentum.ofmbi.abs() > 10.0 {
        fragments.push(format!("momentum burst (OFMBI {:.1})", momentum.ofmbi));
    }
    if structure.bos_detected {
        fragments.push("break of structure".to_string());
    }
    if structure.choch_detected {
        fragments.push("change of character".to_string());
    }

    if fragments.is_empty() {
        "no significant order-flow signal".to_string()
    } else {
        fragments.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalWeights;

    fn neutral_spread_ctx() -> SpreadContext {
        SpreadContext {
            spread: 0.0,
            median_spread: 0.0,
            atr: 0.0,
            median_atr: 0.0,
        }
    }

    #[test]
    fn softmax_sums_to_one_and_is_monotone() {
        let (b1, s1, n1) = softmax3(3.0, -3.0, 0.0);
        assert!((b1 + s1 + n1 - 1.0).abs() < 1e-9);
        let (b2, s2, _) = softmax3(6.0, -6.0, 0.0);
        assert!(b2 > b1);
        assert!(s2 < s1);
        let (_, _, n_at_zero) = softmax3(0.0, 0.0, 0.0);
        let (_, _, n_at_nonzero) = softmax3(1.0, -1.0, 0.0);
        assert!(n_at_zero > n_at_nonzero);
    }

    #[test]
    fn empty_state_yields_no_trade_dominated_by_no_trade_probability() {
        let composed = compose(
            &DeltaMetrics::default(),
            &AbsorptionMetrics::default(),
            &IcebergMetrics::default(),
            &MomentumMetrics::default(),
            &StructureMetrics::default(),
            &neutral_spread_ctx(),
            &SignalWeights::default(),
        );
        assert_eq!(composed.signal_type, SignalType::NoTrade);
        assert!((composed.confidence - composed.probability_no_trade).abs() < 1e-12);
        assert!((composed.probability_buy + composed.probability_sell + composed.probability_no_trade - 1.0).abs() < 1e-9);
    }

    #[test]
    fn all_buy_volume_pushes_decision_toward_buy() {
        let delta = DeltaMetrics {
            raw_delta: 1.0,
            normalized_delta: 1.0,
            depth_aware_delta: 1.0,
            cumulative_delta: 1.0,
        };
        let composed = compose(
            &delta,
            &AbsorptionMetrics::default(),
            &IcebergMetrics::default(),
            &MomentumMetrics::default(),
            &StructureMetrics::default(),
            &neutral_spread_ctx(),
            &SignalWeights::default(),
        );
        assert!(composed.breakdown.delta_contribution > 0.0);
        assert!(composed.probability_buy > composed.probability_sell);
    }

    #[test]
    fn choch_inverts_and_halves_structure_contribution() {
        let mut structure = StructureMetrics {
            trend_direction: TrendDirection::Up,
            bos_detected: false,
            choch_detected: false,
            ..Default::default()
        };
        let without_choch = structure_contribution(&structure);
        structure.choch_detected = true;
        let with_choch = structure_contribution(&structure);
        assert!((with_choch - (-0.5 * without_choch)).abs() < 1e-12);
    }

    #[test]
    fn spread_penalty_dominates_when_spread_spikes() {
        let ctx = SpreadContext {
            spread: 10.0,
            median_spread: 1.0,
            atr: 1.0,
            median_atr: 1.0,
        };
        let weights = SignalWeights::default();
        let composed = compose(
            &DeltaMetrics::default(),
            &AbsorptionMetrics::default(),
            &IcebergMetrics::default(),
            &MomentumMetrics::default(),
            &StructureMetrics::default(),
            &ctx,
            &weights,
        );
        assert!((composed.hfss - (-weights.spread_penalty_weight)).abs() < 1e-9);
        assert_eq!(composed.signal_type, SignalType::NoTrade);
    }
}
