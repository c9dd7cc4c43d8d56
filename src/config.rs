//! Environment-driven configuration for the analytics engine and its
//! ambient shell. Invalid values are rejected at the boundary and replaced
//! with documented defaults rather than panicking.

use crate::models::{IcebergCoeffs, SignalWeights, TrpCoeffs};

/// Tunables named in the configuration enumeration: window sizes, the ATR
/// period, the level-price rounding quantum, level-hit retention, and the
/// iceberg/TRP model coefficients.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub window_size: usize,
    pub micro_bar_ms: i64,
    pub atr_period: usize,
    pub level_quantum: u32,
    pub retention_seconds: i64,
    pub iceberg_coeffs: IcebergCoeffs,
    pub trp_coeffs: TrpCoeffs,
    pub signal_weights: SignalWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            micro_bar_ms: 500,
            atr_period: 14,
            level_quantum: 2,
            retention_seconds: 60,
            iceberg_coeffs: IcebergCoeffs::default(),
            trp_coeffs: TrpCoeffs::default(),
            signal_weights: SignalWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_env("ORDERFLOW_WINDOW_SIZE") {
            if v > 0 {
                cfg.window_size = v;
            } else {
                tracing::warn!("ORDERFLOW_WINDOW_SIZE must be > 0, keeping default {}", cfg.window_size);
            }
        }

        if let Some(v) = parse_env::<i64>("ORDERFLOW_MICRO_BAR_MS") {
            if v > 0 {
                cfg.micro_bar_ms = v;
            } else {
                tracing::warn!("ORDERFLOW_MICRO_BAR_MS must be > 0, keeping default {}", cfg.micro_bar_ms);
            }
        }

        if let Some(v) = parse_env::<usize>("ORDERFLOW_ATR_PERIOD") {
            if v >= 2 {
                cfg.atr_period = v;
            } else {
                tracing::warn!("ORDERFLOW_ATR_PERIOD must be >= 2, keeping default {}", cfg.atr_period);
            }
        }

        if let Some(v) = parse_env::<u32>("ORDERFLOW_LEVEL_QUANTUM") {
            cfg.level_quantum = v;
        }

        if let Some(v) = parse_env::<i64>("ORDERFLOW_RETENTION_SECONDS") {
            if v > 0 {
                cfg.retention_seconds = v;
            } else {
                tracing::warn!(
                    "ORDERFLOW_RETENTION_SECONDS must be > 0, keeping default {}",
                    cfg.retention_seconds
                );
            }
        }

        if let Some(weights) = env_signal_weights(cfg.signal_weights) {
            match weights.validate() {
                Ok(()) => cfg.signal_weights = weights,
                Err(e) => tracing::warn!("ORDERFLOW_SIGNAL_WEIGHT_* rejected: {e}, keeping default weights"),
            }
        }

        if let Some(coeffs) = env_iceberg_coeffs(cfg.iceberg_coeffs) {
            if coeffs.a0.is_finite() && coeffs.a1.is_finite() && coeffs.a2.is_finite() && coeffs.a3.is_finite() {
                cfg.iceberg_coeffs = coeffs;
            } else {
                tracing::warn!("ORDERFLOW_ICEBERG_* must be finite, keeping default iceberg coefficients");
            }
        }

        if let Some(coeffs) = env_trp_coeffs(cfg.trp_coeffs) {
            if coeffs.b0.is_finite() && coeffs.b1.is_finite() && coeffs.lambda.is_finite() && coeffs.lambda > 0.0 {
                cfg.trp_coeffs = coeffs;
            } else {
                tracing::warn!("ORDERFLOW_TRP_* must be finite with lambda > 0, keeping default TRP coefficients");
            }
        }

        cfg
    }
}

/// Applies any `ORDERFLOW_SIGNAL_WEIGHT_*` overrides on top of `base`.
/// Returns `None` if none of the six env vars are set.
fn env_signal_weights(base: SignalWeights) -> Option<SignalWeights> {
    let mut any_set = false;
    let mut w = base;
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_DELTA") {
        w.delta_weight = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_ABSORPTION") {
        w.absorption_weight = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_ICEBERG") {
        w.iceberg_weight = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_OFMBI") {
        w.ofmbi_weight = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_STRUCTURE") {
        w.structure_weight = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_SIGNAL_WEIGHT_SPREAD_PENALTY") {
        w.spread_penalty_weight = v;
        any_set = true;
    }
    any_set.then_some(w)
}

/// Applies any `ORDERFLOW_ICEBERG_*` overrides on top of `base`.
fn env_iceberg_coeffs(base: IcebergCoeffs) -> Option<IcebergCoeffs> {
    let mut any_set = false;
    let mut c = base;
    if let Some(v) = parse_env::<f64>("ORDERFLOW_ICEBERG_A0") {
        c.a0 = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_ICEBERG_A1") {
        c.a1 = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_ICEBERG_A2") {
        c.a2 = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_ICEBERG_A3") {
        c.a3 = v;
        any_set = true;
    }
    any_set.then_some(c)
}

/// Applies any `ORDERFLOW_TRP_*` overrides on top of `base`.
fn env_trp_coeffs(base: TrpCoeffs) -> Option<TrpCoeffs> {
    let mut any_set = false;
    let mut c = base;
    if let Some(v) = parse_env::<f64>("ORDERFLOW_TRP_B0") {
        c.b0 = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_TRP_B1") {
        c.b1 = v;
        any_set = true;
    }
    if let Some(v) = parse_env::<f64>("ORDERFLOW_TRP_LAMBDA") {
        c.lambda = v;
        any_set = true;
    }
    any_set.then_some(c)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Top-level process configuration: ports, database path, feed selection,
/// and optional AI commentary credentials.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: String,
    pub default_symbol: String,
    pub default_source: crate::models::DataSource,
    pub openrouter_api_key: Option<String>,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./orderflow.db".to_string());

        let default_symbol = std::env::var("BINANCE_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string());

        let default_source = std::env::var("DEFAULT_DATA_SOURCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::models::DataSource::Simulated);

        let openrouter_api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            port,
            database_path,
            default_symbol,
            default_source,
            openrouter_api_key,
            engine: EngineConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_are_valid() {
        EngineConfig::default().signal_weights.validate().unwrap();
    }

    #[test]
    fn parse_env_rejects_garbage() {
        std::env::set_var("TEST_PARSE_ENV_GARBAGE", "not-a-number");
        let v: Option<usize> = parse_env("TEST_PARSE_ENV_GARBAGE");
        assert!(v.is_none());
        std::env::remove_var("TEST_PARSE_ENV_GARBAGE");
    }

    #[test]
    fn from_env_rejects_negative_signal_weight_and_keeps_default() {
        std::env::set_var("ORDERFLOW_SIGNAL_WEIGHT_DELTA", "-1.0");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.signal_weights.delta_weight, SignalWeights::default().delta_weight);
        std::env::remove_var("ORDERFLOW_SIGNAL_WEIGHT_DELTA");
    }

    #[test]
    fn from_env_accepts_valid_signal_weight_override() {
        std::env::set_var("ORDERFLOW_SIGNAL_WEIGHT_DELTA", "0.42");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.signal_weights.delta_weight, 0.42);
        std::env::remove_var("ORDERFLOW_SIGNAL_WEIGHT_DELTA");
    }

    #[test]
    fn from_env_rejects_non_finite_iceberg_coefficient_and_keeps_default() {
        std::env::set_var("ORDERFLOW_ICEBERG_A0", "nan");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.iceberg_coeffs.a0, IcebergCoeffs::default().a0);
        std::env::remove_var("ORDERFLOW_ICEBERG_A0");
    }

    #[test]
    fn from_env_rejects_non_positive_trp_lambda_and_keeps_default() {
        std::env::set_var("ORDERFLOW_TRP_LAMBDA", "0");
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.trp_coeffs.lambda, TrpCoeffs::default().lambda);
        std::env::remove_var("ORDERFLOW_TRP_LAMBDA");
    }
}
