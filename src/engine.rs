//! The stateful, per-symbol entry point: owns `RollingState` and
//! `LevelIndex`, exposes the mutating `add_trade`/`add_book`/`add_candle`
//! plus the query `generate_signal`/`all_metrics`, and holds the live
//! configuration (`update_weights`, `update_coefficients`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::analytics::level_index::LevelIndex;
use crate::analytics::rolling_state::RollingState;
use crate::analytics::{absorption, composer, delta, iceberg, liquidity, momentum, structure};
use crate::config::EngineConfig;
use crate::models::{
    Candle, IcebergCoeffs, MetricsSnapshot, OrderBook, SignalWeights, Trade, TradingSignal,
    TrpCoeffs,
};

const DEFAULT_DELTA_WINDOW_MS: i64 = 1_000;

/// Single owned aggregate instantiated once per symbol (§9 "Global engine
/// state"). All mutating and query operations execute serially against it.
pub struct AnalyticsEngine {
    symbol: String,
    state: RollingState,
    levels: LevelIndex,
    weights: SignalWeights,
    iceberg_coeffs: IcebergCoeffs,
    trp_coeffs: TrpCoeffs,
    delta_window_ms: i64,
}

impl AnalyticsEngine {
    pub fn new(symbol: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            symbol: symbol.into(),
            state: RollingState::new(config.atr_period),
            levels: LevelIndex::new(config.level_quantum, config.retention_seconds),
            weights: config.signal_weights,
            iceberg_coeffs: config.iceberg_coeffs,
            trp_coeffs: config.trp_coeffs,
            delta_window_ms: DEFAULT_DELTA_WINDOW_MS,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Consumes a trade into the ring buffers and the level-hit map.
    /// Never fails: malformed upstream data is filtered before reaching
    /// this call (§7 upstream-transient policy).
    pub fn add_trade(&mut self, trade: Trade) {
        self.levels.record_trade(trade.price, trade.quantity, trade.timestamp);
        self.state.add_trade(trade);
    }

    /// Consumes a book snapshot into the book/spread queues and the
    /// depth-history map (every level, both sides).
    pub fn add_book(&mut self, book: OrderBook) {
        for level in book.bids.iter().chain(book.asks.iter()) {
            self.levels.record_depth(level.price, level.quantity);
        }
        self.state.add_book(book);
    }

    pub fn add_candle(&mut self, candle: Candle) {
        self.state.add_candle(candle);
    }

    /// Rejects configuration-invalid weights at the boundary; the engine
    /// continues with its prior configuration on failure.
    pub fn update_weights(&mut self, weights: SignalWeights) -> anyhow::Result<()> {
        weights.validate()?;
        self.weights = weights;
        Ok(())
    }

    pub fn update_coefficients(&mut self, iceberg_coeffs: IcebergCoeffs, trp_coeffs: TrpCoeffs) {
        self.iceberg_coeffs = iceberg_coeffs;
        self.trp_coeffs = trp_coeffs;
    }

    pub fn weights(&self) -> SignalWeights {
        self.weights
    }

    /// Snapshot of all six metric families. Pure with respect to engine
    /// state: repeated calls with no intervening mutation are identical.
    pub fn all_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            delta: delta::calculate(&self.state, self.delta_window_ms),
            absorption: absorption::calculate(&self.state, &self.levels),
            iceberg: iceberg::calculate(&self.state, &self.levels, &self.iceberg_coeffs),
            momentum: momentum::calculate(&self.state, self.delta_window_ms),
            structure: structure::calculate(&self.state, &self.trp_coeffs, self.delta_window_ms),
            liquidity: liquidity::calculate(&self.state),
        }
    }

    /// Composes the six metric families into a single trading signal.
    pub fn generate_signal(&self) -> TradingSignal {
        let snapshot = self.all_metrics();

        let spread = self
            .state
            .latest_book()
            .map(|b| b.spread)
            .unwrap_or(self.state.median_spread);
        let spread_ctx = composer::SpreadContext {
            spread,
            median_spread: self.state.median_spread,
            atr: self.state.current_atr(),
            median_atr: self.state.median_atr,
        };

        let composed = composer::compose(
            &snapshot.delta,
            &snapshot.absorption,
            &snapshot.iceberg,
            &snapshot.momentum,
            &snapshot.structure,
            &spread_ctx,
            &self.weights,
        );

        TradingSignal {
            id: TradingSignal::new_id(),
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            signal_type: composed.signal_type,
            hfss_score: composed.hfss,
            probability_buy: composed.probability_buy,
            probability_sell: composed.probability_sell,
            probability_no_trade: composed.probability_no_trade,
            confidence: composed.confidence,
            breakdown: composed.breakdown,
            reason: composed.reason,
            price_at_signal: self.state.last_price(),
            ai_analysis: String::new(),
            ai_validated: false,
        }
    }
}

/// Process-wide map from symbol to its exclusively-owned engine, created
/// lazily at first subscription (§9 "Global engine state" lifecycle note).
/// The per-symbol mutex is the serialization point named in §5: feed
/// adapters must never hold it across an `.await`.
#[derive(Clone)]
pub struct EngineRegistry {
    config: EngineConfig,
    engines: Arc<RwLock<HashMap<String, Arc<Mutex<AnalyticsEngine>>>>>,
}

impl EngineRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the existing engine for `symbol`, or creates one under the
    /// registry's configuration if this is the first reference.
    pub fn get_or_create(&self, symbol: &str) -> Arc<Mutex<AnalyticsEngine>> {
        if let Some(engine) = self.engines.read().get(symbol) {
            return engine.clone();
        }
        let mut write = self.engines.write();
        write
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AnalyticsEngine::new(symbol, &self.config))))
            .clone()
    }

    /// Destroys the engine for `symbol`, e.g. on explicit disconnect.
    pub fn remove(&self, symbol: &str) {
        self.engines.write().remove(symbol);
    }

    pub fn symbols(&self) -> Vec<String> {
        self.engines.read().keys().cloned().collect()
    }
}
