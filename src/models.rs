//! Canonical data model shared by the analytics engine, the feeds, the
//! persistence layer and the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Small constant added to every denominator on the metrics hot path.
pub const EPSILON: f64 = 1e-10;

/// Upstream market data source driving a feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Rithmic,
    Binance,
    Simulated,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Rithmic => "rithmic",
            DataSource::Binance => "binance",
            DataSource::Simulated => "simulated",
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rithmic" => Ok(DataSource::Rithmic),
            "binance" => Ok(DataSource::Binance),
            "simulated" => Ok(DataSource::Simulated),
            other => Err(anyhow::anyhow!("unknown data source: {other}")),
        }
    }
}

/// A single executed trade. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
    /// `true` means the taker was a seller (the resting maker order was a buy).
    pub is_buyer_maker: bool,
    pub trade_id: String,
}

/// A single price level on one side of the book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
    #[serde(default = "default_orders_count")]
    pub orders_count: u32,
}

fn default_orders_count() -> u32 {
    1
}

/// A full order book snapshot. `bids` descending by price, `asks` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub mid_price: f64,
}

impl OrderBook {
    /// Builds derived scalars (`best_bid`, `best_ask`, `spread`, `mid_price`)
    /// from the level sequences, trusting the caller's ordering.
    pub fn from_levels(
        symbol: String,
        timestamp: DateTime<Utc>,
        bids: Vec<OrderBookLevel>,
        asks: Vec<OrderBookLevel>,
    ) -> Self {
        let best_bid = bids.first().map(|l| l.price).unwrap_or(0.0);
        let best_ask = asks.first().map(|l| l.price).unwrap_or(0.0);
        let spread = (best_ask - best_bid).max(0.0);
        let mid_price = if best_bid > 0.0 && best_ask > 0.0 {
            (best_ask + best_bid) / 2.0
        } else {
            0.0
        };
        Self {
            symbol,
            timestamp,
            bids,
            asks,
            best_bid,
            best_ask,
            spread,
            mid_price,
        }
    }

    pub fn top_n_bid_depth(&self, n: usize) -> f64 {
        self.bids.iter().take(n).map(|l| l.quantity).sum()
    }

    pub fn top_n_ask_depth(&self, n: usize) -> f64 {
        self.asks.iter().take(n).map(|l| l.quantity).sum()
    }
}

/// Candle close/high/low used only to drive the ATR series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

// ---------------------------------------------------------------------
// Metric snapshots
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaMetrics {
    pub raw_delta: f64,
    pub normalized_delta: f64,
    pub depth_aware_delta: f64,
    pub cumulative_delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsorptionLevel {
    pub price: f64,
    pub side: String,
    pub score: f64,
    pub strength: f64,
    pub volume_hit: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbsorptionMetrics {
    pub score: f64,
    pub strength: f64,
    pub bid_absorption: f64,
    pub ask_absorption: f64,
    pub absorption_levels: Vec<AbsorptionLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcebergLevel {
    pub price: f64,
    pub side: String,
    pub probability: f64,
    pub fdr: f64,
    pub estimated_hidden: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IcebergMetrics {
    pub probability: f64,
    pub fill_to_display_ratio: f64,
    pub refill_intensity: f64,
    pub persistence_score: f64,
    pub detected_levels: Vec<IcebergLevel>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MomentumMetrics {
    pub ofmbi: f64,
    pub ofmbi_vol_normalized: f64,
    pub tape_speed: f64,
    pub volume_velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Trend,
    Range,
    Spike,
    MeanRevert,
}

impl Default for MarketRegime {
    fn default() -> Self {
        MarketRegime::Range
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

impl Default for TrendDirection {
    fn default() -> Self {
        TrendDirection::Neutral
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureMetrics {
    pub regime: MarketRegime,
    pub trend_direction: TrendDirection,
    pub swing_highs: Vec<f64>,
    pub swing_lows: Vec<f64>,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub bos_detected: bool,
    pub choch_detected: bool,
    pub trendline_rejection_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeProfileBucket {
    pub price_low: f64,
    pub price_high: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub price: f64,
    pub side: String,
    pub size: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidityMetrics {
    pub liquidity_zones: Vec<LiquidityZone>,
    pub volume_profile: Vec<VolumeProfileBucket>,
    pub vwap: f64,
    pub premium_zone: bool,
    pub discount_zone: bool,
}

// ---------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Buy,
    Sell,
    NoTrade,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "buy",
            SignalType::Sell => "sell",
            SignalType::NoTrade => "no_trade",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub delta_contribution: f64,
    pub absorption_contribution: f64,
    pub iceberg_contribution: f64,
    pub momentum_contribution: f64,
    pub structure_contribution: f64,
    pub spread_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub hfss_score: f64,
    pub probability_buy: f64,
    pub probability_sell: f64,
    pub probability_no_trade: f64,
    pub confidence: f64,
    pub breakdown: SignalBreakdown,
    pub reason: String,
    pub price_at_signal: f64,
    /// Advisory narration from the AI commentary collaborator; empty until
    /// a commentary pass has run against this signal.
    pub ai_analysis: String,
    /// Whether the commentary pass found the narration consistent with the
    /// mechanical decision. Never influences `signal_type` or `hfss_score`.
    pub ai_validated: bool,
}

impl TradingSignal {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ---------------------------------------------------------------------
// Configuration surfaces
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalWeights {
    pub delta_weight: f64,
    pub absorption_weight: f64,
    pub iceberg_weight: f64,
    pub ofmbi_weight: f64,
    pub structure_weight: f64,
    pub spread_penalty_weight: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            delta_weight: 0.25,
            absorption_weight: 0.20,
            iceberg_weight: 0.15,
            ofmbi_weight: 0.20,
            structure_weight: 0.10,
            spread_penalty_weight: 0.10,
        }
    }
}

impl SignalWeights {
    /// Rejects configuration-invalid weights (negative or non-finite) at
    /// the boundary, per the configuration error policy.
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("delta_weight", self.delta_weight),
            ("absorption_weight", self.absorption_weight),
            ("iceberg_weight", self.iceberg_weight),
            ("ofmbi_weight", self.ofmbi_weight),
            ("structure_weight", self.structure_weight),
            ("spread_penalty_weight", self.spread_penalty_weight),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("signal weight {name} must be a non-negative finite number, got {value}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IcebergCoeffs {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
}

impl Default for IcebergCoeffs {
    fn default() -> Self {
        Self {
            a0: -2.0,
            a1: 1.5,
            a2: 1.0,
            a3: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrpCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub lambda: f64,
}

impl Default for TrpCoeffs {
    fn default() -> Self {
        Self {
            b0: 0.0,
            b1: 2.0,
            lambda: 2.0,
        }
    }
}

/// Connection credentials/state per upstream source, mirroring the single
/// settings document the reference implementation persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RithmicCredentials {
    pub username: String,
    pub password: String,
    pub server: String,
    pub gateway: String,
    pub is_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceSettings {
    pub enabled: bool,
    pub selected_symbol: String,
    pub available_symbols: Vec<String>,
    pub is_connected: bool,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            selected_symbol: "BTCUSDT".to_string(),
            available_symbols: [
                "BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "SOLUSDT", "ADAUSDT", "DOGEUSDT",
                "AVAXUSDT", "DOTUSDT", "MATICUSDT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            is_connected: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenRouterSettings {
    pub selected_model: String,
    pub is_connected: bool,
}

/// The single document the persistence layer upserts: connection
/// credentials/state per source, the active selection, and signal weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: String,
    pub rithmic: RithmicCredentials,
    pub binance: BinanceSettings,
    pub openrouter: OpenRouterSettings,
    pub signal_weights: SignalWeights,
    pub active_data_source: DataSource,
    pub active_symbol: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            rithmic: RithmicCredentials::default(),
            binance: BinanceSettings::default(),
            openrouter: OpenRouterSettings::default(),
            signal_weights: SignalWeights::default(),
            active_data_source: DataSource::Simulated,
            active_symbol: "BTCUSDT".to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Snapshot of all six metric families, returned by `all_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub delta: DeltaMetrics,
    pub absorption: AbsorptionMetrics,
    pub iceberg: IcebergMetrics,
    pub momentum: MomentumMetrics,
    pub structure: StructureMetrics,
    pub liquidity: LiquidityMetrics,
}

/// Arbitrary JSON-ish bag used by the AI commentary request/response
/// contract, mirroring the original's loosely-typed metrics dict.
pub type MetricsMap = HashMap<String, serde_json::Value>;
