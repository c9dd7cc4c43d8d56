//! AI commentary collaborator: consults an external chat-completion model
//! for advisory narration on a generated signal. Never a source of trading
//! decisions — the analytics core and composer never depend on or wait
//! for this call (§1, §10.3).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{MetricsSnapshot, TradingSignal};

const BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str = "You are an expert high-frequency trading analyst specializing in order \
flow analysis, market microstructure, and quantitative trading signals. Interpret the provided \
metrics, flag anomalies, and explain what large participants might be doing. Be concise and \
data-driven, and ground every claim in the numbers given.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisRequest {
    pub context: String,
    pub signal: TradingSignal,
    pub metrics: MetricsSnapshot,
}

/// Response contract: `anomalies_detected` is surfaced here rather than
/// merged onto `TradingSignal`, keeping the signal's hot-path shape
/// unchanged from the core spec (§11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisResponse {
    pub analysis: String,
    #[serde(default)]
    pub anomalies_detected: Vec<String>,
    #[serde(default)]
    pub trading_insight: String,
    pub validated: bool,
}

impl AiAnalysisResponse {
    fn unavailable(reason: &str) -> Self {
        Self {
            analysis: format!("AI analysis unavailable - {reason}"),
            anomalies_detected: Vec::new(),
            trading_insight: String::new(),
            validated: false,
        }
    }
}

pub struct OpenRouterClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("building OpenRouter HTTP client")?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            http,
        })
    }

    pub fn from_env() -> Result<Option<Self>> {
        let api_key = match std::env::var("OPENROUTER_API_KEY") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        let model = std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| "anthropic/claude-3-haiku".to_string());
        Ok(Some(Self::new(api_key, model)?))
    }

    /// Analyzes order flow for a generated signal. Never raises on
    /// upstream failure — returns a `validated: false` neutral response
    /// instead, so a failed AI call never blocks signal delivery.
    pub async fn analyze_order_flow(&self, request: &AiAnalysisRequest) -> AiAnalysisResponse {
        if self.api_key.is_empty() || self.model.is_empty() {
            return AiAnalysisResponse::unavailable("API key or model not configured");
        }

        match self.call_completion(request).await {
            Ok(text) => {
                let validated = validate_against_signal(&text, &request.signal);
                let anomalies = extract_anomalies(&text);
                AiAnalysisResponse {
                    analysis: text,
                    anomalies_detected: anomalies,
                    trading_insight: String::new(),
                    validated,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI commentary call failed");
                AiAnalysisResponse::unavailable(&format!("request failed: {e}"))
            }
        }
    }

    async fn call_completion(&self, request: &AiAnalysisRequest) -> Result<String> {
        let prompt = build_prompt(request);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 500,
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(format!("{BASE_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://orderflow-analytics.app")
            .header("X-Title", "Order Flow Analytics Engine")
            .json(&body)
            .send()
            .await
            .context("sending OpenRouter completion request")?;

        if !response.status().is_success() {
            anyhow::bail!("OpenRouter completion error: {}", response.status());
        }

        let payload: serde_json::Value = response.json().await.context("parsing OpenRouter response")?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .context("OpenRouter response missing completion content")
    }
}

fn build_prompt(request: &AiAnalysisRequest) -> String {
    format!(
        "## Market Context\n{}\n\n## Signal\n{} at HFSS {:.3} (confidence {:.2})\n\n## Reason\n{}",
        request.context, request.signal.signal_type.as_str(), request.signal.hfss_score,
        request.signal.confidence, request.signal.reason,
    )
}

/// Cheap consistency check: does the narration's directional language
/// agree with the mechanical decision? This is advisory only and never
/// feeds back into `signal_type` or `hfss_score`.
fn validate_against_signal(analysis: &str, signal: &TradingSignal) -> bool {
    let lower = analysis.to_lowercase();
    match signal.signal_type {
        crate::models::SignalType::Buy => !lower.contains("bearish") && !lower.contains("sell-side pressure"),
        crate::models::SignalType::Sell => !lower.contains("bullish") && !lower.contains("buy-side pressure"),
        crate::models::SignalType::NoTrade => true,
    }
}

fn extract_anomalies(analysis: &str) -> Vec<String> {
    analysis
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("anomal") || lower.contains("unusual")
        })
        .map(|line| line.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeltaMetrics, MetricsSnapshot, SignalBreakdown, SignalType};
    use chrono::Utc;

    fn sample_signal(signal_type: SignalType) -> TradingSignal {
        TradingSignal {
            id: "1".to_string(),
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            signal_type,
            hfss_score: 0.5,
            probability_buy: 0.6,
            probability_sell: 0.2,
            probability_no_trade: 0.2,
            confidence: 0.6,
            breakdown: SignalBreakdown::default(),
            reason: "strong buy-side delta".to_string(),
            price_at_signal: 100.0,
            ai_analysis: String::new(),
            ai_validated: false,
        }
    }

    #[tokio::test]
    async fn unconfigured_client_returns_unavailable_without_network() {
        let client = OpenRouterClient::new("", "").unwrap();
        let request = AiAnalysisRequest {
            context: "test".to_string(),
            signal: sample_signal(SignalType::Buy),
            metrics: MetricsSnapshot {
                symbol: "BTCUSDT".to_string(),
                timestamp: Utc::now(),
                delta: DeltaMetrics::default(),
                absorption: Default::default(),
                iceberg: Default::default(),
                momentum: Default::default(),
                structure: Default::default(),
                liquidity: Default::default(),
            },
        };
        let response = client.analyze_order_flow(&request).await;
        assert!(!response.validated);
        assert!(response.analysis.contains("unavailable"));
    }

    #[test]
    fn validation_flags_contradictory_narration() {
        let buy_signal = sample_signal(SignalType::Buy);
        assert!(!validate_against_signal("the tape looks bearish here", &buy_signal));
        assert!(validate_against_signal("strong bullish continuation likely", &buy_signal));
    }

    #[test]
    fn extracts_anomaly_lines() {
        let text = "Normal flow.\nAnomaly: unusual refill pattern at the bid.\nNothing else notable.";
        let anomalies = extract_anomalies(text);
        assert_eq!(anomalies.len(), 1);
    }
}
