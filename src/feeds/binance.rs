//! Binance combined-stream websocket feed: `{symbol}@aggTrade` and
//! `{symbol}@depth20@100ms`, reconnecting with exponential backoff and
//! reporting connection transitions on every state change (§6.1).

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, warn};

use crate::feeds::{backoff_delay_secs, Feed, FeedEvent};
use crate::models::{OrderBook, OrderBookLevel, Trade};

const WEBSOCKET_BASE: &str = "wss://stream.binance.com:9443/stream";

pub struct BinanceFeed;

impl BinanceFeed {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BinanceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Feed for BinanceFeed {
    async fn run(
        self: Box<Self>,
        symbol: String,
        tx: mpsc::Sender<FeedEvent>,
        conn_tx: watch::Sender<bool>,
    ) -> anyhow::Result<()> {
        let lower = symbol.to_lowercase();
        let stream_url = format!(
            "{WEBSOCKET_BASE}?streams={lower}@aggTrade/{lower}@depth20@100ms"
        );

        let mut attempt = 0u32;
        loop {
            match connect_async(&stream_url).await {
                Ok((ws_stream, _)) => {
                    attempt = 0;
                    let _ = conn_tx.send(true);
                    tracing::info!(symbol = %symbol, "binance feed connected");

                    let (_, mut read) = ws_stream.split();
                    while let Some(message) = read.next().await {
                        match message {
                            Ok(msg) => {
                                if let Ok(text) = msg.into_text() {
                                    if let Err(e) = handle_message(&text, &symbol, &tx).await {
                                        debug!(error = %e, "skipping malformed binance message");
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "binance websocket error");
                                break;
                            }
                        }
                        if tx.is_closed() {
                            let _ = conn_tx.send(false);
                            return Ok(());
                        }
                    }
                    let _ = conn_tx.send(false);
                }
                Err(e) => {
                    error!(error = %e, "binance connection failed");
                    let _ = conn_tx.send(false);
                }
            }

            let delay = backoff_delay_secs(attempt);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct CombinedEnvelope {
    stream: String,
    data: Value,
}

async fn handle_message(text: &str, symbol: &str, tx: &mpsc::Sender<FeedEvent>) -> anyhow::Result<()> {
    let envelope: CombinedEnvelope = serde_json::from_str(text)?;
    let data = envelope.data;
    let event_type = data.get("e").and_then(Value::as_str).unwrap_or_default();

    match event_type {
        "aggTrade" => {
            let trade = parse_agg_trade(&data, symbol)?;
            let _ = tx.send(FeedEvent::Trade(trade)).await;
        }
        "depthUpdate" => {
            if let Some(book) = parse_depth_update(&data, symbol)? {
                let _ = tx.send(FeedEvent::Book(book)).await;
            }
        }
        _ => {
            debug!(stream = %envelope.stream, "ignoring unrecognized binance event type");
        }
    }
    Ok(())
}

fn parse_agg_trade(data: &Value, symbol: &str) -> anyhow::Result<Trade> {
    let price: f64 = data["p"].as_str().ok_or_else(|| anyhow::anyhow!("missing price"))?.parse()?;
    let quantity: f64 = data["q"].as_str().ok_or_else(|| anyhow::anyhow!("missing quantity"))?.parse()?;
    let ts_ms = data["T"].as_i64().ok_or_else(|| anyhow::anyhow!("missing trade time"))?;
    let is_buyer_maker = data["m"].as_bool().unwrap_or(false);
    let trade_id = data["a"].as_i64().map(|v| v.to_string()).unwrap_or_default();

    Ok(Trade {
        symbol: symbol.to_string(),
        price,
        quantity,
        timestamp: Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now),
        is_buyer_maker,
        trade_id,
    })
}

fn parse_depth_update(data: &Value, symbol: &str) -> anyhow::Result<Option<OrderBook>> {
    let bids = parse_levels(data.get("b"))?;
    let asks = parse_levels(data.get("a"))?;
    if bids.is_empty() || asks.is_empty() {
        return Ok(None);
    }

    let ts_ms = data["E"].as_i64().unwrap_or_default();
    let timestamp = Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now);

    let mut bids = bids;
    let mut asks = asks;
    bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap());
    asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

    Ok(Some(OrderBook::from_levels(symbol.to_string(), timestamp, bids, asks)))
}

fn parse_levels(value: Option<&Value>) -> anyhow::Result<Vec<OrderBookLevel>> {
    let Some(arr) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        let pair = entry.as_array().ok_or_else(|| anyhow::anyhow!("level not an array"))?;
        let price: f64 = pair
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing level price"))?
            .parse()?;
        let quantity: f64 = pair
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing level quantity"))?
            .parse()?;
        if quantity > 0.0 {
            out.push(OrderBookLevel { price, quantity, orders_count: 1 });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agg_trade_payload() {
        let data: Value = serde_json::json!({
            "e": "aggTrade", "p": "100.50", "q": "1.25", "T": 1_700_000_000_000i64,
            "m": true, "a": 42
        });
        let trade = parse_agg_trade(&data, "BTCUSDT").unwrap();
        assert_eq!(trade.price, 100.50);
        assert_eq!(trade.quantity, 1.25);
        assert!(trade.is_buyer_maker);
        assert_eq!(trade.trade_id, "42");
    }

    #[test]
    fn parses_depth_update_and_sorts_levels() {
        let data: Value = serde_json::json!({
            "e": "depthUpdate", "E": 1_700_000_000_000i64,
            "b": [["100.0", "1.0"], ["99.9", "2.0"]],
            "a": [["100.2", "1.0"], ["100.1", "2.0"]],
        });
        let book = parse_depth_update(&data, "BTCUSDT").unwrap().unwrap();
        assert_eq!(book.bids[0].price, 100.0);
        assert_eq!(book.asks[0].price, 100.1);
        assert!(book.best_bid < book.best_ask);
    }

    #[test]
    fn zero_quantity_levels_are_dropped() {
        let data: Value = serde_json::json!({
            "e": "depthUpdate", "E": 1_700_000_000_000i64,
            "b": [["100.0", "0.0"]],
            "a": [["100.1", "1.0"]],
        });
        let book = parse_depth_update(&data, "BTCUSDT").unwrap();
        assert!(book.is_none());
    }
}
