//! Trend-following random-walk generator. Useful for demos and tests that
//! should not depend on network access (§10.1).

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::info;

use crate::feeds::{Feed, FeedEvent};
use crate::models::{OrderBook, OrderBookLevel, Trade};

const LEVELS_PER_SIDE: usize = 20;
const BOOK_EMIT_PROBABILITY: f64 = 0.3;

pub struct SimulatedFeed {
    pub base_price: f64,
}

impl SimulatedFeed {
    pub fn new(base_price: f64) -> Self {
        Self { base_price }
    }
}

#[async_trait]
impl Feed for SimulatedFeed {
    async fn run(
        self: Box<Self>,
        symbol: String,
        tx: mpsc::Sender<FeedEvent>,
        conn_tx: watch::Sender<bool>,
    ) -> anyhow::Result<()> {
        let mut price = self.base_price;
        let mut trend = 0.0f64;
        let mut trend_ticks_remaining = 0u32;
        let mut rng = rand::thread_rng();

        let _ = conn_tx.send(true);
        info!(symbol = %symbol, "simulated feed connected");

        loop {
            if trend_ticks_remaining == 0 {
                trend = rng.gen_range(-1.0..=1.0).signum() * rng.gen_range(0.01..0.05);
                trend_ticks_remaining = rng.gen_range(50..200);
            } else {
                trend_ticks_remaining -= 1;
            }

            let noise = rand_normal(&mut rng, 0.0, 0.1);
            price = (price + trend + noise).max(1.0);

            let volume = pareto_sample(&mut rng, 1.5).min(100.0);
            let is_buyer = rng.gen::<f64>() > 0.5 + trend * 2.0;

            let trade = Trade {
                symbol: symbol.clone(),
                price: round4(price),
                quantity: round4(volume),
                timestamp: Utc::now(),
                is_buyer_maker: !is_buyer,
                trade_id: rng.gen_range(1..1_000_000).to_string(),
            };
            if tx.send(FeedEvent::Trade(trade)).await.is_err() {
                break;
            }

            if rng.gen::<f64>() > (1.0 - BOOK_EMIT_PROBABILITY) {
                let book = synth_book(&symbol, price, &mut rng);
                if tx.send(FeedEvent::Book(book)).await.is_err() {
                    break;
                }
            }

            let sleep_ms = rng.gen_range(20..100);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }

        let _ = conn_tx.send(false);
        Ok(())
    }
}

fn synth_book(symbol: &str, mid: f64, rng: &mut impl Rng) -> OrderBook {
    let spread = rng.gen_range(0.01..0.05) * mid / 100.0;
    let mut bids = Vec::with_capacity(LEVELS_PER_SIDE);
    let mut asks = Vec::with_capacity(LEVELS_PER_SIDE);
    for i in 0..LEVELS_PER_SIDE {
        let bid_price = mid - spread / 2.0 - i as f64 * spread * 0.5;
        let ask_price = mid + spread / 2.0 + i as f64 * spread * 0.5;
        let bid_vol = rng.gen_range(10.0..100.0) / (i as f64 + 1.0);
        let ask_vol = rng.gen_range(10.0..100.0) / (i as f64 + 1.0);
        bids.push(OrderBookLevel { price: round4(bid_price), quantity: round4(bid_vol), orders_count: 1 });
        asks.push(OrderBookLevel { price: round4(ask_price), quantity: round4(ask_vol), orders_count: 1 });
    }
    OrderBook::from_levels(symbol.to_string(), Utc::now(), bids, asks)
}

/// Fat-tailed trade-size sampler via inverse-transform: `1 / U^(1/alpha)`,
/// mirroring the reference's `random.paretovariate(1.5)`.
fn pareto_sample(rng: &mut impl Rng, alpha: f64) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    u.powf(-1.0 / alpha)
}

fn rand_normal(rng: &mut impl Rng, mean: f64, stdev: f64) -> f64 {
    // Box-Muller; avoids pulling in a distributions crate just for Gaussian noise.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z0 = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    mean + stdev * z0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_trades_and_reports_connected() {
        let (tx, mut rx) = mpsc::channel(16);
        let (conn_tx, mut conn_rx) = watch::channel(false);
        let feed = Box::new(SimulatedFeed::new(100.0));

        let handle = tokio::spawn(async move {
            let _ = feed.run("SIMULATED".to_string(), tx, conn_tx).await;
        });

        conn_rx.changed().await.unwrap();
        assert!(*conn_rx.borrow());

        let first = rx.recv().await.expect("at least one event");
        matches!(first, FeedEvent::Trade(_) | FeedEvent::Book(_));

        handle.abort();
    }
}
