//! Feed adapters: independent producer tasks that translate exchange wire
//! formats into canonical [`FeedEvent`]s and hand them to the engine
//! through a channel. Adapters perform all suspending I/O; they must never
//! hold an engine lock across an `.await` (§5/§9 "Coroutine control flow").

pub mod binance;
pub mod rithmic;
pub mod simulated;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::models::{Candle, OrderBook, Trade};

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Trade(Trade),
    Book(OrderBook),
    Candle(Candle),
}

/// Base reconnect delay (§6.1: "exponential backoff, base 1s, cap 60s").
pub const BACKOFF_BASE_SECS: u64 = 1;
pub const BACKOFF_CAP_SECS: u64 = 60;

/// `min(cap, base * 2^attempt)`, resetting to `base` on the next
/// successful connection (§8 ambient-shell property).
pub fn backoff_delay_secs(attempt: u32) -> u64 {
    let pow = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    BACKOFF_BASE_SECS.saturating_mul(pow).min(BACKOFF_CAP_SECS)
}

/// A named upstream market-data producer. `run` drives the outer
/// reconnect loop; it suspends at every network receive and every backoff
/// sleep, and must remain cancel-safe: on cancellation the open connection
/// is released and `conn_tx` is set to `false` before the task exits.
#[async_trait]
pub trait Feed: Send {
    async fn run(
        self: Box<Self>,
        symbol: String,
        tx: mpsc::Sender<FeedEvent>,
        conn_tx: watch::Sender<bool>,
    ) -> anyhow::Result<()>;
}
