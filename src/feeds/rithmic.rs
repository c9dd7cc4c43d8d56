//! Rithmic connection stub. No Rithmic protocol detail exists in the
//! source material to ground a real client against (§9/§12 Open Question
//! 4), so this honestly reports itself unconfigured and declines to
//! connect rather than fabricating wire-protocol support.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::feeds::{Feed, FeedEvent};

pub struct RithmicFeed {
    pub username: String,
    pub password: String,
}

impl RithmicFeed {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl Feed for RithmicFeed {
    async fn run(
        self: Box<Self>,
        symbol: String,
        _tx: mpsc::Sender<FeedEvent>,
        conn_tx: watch::Sender<bool>,
    ) -> anyhow::Result<()> {
        let _ = conn_tx.send(false);
        if self.username.is_empty() || self.password.is_empty() {
            anyhow::bail!("rithmic credentials required");
        }
        tracing::warn!(
            symbol = %symbol,
            "rithmic feed is an unconfigured stub; no protocol client is implemented"
        );
        anyhow::bail!("rithmic feed unsupported in this build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn declines_to_connect_without_credentials() {
        let (tx, _rx) = mpsc::channel(1);
        let (conn_tx, conn_rx) = watch::channel(false);
        let feed = Box::new(RithmicFeed::new(String::new(), String::new()));
        let result = feed.run("XAUUSD".to_string(), tx, conn_tx).await;
        assert!(result.is_err());
        assert!(!*conn_rx.borrow());
    }
}
