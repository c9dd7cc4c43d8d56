//! Order Flow Analytics Engine — process entry point.
//!
//! Wires the ambient production shell specified in SPEC_FULL.md §10
//! around the analytics core: loads configuration, opens persistence,
//! spawns the configured feed into the engine registry, and serves the
//! operational HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow_engine::ai::OpenRouterClient;
use orderflow_engine::api::{self, AppState, ConnectionStateMap};
use orderflow_engine::config::AppConfig;
use orderflow_engine::engine::EngineRegistry;
use orderflow_engine::feeds::{binance::BinanceFeed, rithmic::RithmicFeed, simulated::SimulatedFeed, Feed, FeedEvent};
use orderflow_engine::models::DataSource;
use orderflow_engine::persistence::{self as store_helpers, Store};

/// Order flow analytics engine.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Symbol to subscribe on startup.
    #[arg(long, env = "BINANCE_SYMBOL")]
    symbol: Option<String>,

    /// Data source to drive the startup feed: simulated, binance, rithmic.
    #[arg(long, env = "DEFAULT_DATA_SOURCE")]
    source: Option<DataSource>,

    /// HTTP port to serve the operational surface on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(symbol) = cli.symbol {
        config.default_symbol = symbol;
    }
    if let Some(source) = cli.source {
        config.default_source = source;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(symbol = %config.default_symbol, source = %config.default_source.as_str(), "starting order flow analytics engine");

    let store = Arc::new(Store::open(&config.database_path)?);
    let registry = EngineRegistry::new(config.engine);

    let ai_client = match OpenRouterClient::from_env() {
        Ok(Some(client)) => Some(Arc::new(client)),
        Ok(None) => {
            info!("OPENROUTER_API_KEY not set; AI commentary disabled");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to initialize AI commentary client, continuing without it");
            None
        }
    };

    let settings = store_helpers::default_settings(
        &config.default_symbol,
        config.default_source,
        config.engine.signal_weights,
        chrono::Utc::now(),
    );
    if let Err(e) = store.save_settings(&settings) {
        error!(error = %e, "failed to persist initial settings");
    }

    let connections: ConnectionStateMap = Arc::new(RwLock::new(HashMap::new()));

    spawn_feed_supervisor(
        registry.clone(),
        connections.clone(),
        config.default_source,
        config.default_symbol.clone(),
    );

    let state = AppState { registry, store, ai_client, connections };
    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawns the configured feed and funnels its events into the symbol's
/// engine. This is the serialization point named in §5: the engine lock
/// is acquired only across the synchronous mutate call, never across an
/// `.await`. The feed's connection state is registered into `connections`
/// so `GET /api/data-source/status` has something to report.
fn spawn_feed_supervisor(
    registry: EngineRegistry,
    connections: ConnectionStateMap,
    source: DataSource,
    symbol: String,
) {
    let (tx, mut rx) = mpsc::channel::<FeedEvent>(1024);
    let (conn_tx, mut conn_rx) = watch::channel(false);

    connections.write().insert(symbol.clone(), conn_rx.clone());

    let feed: Box<dyn Feed> = match source {
        DataSource::Simulated => Box::new(SimulatedFeed::new(100.0)),
        DataSource::Binance => Box::new(BinanceFeed::new()),
        DataSource::Rithmic => Box::new(RithmicFeed::new(
            std::env::var("RITHMIC_USERNAME").unwrap_or_default(),
            std::env::var("RITHMIC_PASSWORD").unwrap_or_default(),
        )),
    };

    let feed_symbol = symbol.clone();
    tokio::spawn(async move {
        if let Err(e) = feed.run(feed_symbol, tx, conn_tx).await {
            error!(error = %e, "feed task terminated");
        }
    });

    tokio::spawn(async move {
        while conn_rx.changed().await.is_ok() {
            let connected = *conn_rx.borrow();
            info!(connected, "feed connection state changed");
        }
    });

    let consumer_symbol = symbol;
    tokio::spawn(async move {
        let engine = registry.get_or_create(&consumer_symbol);
        while let Some(event) = rx.recv().await {
            let mut guard = engine.lock();
            match event {
                FeedEvent::Trade(trade) => guard.add_trade(trade),
                FeedEvent::Book(book) => guard.add_book(book),
                FeedEvent::Candle(candle) => guard.add_candle(candle),
            }
        }
    });
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orderflow_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
