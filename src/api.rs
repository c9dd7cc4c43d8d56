//! Operational surface (§6.2, §10.4): the control-plane commands and
//! snapshot queries exposed as HTTP endpoints over shared `AppState`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

use crate::ai::{AiAnalysisRequest, OpenRouterClient};
use crate::engine::EngineRegistry;
use crate::models::{DataSource, SignalWeights};
use crate::persistence::{self, Store};

/// Per-symbol feed connection state, populated by whichever task owns the
/// feed's `watch::Sender<bool>` (the startup supervisor in `main.rs`).
pub type ConnectionStateMap = Arc<RwLock<HashMap<String, watch::Receiver<bool>>>>;

#[derive(Clone)]
pub struct AppState {
    pub registry: EngineRegistry,
    pub store: Arc<Store>,
    pub ai_client: Option<Arc<OpenRouterClient>>,
    pub connections: ConnectionStateMap,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/settings", get(get_settings))
        .route("/api/settings/weights", post(set_weights))
        .route("/api/data-source/connect", post(connect_data_source))
        .route("/api/data-source/disconnect", post(disconnect_data_source))
        .route("/api/data-source/status", get(data_source_status))
        .route("/api/signals/current", get(current_signal))
        .route("/api/signals/history", get(signal_history))
        .route("/api/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.load_settings("default") {
        Ok(Some(settings)) => Json(settings).into_response(),
        Ok(None) => Json(json!({ "error": "no settings saved yet" })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load settings");
            Json(json!({ "error": e.to_string() })).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetWeightsRequest {
    symbol: String,
    weights: SignalWeights,
}

async fn set_weights(State(state): State<AppState>, Json(req): Json<SetWeightsRequest>) -> impl IntoResponse {
    let engine = state.registry.get_or_create(&req.symbol);
    let result = engine.lock().update_weights(req.weights);

    match result {
        Ok(()) => {
            let settings = persistence::default_settings(&req.symbol, DataSource::Simulated, req.weights, Utc::now());
            state.store.save_settings(&settings).ok();
            Json(json!({ "status": "updated" })).into_response()
        }
        Err(e) => Json(json!({ "status": "rejected", "error": e.to_string() })).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SymbolQuery {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    source: DataSource,
    symbol: String,
}

async fn connect_data_source(Query(q): Query<ConnectQuery>, State(state): State<AppState>) -> impl IntoResponse {
    // Registers the engine; actual feed task wiring lives in main's
    // supervisor loop, which watches the registry for new symbols.
    state.registry.get_or_create(&q.symbol);
    Json(json!({ "status": "connecting", "source": q.source.as_str(), "symbol": q.symbol }))
}

async fn disconnect_data_source(Query(q): Query<SymbolQuery>, State(state): State<AppState>) -> impl IntoResponse {
    state.registry.remove(&q.symbol);
    state.connections.write().remove(&q.symbol);
    Json(json!({ "status": "disconnected", "symbol": q.symbol }))
}

async fn data_source_status(Query(q): Query<SymbolQuery>, State(state): State<AppState>) -> impl IntoResponse {
    let connected = state
        .connections
        .read()
        .get(&q.symbol)
        .map(|rx| *rx.borrow());

    match connected {
        Some(connected) => Json(json!({ "symbol": q.symbol, "connected": connected })),
        None => Json(json!({ "symbol": q.symbol, "connected": false })),
    }
}

async fn current_signal(Query(q): Query<SymbolQuery>, State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.registry.get_or_create(&q.symbol);
    let signal = engine.lock().generate_signal();
    state.store.append_signal(&signal);

    if let Some(ai_client) = state.ai_client.clone() {
        let signal_for_ai = signal.clone();
        let metrics = engine.lock().all_metrics();
        tokio::spawn(async move {
            let request = AiAnalysisRequest {
                context: format!("symbol {}", signal_for_ai.symbol),
                signal: signal_for_ai,
                metrics,
            };
            let _ = ai_client.analyze_order_flow(&request).await;
        });
    }

    Json(signal)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    symbol: String,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

async fn signal_history(Query(q): Query<HistoryQuery>, State(state): State<AppState>) -> impl IntoResponse {
    match state.store.recent_signals(&q.symbol, q.limit) {
        Ok(signals) => Json(signals).into_response(),
        Err(e) => Json(json!({ "error": e.to_string() })).into_response(),
    }
}

async fn metrics(Query(q): Query<SymbolQuery>, State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.registry.get_or_create(&q.symbol);
    let snapshot = engine.lock().all_metrics();
    Json(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn test_state() -> AppState {
        AppState {
            registry: EngineRegistry::new(EngineConfig::default()),
            store: Arc::new(Store::in_memory().unwrap()),
            ai_client: None,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_creates_engine_lazily() {
        let state = test_state();
        assert!(state.registry.symbols().is_empty());
        let _ = metrics(Query(SymbolQuery { symbol: "BTCUSDT".to_string() }), State(state.clone())).await;
        assert_eq!(state.registry.symbols(), vec!["BTCUSDT".to_string()]);
    }

    #[tokio::test]
    async fn status_reports_false_for_unknown_symbol() {
        let state = test_state();
        let response = data_source_status(Query(SymbolQuery { symbol: "BTCUSDT".to_string() }), State(state)).await;
        let body = response.into_response();
        assert_eq!(body.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reflects_connection_state_map() {
        let state = test_state();
        let (tx, rx) = watch::channel(true);
        state.connections.write().insert("BTCUSDT".to_string(), rx);
        let connected = state.connections.read().get("BTCUSDT").map(|rx| *rx.borrow());
        assert_eq!(connected, Some(true));
        drop(tx);
    }

    #[tokio::test]
    async fn disconnect_clears_connection_state() {
        let state = test_state();
        let (_tx, rx) = watch::channel(true);
        state.connections.write().insert("BTCUSDT".to_string(), rx);
        let _ = disconnect_data_source(Query(SymbolQuery { symbol: "BTCUSDT".to_string() }), State(state.clone())).await;
        assert!(state.connections.read().get("BTCUSDT").is_none());
    }
}
