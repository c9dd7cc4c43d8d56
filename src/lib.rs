//! Order-flow analytics engine: the stateful, per-symbol component that
//! consumes trades, book snapshots and candles, maintains rolling windows
//! and per-price-level statistics, and composes six metric families into
//! a single high-frequency trading signal (HFSS).
//!
//! This crate also carries the ambient production shell around that
//! core: feed adapters, SQLite-backed persistence, an advisory AI
//! commentary client, and an axum HTTP surface. See `DESIGN.md` for the
//! grounding of each part.

pub mod ai;
pub mod analytics;
pub mod api;
pub mod config;
pub mod engine;
pub mod feeds;
pub mod models;
pub mod persistence;
