//! updown-tracker: Observational tracker for Polymarket hourly crypto up/down markets
//!
//! This library provides the core components for:
//! - Hourly slug encoding/decoding in US Eastern time
//! - Market discovery via the Gamma API
//! - Price, midpoint and order book reads from the CLOB REST API
//! - Periodic snapshot capture with a denser closing-soon pass
//! - Outcome resolution from settlement prices
//! - SQLite persistence and Parquet export
//! - Scheduling, structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod market;
pub mod orderbook;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod telemetry;
