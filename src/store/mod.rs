//! Persistent market and snapshot store
//!
//! The repository is the only owner of persisted state. Engines re-read what
//! they need on every run and never cache markets across invocations.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::market::{Market, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by repository operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("market with condition id {condition_id} already exists")]
    Duplicate { condition_id: String },

    #[error("market {id} already has an outcome")]
    AlreadyResolved { id: String },

    #[error("market {id} not found")]
    NotFound { id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("window of {minutes} minutes is out of range")]
    InvalidWindow { minutes: i64 },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A snapshot ready to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub market_id: String,
    pub captured_at: DateTime<Utc>,
    pub minute_of_hour: i64,
    pub up_price: Decimal,
    pub down_price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub midpoint: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
}

/// One stored price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store-assigned sequence id
    pub id: i64,
    pub market_id: String,
    pub captured_at: DateTime<Utc>,
    pub minute_of_hour: i64,
    pub up_price: Decimal,
    pub down_price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub midpoint: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
}

/// Narrow persistence contract the engines work against
#[async_trait]
pub trait MarketRepository: Send + Sync {
    /// Insert a market, or refresh `updated_at` when the id already exists.
    ///
    /// A different id carrying an existing condition id is a `Duplicate`.
    async fn upsert_market(&self, market: &Market) -> StoreResult<()>;

    async fn get_market(&self, id: &str) -> StoreResult<Option<Market>>;

    async fn get_market_by_slug(&self, slug: &str) -> StoreResult<Option<Market>>;

    async fn get_market_by_condition_id(&self, condition_id: &str) -> StoreResult<Option<Market>>;

    /// Unresolved markets with `now` inside `[event_start, event_start + 1h)`
    async fn get_active_markets(&self, now: DateTime<Utc>) -> StoreResult<Vec<Market>>;

    /// Unresolved markets whose hour ends within `window_minutes` after `now`
    async fn get_closing_markets(
        &self,
        now: DateTime<Utc>,
        window_minutes: i64,
    ) -> StoreResult<Vec<Market>>;

    /// Unresolved markets whose hour ended at or before `now`
    async fn get_pending_resolution_markets(&self, now: DateTime<Utc>) -> StoreResult<Vec<Market>>;

    /// Set the outcome once; a second write is `AlreadyResolved`
    async fn update_outcome(&self, id: &str, outcome: Outcome) -> StoreResult<()>;

    /// Append a snapshot and return its sequence id
    async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StoreResult<i64>;

    async fn get_snapshots_by_market(&self, market_id: &str) -> StoreResult<Vec<Snapshot>>;

    /// All snapshots, oldest first, optionally from an instant on
    async fn get_snapshots_since(&self, since: Option<DateTime<Utc>>) -> StoreResult<Vec<Snapshot>>;

    /// Most recently started markets first
    async fn list_markets(&self, limit: i64) -> StoreResult<Vec<Market>>;

    async fn count_snapshots(&self) -> StoreResult<i64>;
}
