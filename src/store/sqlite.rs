//! SQLite-backed repository

use super::{MarketRepository, NewSnapshot, Snapshot, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::market::{hour_window, Market, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

const MARKET_COLUMNS: &str = "id, condition_id, token_up, token_down, asset, question, slug, \
     series_slug, event_start_ms, hour_start_ms, hour_end_ms, outcome, created_at_ms, updated_at_ms";

const SNAPSHOT_COLUMNS: &str = "id, market_id, captured_at_ms, minute_of_hour, up_price, \
     down_price, best_bid, best_ask, spread, midpoint, last_trade_price, volume_24h";

/// Repository over a SQLite pool.
///
/// Reads go straight to the pool; writes take `write_lock` first so only one
/// writer touches the database at a time.
pub struct SqliteRepository {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteRepository {
    /// Open (creating if needed) the configured database and run migrations
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        tracing::info!(url = %config.url, "Opened SQLite database");

        Self::from_pool(pool).await
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// Close the pool, waiting for checked-out connections to return
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }

    async fn fetch_markets(&self, sql: &str, binds: &[i64]) -> StoreResult<Vec<Market>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(market_from_row).collect()
    }

    async fn fetch_one_market(&self, column: &str, value: &str) -> StoreResult<Option<Market>> {
        let sql = format!("SELECT {} FROM markets WHERE {} = ?", MARKET_COLUMNS, column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(market_from_row).transpose()
    }
}

#[async_trait]
impl MarketRepository for SqliteRepository {
    async fn upsert_market(&self, market: &Market) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO markets (
                id, condition_id, token_up, token_down, asset, question, slug,
                series_slug, event_start_ms, hour_start_ms, hour_end_ms, outcome,
                created_at_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(&market.id)
        .bind(&market.condition_id)
        .bind(&market.token_up)
        .bind(&market.token_down)
        .bind(&market.asset)
        .bind(&market.question)
        .bind(&market.slug)
        .bind(&market.series_slug)
        .bind(market.event_start_time.timestamp_millis())
        .bind(market.hour_start.timestamp_millis())
        .bind(market.hour_end.timestamp_millis())
        .bind(market.outcome.map(|o| o.as_str()))
        .bind(market.created_at.timestamp_millis())
        .bind(market.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    condition_id: market.condition_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_market(&self, id: &str) -> StoreResult<Option<Market>> {
        self.fetch_one_market("id", id).await
    }

    async fn get_market_by_slug(&self, slug: &str) -> StoreResult<Option<Market>> {
        self.fetch_one_market("slug", slug).await
    }

    async fn get_market_by_condition_id(&self, condition_id: &str) -> StoreResult<Option<Market>> {
        self.fetch_one_market("condition_id", condition_id).await
    }

    async fn get_active_markets(&self, now: DateTime<Utc>) -> StoreResult<Vec<Market>> {
        let sql = format!(
            "SELECT {} FROM markets \
             WHERE outcome IS NULL AND event_start_ms <= ?1 AND ?1 < event_start_ms + ?2 \
             ORDER BY event_start_ms, id",
            MARKET_COLUMNS
        );
        let now_ms = now.timestamp_millis();
        self.fetch_markets(&sql, &[now_ms, hour_window().num_milliseconds()])
            .await
    }

    async fn get_closing_markets(
        &self,
        now: DateTime<Utc>,
        window_minutes: i64,
    ) -> StoreResult<Vec<Market>> {
        let sql = format!(
            "SELECT {} FROM markets \
             WHERE outcome IS NULL AND hour_end_ms > ?1 AND hour_end_ms <= ?1 + ?2 \
             ORDER BY hour_end_ms, id",
            MARKET_COLUMNS
        );
        let window_ms = chrono::Duration::try_minutes(window_minutes)
            .ok_or(StoreError::InvalidWindow {
                minutes: window_minutes,
            })?
            .num_milliseconds();
        self.fetch_markets(&sql, &[now.timestamp_millis(), window_ms])
            .await
    }

    async fn get_pending_resolution_markets(&self, now: DateTime<Utc>) -> StoreResult<Vec<Market>> {
        let sql = format!(
            "SELECT {} FROM markets \
             WHERE outcome IS NULL AND hour_end_ms <= ?1 \
             ORDER BY hour_end_ms, id",
            MARKET_COLUMNS
        );
        self.fetch_markets(&sql, &[now.timestamp_millis()]).await
    }

    async fn update_outcome(&self, id: &str, outcome: Outcome) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE markets SET outcome = ?, updated_at_ms = ? WHERE id = ? AND outcome IS NULL",
        )
        .bind(outcome.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM markets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if exists {
            Err(StoreError::AlreadyResolved { id: id.to_string() })
        } else {
            Err(StoreError::NotFound { id: id.to_string() })
        }
    }

    async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StoreResult<i64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO snapshots (
                market_id, captured_at_ms, minute_of_hour, up_price, down_price,
                best_bid, best_ask, spread, midpoint, last_trade_price, volume_24h
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.market_id)
        .bind(snapshot.captured_at.timestamp_millis())
        .bind(snapshot.minute_of_hour)
        .bind(snapshot.up_price.to_string())
        .bind(snapshot.down_price.to_string())
        .bind(snapshot.best_bid.map(|d| d.to_string()))
        .bind(snapshot.best_ask.map(|d| d.to_string()))
        .bind(snapshot.spread.map(|d| d.to_string()))
        .bind(snapshot.midpoint.map(|d| d.to_string()))
        .bind(snapshot.last_trade_price.map(|d| d.to_string()))
        .bind(snapshot.volume_24h.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_snapshots_by_market(&self, market_id: &str) -> StoreResult<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE market_id = ? ORDER BY captured_at_ms, id",
            SNAPSHOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(market_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn get_snapshots_since(&self, since: Option<DateTime<Utc>>) -> StoreResult<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE captured_at_ms >= ? ORDER BY captured_at_ms, id",
            SNAPSHOT_COLUMNS
        );
        let since_ms = since.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let rows = sqlx::query(&sql)
            .bind(since_ms)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn list_markets(&self, limit: i64) -> StoreResult<Vec<Market>> {
        let sql = format!(
            "SELECT {} FROM markets ORDER BY event_start_ms DESC, asset LIMIT ?1",
            MARKET_COLUMNS
        );
        self.fetch_markets(&sql, &[limit]).await
    }

    async fn count_snapshots(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn millis_to_utc(ms: i64, column: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("{} out of range: {}", column, ms)))
}

fn parse_decimal(text: &str, column: &str) -> StoreResult<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| StoreError::Corrupt(format!("{} is not a decimal ({:?}): {}", column, text, e)))
}

fn optional_decimal(row: &SqliteRow, column: &str) -> StoreResult<Option<Decimal>> {
    let text: Option<String> = row.try_get(column)?;
    text.as_deref().map(|t| parse_decimal(t, column)).transpose()
}

fn market_from_row(row: &SqliteRow) -> StoreResult<Market> {
    let outcome: Option<String> = row.try_get("outcome")?;
    let outcome = outcome
        .as_deref()
        .map(|s| {
            s.parse::<Outcome>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))
        })
        .transpose()?;

    Ok(Market {
        id: row.try_get("id")?,
        condition_id: row.try_get("condition_id")?,
        token_up: row.try_get("token_up")?,
        token_down: row.try_get("token_down")?,
        asset: row.try_get("asset")?,
        question: row.try_get("question")?,
        slug: row.try_get("slug")?,
        series_slug: row.try_get("series_slug")?,
        event_start_time: millis_to_utc(row.try_get("event_start_ms")?, "event_start_ms")?,
        hour_start: millis_to_utc(row.try_get("hour_start_ms")?, "hour_start_ms")?,
        hour_end: millis_to_utc(row.try_get("hour_end_ms")?, "hour_end_ms")?,
        outcome,
        created_at: millis_to_utc(row.try_get("created_at_ms")?, "created_at_ms")?,
        updated_at: millis_to_utc(row.try_get("updated_at_ms")?, "updated_at_ms")?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> StoreResult<Snapshot> {
    let up_price: String = row.try_get("up_price")?;
    let down_price: String = row.try_get("down_price")?;

    Ok(Snapshot {
        id: row.try_get("id")?,
        market_id: row.try_get("market_id")?,
        captured_at: millis_to_utc(row.try_get("captured_at_ms")?, "captured_at_ms")?,
        minute_of_hour: row.try_get("minute_of_hour")?,
        up_price: parse_decimal(&up_price, "up_price")?,
        down_price: parse_decimal(&down_price, "down_price")?,
        best_bid: optional_decimal(row, "best_bid")?,
        best_ask: optional_decimal(row, "best_ask")?,
        spread: optional_decimal(row, "spread")?,
        midpoint: optional_decimal(row, "midpoint")?,
        last_trade_price: optional_decimal(row, "last_trade_price")?,
        volume_24h: optional_decimal(row, "volume_24h")?,
    })
}
