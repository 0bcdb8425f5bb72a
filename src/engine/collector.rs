//! Snapshot collector
//!
//! Captures one price observation per market per pass. The four venue reads
//! for a market are issued together so they describe the same instant;
//! markets are captured concurrently up to a fixed cap.

use crate::config::Config;
use crate::market::{Market, MarketDataSource, VenueMarket};
use crate::orderbook::OrderBook;
use crate::retry::RetryPolicy;
use crate::store::{MarketRepository, NewSnapshot};
use crate::telemetry::{increment_counter, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct SnapshotCollector {
    repo: Arc<dyn MarketRepository>,
    source: Arc<dyn MarketDataSource>,
    retry: RetryPolicy,
    max_concurrent: usize,
}

impl SnapshotCollector {
    pub fn new(
        repo: Arc<dyn MarketRepository>,
        source: Arc<dyn MarketDataSource>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            source,
            retry: RetryPolicy::from(&config.retry),
            max_concurrent: config.collector.max_concurrent_markets.max(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Snapshot every market inside its hour; returns rows written
    pub async fn collect_active(&self) -> usize {
        self.collect_active_at(Utc::now()).await
    }

    pub async fn collect_active_at(&self, now: DateTime<Utc>) -> usize {
        let markets = match self.repo.get_active_markets(now).await {
            Ok(markets) => markets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load active markets");
                return 0;
            }
        };
        set_gauge(GaugeMetric::ActiveMarkets, markets.len() as f64);

        let written = self.capture_all(&markets, now).await;
        tracing::info!(markets = markets.len(), written, "Snapshot pass complete");
        written
    }

    /// Snapshot unresolved markets whose hour ends within `window_minutes`
    pub async fn collect_closing_soon(&self, window_minutes: i64) -> usize {
        self.collect_closing_soon_at(Utc::now(), window_minutes).await
    }

    pub async fn collect_closing_soon_at(&self, now: DateTime<Utc>, window_minutes: i64) -> usize {
        let markets = match self.repo.get_closing_markets(now, window_minutes).await {
            Ok(markets) => markets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load closing markets");
                return 0;
            }
        };

        let written = self.capture_all(&markets, now).await;
        tracing::info!(
            markets = markets.len(),
            window_minutes,
            written,
            "Closing-soon pass complete"
        );
        written
    }

    async fn capture_all(&self, markets: &[Market], now: DateTime<Utc>) -> usize {
        if markets.is_empty() {
            return 0;
        }

        // Captures own their collector handle and market; no borrows cross the stream
        let collector = self.clone();
        let written: Vec<bool> = stream::iter(markets.to_vec())
            .map(move |market| {
                let collector = collector.clone();
                async move { collector.capture_logged(&market, now).await }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        written.into_iter().filter(|w| *w).count()
    }

    async fn capture_logged(&self, market: &Market, now: DateTime<Utc>) -> bool {
        match self.capture_market(market, now).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    slug = %market.slug,
                    market_id = %market.id,
                    error = %e,
                    "Skipping snapshot"
                );
                increment_counter(CounterMetric::SnapshotFailures, 1);
                false
            }
        }
    }

    /// Read the venue for one market and append a snapshot; returns its id
    pub async fn capture_market(&self, market: &Market, now: DateTime<Utc>) -> anyhow::Result<i64> {
        let tokens = vec![market.token_up.clone(), market.token_down.clone()];

        let (prices, midpoint, book, venue) = tokio::join!(
            self.retry
                .run("get_prices", || self.source.get_prices(&tokens)),
            self.retry
                .run("get_midpoint", || self.source.get_midpoint(&market.token_up)),
            self.retry
                .run("get_order_book", || self.source.get_order_book(&market.token_up)),
            self.retry
                .run("get_market_by_slug", || self.source.get_market_by_slug(&market.slug)),
        );

        let snapshot = build_snapshot(market, now, &prices?, midpoint?, &book?, venue?.as_ref());
        let id = self.repo.insert_snapshot(&snapshot).await?;

        tracing::debug!(
            slug = %market.slug,
            minute = snapshot.minute_of_hour,
            up = %snapshot.up_price,
            down = %snapshot.down_price,
            spread = ?snapshot.spread,
            "Snapshot written"
        );
        increment_counter(CounterMetric::SnapshotsWritten, 1);

        Ok(id)
    }
}

/// Assemble a snapshot from one market's reads
///
/// Up/down prices fall back to zero; every other missing value stays absent.
pub fn build_snapshot(
    market: &Market,
    now: DateTime<Utc>,
    prices: &HashMap<String, Decimal>,
    midpoint: Option<Decimal>,
    book: &OrderBook,
    venue: Option<&VenueMarket>,
) -> NewSnapshot {
    NewSnapshot {
        market_id: market.id.clone(),
        captured_at: now,
        minute_of_hour: market.minute_of_hour(now),
        up_price: prices.get(&market.token_up).copied().unwrap_or(Decimal::ZERO),
        down_price: prices.get(&market.token_down).copied().unwrap_or(Decimal::ZERO),
        best_bid: book.best_bid(),
        best_ask: book.best_ask(),
        spread: book.spread(),
        midpoint,
        last_trade_price: venue.and_then(|v| v.last_trade_price),
        volume_24h: venue.and_then(|v| v.volume_24hr),
    }
}
