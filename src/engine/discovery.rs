//! Discovery engine
//!
//! Probes the venue for the current and upcoming hourly slugs of each asset
//! and persists markets the repository has not seen yet.

use crate::config::{AssetConfig, Config};
use crate::market::slug;
use crate::market::{hour_window, parse_token_ids, Market, MarketDataSource, VenueMarket};
use crate::retry::RetryPolicy;
use crate::store::{MarketRepository, StoreError};
use crate::telemetry::{increment_counter, CounterMetric};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one probed slug
#[derive(Debug, Clone, PartialEq)]
pub enum SlugOutcome {
    /// Already in the repository; the venue was not asked
    Known,
    /// The venue has not listed it yet
    NotListed,
    /// Listed, but the record cannot become a market
    Malformed(String),
    /// Newly persisted
    Created(Market),
    /// Venue or store error; retried on the next pass
    Failed(String),
}

pub struct DiscoveryEngine {
    repo: Arc<dyn MarketRepository>,
    source: Arc<dyn MarketDataSource>,
    assets: Vec<AssetConfig>,
    lookahead_hours: usize,
    retry: RetryPolicy,
}

impl DiscoveryEngine {
    pub fn new(
        repo: Arc<dyn MarketRepository>,
        source: Arc<dyn MarketDataSource>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            source,
            assets: config.assets.clone(),
            lookahead_hours: config.discovery.lookahead_hours as usize,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run discovery for every configured asset
    pub async fn discover_new_markets(&self) -> Vec<Market> {
        self.discover_new_markets_at(Utc::now()).await
    }

    pub async fn discover_new_markets_at(&self, now: DateTime<Utc>) -> Vec<Market> {
        let mut created = Vec::new();
        for asset in &self.assets {
            created.extend(self.discover_asset_at(asset, now).await);
        }

        tracing::info!(
            assets = self.assets.len(),
            created = created.len(),
            "Discovery pass complete"
        );
        created
    }

    /// Probe the upcoming slugs of one asset, in order
    pub async fn discover_asset(&self, asset: &AssetConfig) -> Vec<Market> {
        self.discover_asset_at(asset, Utc::now()).await
    }

    pub async fn discover_asset_at(&self, asset: &AssetConfig, now: DateTime<Utc>) -> Vec<Market> {
        self.scan_asset_at(asset, now)
            .await
            .into_iter()
            .filter_map(|(_, outcome)| match outcome {
                SlugOutcome::Created(market) => Some(market),
                _ => None,
            })
            .collect()
    }

    /// Probe every lookahead slug of an asset, in order, keeping each outcome
    pub async fn scan_asset_at(
        &self,
        asset: &AssetConfig,
        now: DateTime<Utc>,
    ) -> Vec<(String, SlugOutcome)> {
        let slugs = slug::upcoming_slugs_from(&asset.slug_prefix, now, self.lookahead_hours);

        let mut outcomes = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let outcome = self.discover_slug(asset, &slug, now).await;
            outcomes.push((slug, outcome));
        }
        outcomes
    }

    /// Resolve a single slug against the repository and then the venue
    pub async fn discover_slug(
        &self,
        asset: &AssetConfig,
        slug: &str,
        now: DateTime<Utc>,
    ) -> SlugOutcome {
        match self.repo.get_market_by_slug(slug).await {
            Ok(Some(_)) => {
                tracing::trace!(slug, "Market already known");
                return SlugOutcome::Known;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(slug, error = %e, "Repository lookup failed");
                increment_counter(CounterMetric::DiscoveryFailures, 1);
                return SlugOutcome::Failed(e.to_string());
            }
        }

        let venue = match self
            .retry
            .run("get_market_by_slug", || self.source.get_market_by_slug(slug))
            .await
        {
            Ok(Some(venue)) => venue,
            Ok(None) => {
                tracing::debug!(slug, "Market not listed yet");
                return SlugOutcome::NotListed;
            }
            Err(e) => {
                tracing::warn!(slug, error = %e, "Venue lookup failed");
                increment_counter(CounterMetric::DiscoveryFailures, 1);
                return SlugOutcome::Failed(e.to_string());
            }
        };

        let market = match market_from_venue(asset, slug, &venue, now) {
            Ok(market) => market,
            Err(e) => {
                tracing::warn!(slug, error = %e, "Skipping malformed market");
                increment_counter(CounterMetric::DiscoveryFailures, 1);
                return SlugOutcome::Malformed(e.to_string());
            }
        };

        match self.repo.upsert_market(&market).await {
            Ok(()) => {
                tracing::info!(
                    asset = %market.asset,
                    slug = %market.slug,
                    condition_id = %market.condition_id,
                    hour_start = %market.hour_start,
                    "Discovered market"
                );
                increment_counter(CounterMetric::MarketsDiscovered, 1);
                SlugOutcome::Created(market)
            }
            Err(StoreError::Duplicate { condition_id }) => {
                // Another pass persisted it first
                tracing::info!(slug, condition_id = %condition_id, "Market persisted concurrently");
                SlugOutcome::Known
            }
            Err(e) => {
                tracing::warn!(slug, error = %e, "Failed to persist market");
                increment_counter(CounterMetric::DiscoveryFailures, 1);
                SlugOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Build a new unresolved market from the venue record
///
/// The hour starts at the venue's event start, falling back to one hour
/// before the end date, then to the hour the slug names.
pub fn market_from_venue(
    asset: &AssetConfig,
    slug: &str,
    venue: &VenueMarket,
    now: DateTime<Utc>,
) -> anyhow::Result<Market> {
    let token_ids = venue
        .clob_token_ids
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("market has no clobTokenIds"))?;
    let (token_up, token_down) = parse_token_ids(token_ids)?;

    let hour_start = venue
        .event_start_time
        .or_else(|| venue.end_date.map(|end| end - hour_window()))
        .or_else(|| slug::decode_near(slug, now))
        .ok_or_else(|| anyhow::anyhow!("cannot determine the market hour"))?;

    let hour_end = venue.end_date.unwrap_or(hour_start + hour_window());
    if hour_end - hour_start != hour_window() {
        tracing::warn!(
            slug,
            %hour_start,
            %hour_end,
            "Venue window is not exactly one hour"
        );
    }

    Ok(Market {
        id: Uuid::new_v4().to_string(),
        condition_id: venue.condition_id.clone(),
        token_up,
        token_down,
        asset: asset.symbol.clone(),
        question: venue.question.clone(),
        slug: slug.to_string(),
        series_slug: venue
            .series_slug
            .clone()
            .or_else(|| asset.series_slug.clone()),
        event_start_time: hour_start,
        hour_start,
        hour_end,
        outcome: None,
        created_at: now,
        updated_at: now,
    })
}
