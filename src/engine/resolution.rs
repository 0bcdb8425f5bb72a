//! Resolution engine
//!
//! Records the outcome of markets whose hour has ended once the venue marks
//! them closed and one settlement price clears the threshold. Markets that
//! are not settled yet are simply revisited on the next pass.

use crate::config::Config;
use crate::market::{parse_settlement_prices, settle, Market, MarketDataSource, Outcome};
use crate::retry::RetryPolicy;
use crate::store::{MarketRepository, StoreError};
use crate::telemetry::{increment_counter, CounterMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Result of checking one past-due market
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Outcome written
    Resolved(Outcome),
    /// The venue no longer lists the slug
    NotListed,
    /// Listed but not closed yet
    NotClosed,
    /// Closed, but neither settlement price clears the threshold
    Ambiguous { up: Decimal, down: Decimal },
    /// Settlement prices missing or unreadable
    Unparseable(String),
    /// Some other pass recorded the outcome first
    AlreadyResolved,
    /// Venue or store error
    Failed(String),
}

pub struct ResolutionEngine {
    repo: Arc<dyn MarketRepository>,
    source: Arc<dyn MarketDataSource>,
    retry: RetryPolicy,
    threshold: Decimal,
}

impl ResolutionEngine {
    pub fn new(
        repo: Arc<dyn MarketRepository>,
        source: Arc<dyn MarketDataSource>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            source,
            retry: RetryPolicy::from(&config.retry),
            threshold: config.resolution.settlement_threshold,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check every past-due unresolved market; returns outcomes written
    pub async fn check_resolutions(&self) -> usize {
        self.check_resolutions_at(Utc::now()).await
    }

    pub async fn check_resolutions_at(&self, now: DateTime<Utc>) -> usize {
        let markets = match self.repo.get_pending_resolution_markets(now).await {
            Ok(markets) => markets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load pending markets");
                return 0;
            }
        };

        let mut resolved = 0;
        for market in &markets {
            if let Resolution::Resolved(_) = self.resolve_market(market, now).await {
                resolved += 1;
            }
        }

        tracing::info!(pending = markets.len(), resolved, "Resolution pass complete");
        resolved
    }

    pub async fn resolve_market(&self, market: &Market, now: DateTime<Utc>) -> Resolution {
        let pending_minutes = (now - market.hour_end).num_minutes();

        let venue = match self
            .retry
            .run("get_market_by_slug", || {
                self.source.get_market_by_slug(&market.slug)
            })
            .await
        {
            Ok(Some(venue)) => venue,
            Ok(None) => {
                tracing::warn!(slug = %market.slug, pending_minutes, "Pending market not listed");
                return Resolution::NotListed;
            }
            Err(e) => {
                tracing::warn!(slug = %market.slug, error = %e, "Venue lookup failed");
                return Resolution::Failed(e.to_string());
            }
        };

        if !venue.closed {
            tracing::info!(slug = %market.slug, pending_minutes, "Market awaiting close");
            increment_counter(CounterMetric::ResolutionPending, 1);
            return Resolution::NotClosed;
        }

        let parsed = venue
            .outcome_prices
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("closed market has no outcomePrices"))
            .and_then(parse_settlement_prices);
        let (up, down) = match parsed {
            Ok(prices) => prices,
            Err(e) => {
                tracing::warn!(slug = %market.slug, error = %e, "Unreadable settlement prices");
                return Resolution::Unparseable(e.to_string());
            }
        };

        let Some(outcome) = settle(up, down, self.threshold) else {
            tracing::warn!(
                slug = %market.slug,
                %up,
                %down,
                threshold = %self.threshold,
                pending_minutes,
                "Ambiguous settlement, leaving outcome unset"
            );
            increment_counter(CounterMetric::AmbiguousSettlements, 1);
            return Resolution::Ambiguous { up, down };
        };

        match self.repo.update_outcome(&market.id, outcome).await {
            Ok(()) => {
                tracing::info!(
                    asset = %market.asset,
                    slug = %market.slug,
                    %outcome,
                    "Market resolved"
                );
                increment_counter(CounterMetric::MarketsResolved, 1);
                Resolution::Resolved(outcome)
            }
            Err(StoreError::AlreadyResolved { .. }) => {
                tracing::debug!(slug = %market.slug, "Outcome already recorded");
                Resolution::AlreadyResolved
            }
            Err(e) => {
                tracing::warn!(slug = %market.slug, error = %e, "Failed to record outcome");
                Resolution::Failed(e.to_string())
            }
        }
    }
}
