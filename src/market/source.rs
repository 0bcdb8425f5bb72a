//! Live venue data source backed by the Gamma and CLOB APIs

use super::{GammaClient, GammaConfig, MarketDataSource, VenueMarket};
use crate::config::VenueConfig;
use crate::orderbook::{ClobClient, ClobConfig, OrderBook};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;

/// Polymarket public read APIs behind the `MarketDataSource` contract
pub struct PolymarketSource {
    gamma: GammaClient,
    clob: ClobClient,
}

impl PolymarketSource {
    pub fn new(gamma: GammaClient, clob: ClobClient) -> Self {
        Self { gamma, clob }
    }

    /// Build both clients from the venue section of the config
    pub fn from_config(venue: &VenueConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(venue.timeout_secs);
        let gamma = GammaClient::with_config(GammaConfig {
            base_url: venue.gamma_url.clone(),
            timeout,
        })?;
        let clob = ClobClient::with_config(ClobConfig {
            base_url: venue.clob_url.clone(),
            timeout,
        })?;

        tracing::debug!(
            gamma = gamma.base_url(),
            clob = clob.base_url(),
            "Venue clients configured"
        );

        Ok(Self::new(gamma, clob))
    }
}

#[async_trait]
impl MarketDataSource for PolymarketSource {
    async fn get_market_by_slug(&self, slug: &str) -> anyhow::Result<Option<VenueMarket>> {
        self.gamma.fetch_market_by_slug(slug).await
    }

    async fn get_prices(&self, token_ids: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
        self.clob.fetch_prices(token_ids).await
    }

    async fn get_midpoint(&self, token_id: &str) -> anyhow::Result<Option<Decimal>> {
        self.clob.fetch_midpoint(token_id).await
    }

    async fn get_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook> {
        self.clob.fetch_order_book(token_id).await
    }
}
