//! Gamma API client for market lookup
//!
//! Resolves an hourly slug to the venue's public market record: token ids,
//! window timestamps, closed flag, settlement prices and the aggregate
//! last-trade/volume view.

use super::VenueMarket;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Gamma API base URL
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: GAMMA_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: GammaConfig,
    client: Client,
}

impl GammaClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: GammaConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Fetch a market by its slug; `None` when the venue has not listed it
    pub async fn fetch_market_by_slug(&self, slug: &str) -> anyhow::Result<Option<VenueMarket>> {
        let url = format!("{}/markets", self.config.base_url);

        tracing::debug!(url = %url, slug, "Fetching market from Gamma API");

        let response = self.client.get(&url).query(&[("slug", slug)]).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        let gamma_markets: Vec<GammaMarket> = response.json().await?;

        Ok(gamma_markets.into_iter().next().map(convert_to_venue_market))
    }
}

/// Raw market response from Gamma API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    /// Condition ID for the market
    condition_id: String,
    /// Market question
    #[serde(default)]
    question: String,
    /// Market slug
    #[serde(default)]
    slug: Option<String>,
    /// CLOB token IDs as JSON string
    clob_token_ids: Option<String>,
    /// Outcome prices as JSON string
    outcome_prices: Option<String>,
    /// Start of the hour the market tracks
    event_start_time: Option<String>,
    /// Listing start date
    start_date: Option<String>,
    /// Market end date
    end_date: Option<String>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
    /// Last traded price
    #[serde(default)]
    last_trade_price: Option<Decimal>,
    /// 24h traded volume
    #[serde(default, rename = "volume24hr")]
    volume_24hr: Option<Decimal>,
    /// Parent events; the first one carries the series slug
    #[serde(default)]
    events: Option<Vec<GammaEventRef>>,
}

/// Parent event reference embedded in a market
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEventRef {
    #[serde(default)]
    series_slug: Option<String>,
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a GammaMarket to the source-agnostic venue record
fn convert_to_venue_market(gamma: GammaMarket) -> VenueMarket {
    let series_slug = gamma
        .events
        .as_ref()
        .and_then(|events| events.first())
        .and_then(|event| event.series_slug.clone());

    VenueMarket {
        condition_id: gamma.condition_id,
        question: gamma.question,
        slug: gamma.slug.unwrap_or_default(),
        clob_token_ids: gamma.clob_token_ids,
        outcome_prices: gamma.outcome_prices,
        event_start_time: parse_timestamp(gamma.event_start_time.as_deref()),
        start_date: parse_timestamp(gamma.start_date.as_deref()),
        end_date: parse_timestamp(gamma.end_date.as_deref()),
        active: gamma.active,
        closed: gamma.closed,
        last_trade_price: gamma.last_trade_price,
        volume_24hr: gamma.volume_24hr,
        series_slug,
    }
}
