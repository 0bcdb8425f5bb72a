//! Polymarket CLOB REST client
//!
//! Price, midpoint and order book reads for individual outcome tokens.

use super::{OrderBook, PriceLevel};
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Polymarket CLOB REST base URL
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Configuration for the CLOB client
#[derive(Debug, Clone)]
pub struct ClobConfig {
    /// REST base URL (defaults to CLOB_API_URL)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            base_url: CLOB_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the CLOB REST endpoints
pub struct ClobClient {
    config: ClobConfig,
    client: Client,
}

impl ClobClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: ClobConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Buy-side price for each token in one request
    ///
    /// Tokens the venue does not quote are absent from the map.
    pub async fn fetch_prices(&self, token_ids: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
        if token_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/prices", self.config.base_url);
        let body: Vec<PriceRequest<'_>> = token_ids
            .iter()
            .map(|token_id| PriceRequest {
                token_id,
                side: "BUY",
            })
            .collect();

        tracing::debug!(url = %url, tokens = token_ids.len(), "Fetching CLOB prices");

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("CLOB prices error: {} - {}", status, text);
        }

        let raw: HashMap<String, HashMap<String, PriceValue>> = response.json().await?;
        Ok(buy_prices(raw))
    }

    /// Midpoint for a token; `None` when the venue has no book for it
    pub async fn fetch_midpoint(&self, token_id: &str) -> anyhow::Result<Option<Decimal>> {
        let url = format!("{}/midpoint", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("CLOB midpoint error: {} - {}", status, text);
        }

        let mid: MidpointResponse = response.json().await?;
        Ok(mid.mid.and_then(|v| v.into_decimal()))
    }

    /// Full order book for a token, levels sorted best-first
    pub async fn fetch_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook> {
        let url = format!("{}/book", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(OrderBook::new(token_id));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("CLOB book error: {} - {}", status, text);
        }

        let book: BookResponse = response.json().await?;
        let order_book = book_response_to_orderbook(token_id, book);

        tracing::debug!(
            token_id = %order_book.token_id,
            bid_count = order_book.bids.len(),
            ask_count = order_book.asks.len(),
            best_bid = ?order_book.best_bid(),
            best_ask = ?order_book.best_ask(),
            "Fetched order book"
        );

        Ok(order_book)
    }
}

#[derive(Debug, Serialize)]
struct PriceRequest<'a> {
    token_id: &'a str,
    side: &'a str,
}

/// The CLOB returns prices as strings but numbers show up too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Text(String),
    Number(Decimal),
}

impl PriceValue {
    fn into_decimal(self) -> Option<Decimal> {
        match self {
            PriceValue::Text(s) => Decimal::from_str(s.trim()).ok(),
            PriceValue::Number(d) => Some(d),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    #[serde(default)]
    mid: Option<PriceValue>,
}

/// Order book snapshot from the REST API
#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Price level in the order book
#[derive(Debug, Deserialize)]
struct BookLevel {
    price: String,
    size: String,
}

fn buy_prices(raw: HashMap<String, HashMap<String, PriceValue>>) -> HashMap<String, Decimal> {
    raw.into_iter()
        .filter_map(|(token, mut sides)| {
            let price = sides.remove("BUY")?.into_decimal()?;
            Some((token, price))
        })
        .collect()
}

fn parse_levels(levels: Vec<BookLevel>) -> Vec<PriceLevel> {
    levels
        .into_iter()
        .filter_map(|level| {
            let price = Decimal::from_str(&level.price).ok()?;
            let size = Decimal::from_str(&level.size).ok()?;
            Some(PriceLevel { price, size })
        })
        .collect()
}

/// Convert a REST book to our OrderBook type
fn book_response_to_orderbook(requested: &str, book: BookResponse) -> OrderBook {
    let token_id = book.asset_id.unwrap_or_else(|| requested.to_string());
    let mut order_book =
        OrderBook::from_levels(token_id, parse_levels(book.bids), parse_levels(book.asks));

    // Milliseconds since epoch
    if let Some(millis) = book.timestamp.and_then(|t| t.parse::<i64>().ok()) {
        if let Some(ts) = Utc.timestamp_millis_opt(millis).single() {
            order_book.updated_at = ts;
        }
    }

    order_book
}
