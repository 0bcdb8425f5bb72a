//! Market model and venue access
//!
//! Hourly up/down markets, the phase derived from wall-clock time, and the
//! data source contract the engines read the venue through.

mod gamma;
pub mod slug;
mod source;

pub use gamma::{GammaClient, GammaConfig};
pub use source::PolymarketSource;

use crate::orderbook::OrderBook;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Length of one market window
pub fn hour_window() -> Duration {
    Duration::hours(1)
}

/// Final outcome of a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Up,
    Down,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Up => "UP",
            Outcome::Down => "DOWN",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "UP" => Ok(Outcome::Up),
            "DOWN" => Ok(Outcome::Down),
            other => anyhow::bail!("unknown outcome: {}", other),
        }
    }
}

/// One hourly binary up/down market for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Stable identifier
    pub id: String,
    /// Venue condition identifier (unique)
    pub condition_id: String,
    /// Token of the Up side
    pub token_up: String,
    /// Token of the Down side
    pub token_down: String,
    /// Asset symbol, e.g. "BTC"
    pub asset: String,
    /// Human-readable question
    pub question: String,
    /// Canonical hourly slug
    pub slug: String,
    /// Series grouping slug
    pub series_slug: Option<String>,
    /// Venue event start
    pub event_start_time: DateTime<Utc>,
    /// Start of the hour window
    pub hour_start: DateTime<Utc>,
    /// End of the hour window
    pub hour_end: DateTime<Utc>,
    /// Unset until the venue settles
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Whole minutes elapsed since the event start, floored; negative before it
    pub fn minute_of_hour(&self, now: DateTime<Utc>) -> i64 {
        (now - self.event_start_time).num_seconds().div_euclid(60)
    }

    /// Derived lifecycle phase at `now`
    pub fn phase(&self, now: DateTime<Utc>) -> MarketPhase {
        classify(self, now)
    }
}

/// Lifecycle phase, always recomputed from timestamps and outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    /// Listed, hour not started yet
    Discovered,
    /// Inside its hour
    Active,
    /// Hour over, outcome not known yet
    AwaitingClose,
    /// Outcome recorded
    Resolved(Outcome),
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketPhase::Discovered => write!(f, "discovered"),
            MarketPhase::Active => write!(f, "active"),
            MarketPhase::AwaitingClose => write!(f, "awaiting_close"),
            MarketPhase::Resolved(outcome) => write!(f, "resolved({})", outcome),
        }
    }
}

/// Classify a market at `now`.
///
/// Active covers `[event_start, event_start + 1h)`, the same window the
/// repository uses for its active-market query.
pub fn classify(market: &Market, now: DateTime<Utc>) -> MarketPhase {
    if let Some(outcome) = market.outcome {
        return MarketPhase::Resolved(outcome);
    }
    if now < market.event_start_time {
        MarketPhase::Discovered
    } else if now < market.event_start_time + hour_window() {
        MarketPhase::Active
    } else {
        MarketPhase::AwaitingClose
    }
}

/// Public market record as reported by the venue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueMarket {
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    /// JSON-encoded token id list, Up first
    pub clob_token_ids: Option<String>,
    /// JSON-encoded settlement/outcome price list, Up first
    pub outcome_prices: Option<String>,
    pub event_start_time: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub closed: bool,
    pub last_trade_price: Option<Decimal>,
    pub volume_24hr: Option<Decimal>,
    pub series_slug: Option<String>,
}

/// Read access to the venue
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current public record for a slug, `None` when not listed
    async fn get_market_by_slug(&self, slug: &str) -> anyhow::Result<Option<VenueMarket>>;
    /// Buy-side price per token
    async fn get_prices(&self, token_ids: &[String]) -> anyhow::Result<HashMap<String, Decimal>>;
    /// Midpoint for a token, `None` when the venue has none
    async fn get_midpoint(&self, token_id: &str) -> anyhow::Result<Option<Decimal>>;
    /// Order book for a token, levels best-first
    async fn get_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook>;
}

/// Parse CLOB token IDs from JSON string
///
/// Format: "[\"token1\", \"token2\"]" where token1 is Up and token2 is Down
pub fn parse_token_ids(token_ids_str: &str) -> anyhow::Result<(String, String)> {
    let tokens: Vec<String> = serde_json::from_str(token_ids_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse clobTokenIds: {} - {}", token_ids_str, e))?;

    if tokens.len() < 2 {
        anyhow::bail!(
            "Expected 2 token IDs, got {}: {}",
            tokens.len(),
            token_ids_str
        );
    }

    Ok((tokens[0].clone(), tokens[1].clone()))
}

/// Parse settlement prices from JSON string
///
/// Format: "[\"1\", \"0\"]" - returns (Up, Down)
pub fn parse_settlement_prices(prices_str: &str) -> anyhow::Result<(Decimal, Decimal)> {
    let prices: Vec<String> = serde_json::from_str(prices_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse outcomePrices: {} - {}", prices_str, e))?;

    if prices.len() < 2 {
        anyhow::bail!("Expected 2 outcome prices, got {}: {}", prices.len(), prices_str);
    }

    let up = Decimal::from_str(prices[0].trim())
        .map_err(|e| anyhow::anyhow!("Invalid Up price {:?}: {}", prices[0], e))?;
    let down = Decimal::from_str(prices[1].trim())
        .map_err(|e| anyhow::anyhow!("Invalid Down price {:?}: {}", prices[1], e))?;

    Ok((up, down))
}

/// Decide the outcome from settlement prices; `None` when neither side clears
/// the threshold
pub fn settle(up: Decimal, down: Decimal, threshold: Decimal) -> Option<Outcome> {
    if up > threshold {
        Some(Outcome::Up)
    } else if down > threshold {
        Some(Outcome::Down)
    } else {
        None
    }
}
