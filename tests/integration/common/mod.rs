//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use updown_tracker::config::Config;
use updown_tracker::market::{MarketDataSource, VenueMarket};
use updown_tracker::orderbook::{OrderBook, PriceLevel};

pub const BTC_7AM: &str = "bitcoin-up-or-down-march-10-7am-et";
pub const BTC_8AM: &str = "bitcoin-up-or-down-march-10-8am-et";
pub const ETH_7AM: &str = "ethereum-up-or-down-march-10-7am-et";
pub const ETH_8AM: &str = "ethereum-up-or-down-march-10-8am-et";

/// 2024-03-10 in UTC; 11:00Z is 7am EDT
pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
}

pub fn config() -> Config {
    toml::from_str(
        r#"
        [[assets]]
        symbol = "BTC"
        slug_prefix = "bitcoin-up-or-down"

        [[assets]]
        symbol = "ETH"
        slug_prefix = "ethereum-up-or-down"

        [retry]
        max_attempts = 1
        delay_ms = 0
        "#,
    )
    .unwrap()
}

/// Listed, open hourly market starting at `start`
pub fn hourly(slug: &str, condition_id: &str, start: DateTime<Utc>) -> VenueMarket {
    VenueMarket {
        condition_id: condition_id.to_string(),
        question: format!("{} question", slug),
        slug: slug.to_string(),
        clob_token_ids: Some(format!(r#"["{0}-up", "{0}-down"]"#, condition_id)),
        event_start_time: Some(start),
        end_date: Some(start + chrono::Duration::hours(1)),
        active: true,
        closed: false,
        last_trade_price: Some(Decimal::new(44, 2)),
        volume_24hr: Some(Decimal::new(152050, 2)),
        ..Default::default()
    }
}

/// In-process venue with scripted responses and call accounting
#[derive(Default)]
pub struct ScriptedSource {
    pub markets: Mutex<HashMap<String, VenueMarket>>,
    pub prices: Mutex<HashMap<String, Decimal>>,
    pub book: Mutex<(Vec<Decimal>, Vec<Decimal>)>,
    pub midpoint: Mutex<Option<Decimal>>,
    /// Pause inside each price read, to observe overlap
    pub price_delay: Option<Duration>,
    pub slug_lookups: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn list(&self, market: VenueMarket) {
        self.markets
            .lock()
            .unwrap()
            .insert(market.slug.clone(), market);
    }

    pub fn settle(&self, slug: &str, prices: &str) {
        let mut markets = self.markets.lock().unwrap();
        let market = markets.get_mut(slug).expect("market listed");
        market.closed = true;
        market.active = false;
        market.outcome_prices = Some(prices.to_string());
    }

    pub fn quote(&self, token: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(token.to_string(), price);
    }

    pub fn set_book(&self, bids: Vec<Decimal>, asks: Vec<Decimal>) {
        *self.book.lock().unwrap() = (bids, asks);
    }

    pub fn set_midpoint(&self, midpoint: Option<Decimal>) {
        *self.midpoint.lock().unwrap() = midpoint;
    }

    pub fn lookups_of(&self, slug: &str) -> usize {
        self.slug_lookups
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == slug)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn levels(prices: &[Decimal]) -> Vec<PriceLevel> {
    prices
        .iter()
        .map(|&price| PriceLevel {
            price,
            size: Decimal::new(100, 0),
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn get_market_by_slug(&self, slug: &str) -> anyhow::Result<Option<VenueMarket>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.slug_lookups.lock().unwrap().push(slug.to_string());
        Ok(self.markets.lock().unwrap().get(slug).cloned())
    }

    async fn get_prices(&self, token_ids: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if let Some(delay) = self.price_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let prices = self.prices.lock().unwrap();
        Ok(token_ids
            .iter()
            .filter_map(|t| prices.get(t).map(|p| (t.clone(), *p)))
            .collect())
    }

    async fn get_midpoint(&self, _token_id: &str) -> anyhow::Result<Option<Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.midpoint.lock().unwrap())
    }

    async fn get_order_book(&self, token_id: &str) -> anyhow::Result<OrderBook> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (bids, asks) = self.book.lock().unwrap().clone();
        Ok(OrderBook::from_levels(token_id, levels(&bids), levels(&asks)))
    }
}
