//! Order book module
//!
//! Order book snapshots and the Polymarket CLOB REST reads behind them

mod book;
mod client;

pub use book::OrderBook;
pub use client::{ClobClient, ClobConfig, CLOB_API_URL};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size available
    pub size: Decimal,
}
