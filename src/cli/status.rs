//! Status command implementation

use crate::config::Config;
use crate::market::classify;
use crate::store::{MarketRepository, SqliteRepository};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of markets to list
    #[arg(short, long, default_value_t = 20)]
    pub limit: i64,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let repo = SqliteRepository::connect(&config.database).await?;
        let now = Utc::now();

        let markets = repo.list_markets(self.limit).await?;
        println!("updown-tracker status ({})", config.database.url);
        println!("  Total snapshots: {}", repo.count_snapshots().await?);
        println!();

        for market in &markets {
            let snapshots = repo.get_snapshots_by_market(&market.id).await?;
            println!(
                "  {:<6} {:<48} {:<16} snapshots={}",
                market.asset,
                market.slug,
                classify(market, now).to_string(),
                snapshots.len()
            );
        }
        if markets.is_empty() {
            println!("  No markets tracked yet");
        }

        repo.close().await;
        Ok(())
    }
}
