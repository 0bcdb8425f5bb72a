//! Single-pass engine commands

use super::Tracker;
use crate::config::{Config, MAX_CLOSING_WINDOW_MINUTES};
use clap::Args;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Only markets whose hour ends within this many minutes
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_CLOSING_WINDOW_MINUTES))]
    pub closing_window: Option<i64>,
}

impl SnapshotArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let tracker = Tracker::open(config).await?;

        let written = match self.closing_window {
            Some(window) => tracker.collector.collect_closing_soon(window).await,
            None => tracker.collector.collect_active().await,
        };
        println!("Snapshots written: {}", written);

        tracker.repo.close().await;
        Ok(())
    }
}

/// One discovery pass; prints the markets it created
pub async fn discover(config: &Config) -> anyhow::Result<()> {
    let tracker = Tracker::open(config).await?;

    let created = tracker.discovery.discover_new_markets().await;
    if created.is_empty() {
        println!("No new markets");
    }
    for market in &created {
        println!(
            "{:<6} {}  {} -> {}  up={} down={}",
            market.asset,
            market.slug,
            market.hour_start.format("%Y-%m-%d %H:%M"),
            market.hour_end.format("%H:%M UTC"),
            market.token_up,
            market.token_down
        );
    }

    tracker.repo.close().await;
    Ok(())
}

/// One resolution pass
pub async fn resolve(config: &Config) -> anyhow::Result<()> {
    let tracker = Tracker::open(config).await?;

    let resolved = tracker.resolution.check_resolutions().await;
    println!("Markets resolved: {}", resolved);

    tracker.repo.close().await;
    Ok(())
}
