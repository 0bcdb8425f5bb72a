//! Run command implementation

use super::Tracker;
use crate::config::Config;
use crate::scheduler::{shutdown_signal, Scheduler};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run one discovery pass before the first scheduled tick
    #[arg(long)]
    pub discover_now: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let tracker = Tracker::open(config).await?;
        let repo = tracker.repo.clone();

        if self.discover_now {
            let created = tracker.discovery.discover_new_markets().await;
            tracing::info!(created = created.len(), "Startup discovery pass");
        }

        let scheduler = Arc::new(Scheduler::new(
            tracker.discovery,
            tracker.collector,
            tracker.resolution,
            config.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        tracing::info!(
            assets = config.assets.len(),
            database = %config.database.url,
            "Tracker running"
        );
        scheduler.run(shutdown_rx).await;

        repo.close().await;
        Ok(())
    }
}
