//! CLI interface for updown-tracker
//!
//! Provides subcommands for:
//! - `run`: Start the scheduler with all four jobs
//! - `discover` / `snapshot` / `resolve`: Run a single pass of one engine
//! - `status`: Show recent markets and their phase
//! - `export`: Write snapshots to Parquet
//! - `slug`: Print upcoming hourly slugs
//! - `config`: Show the effective configuration

mod export;
pub mod once;
mod run;
mod slug;
mod status;

pub use export::ExportArgs;
pub use once::SnapshotArgs;
pub use run::RunArgs;
pub use slug::SlugArgs;
pub use status::StatusArgs;

use crate::config::Config;
use crate::engine::{DiscoveryEngine, ResolutionEngine, SnapshotCollector};
use crate::market::{MarketDataSource, PolymarketSource};
use crate::store::{MarketRepository, SqliteRepository};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "updown-tracker")]
#[command(about = "Observational tracker for Polymarket hourly crypto up/down markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run discovery, snapshots and resolution on their schedules
    Run(RunArgs),
    /// Run one discovery pass
    Discover,
    /// Run one snapshot pass
    Snapshot(SnapshotArgs),
    /// Run one resolution pass
    Resolve,
    /// Show recent markets
    Status(StatusArgs),
    /// Export snapshots to Parquet
    Export(ExportArgs),
    /// Print upcoming hourly slugs for a prefix
    Slug(SlugArgs),
    /// Show configuration
    Config,
}

/// Store plus the three engines wired to the live venue
pub struct Tracker {
    pub repo: Arc<SqliteRepository>,
    pub discovery: DiscoveryEngine,
    pub collector: SnapshotCollector,
    pub resolution: ResolutionEngine,
}

impl Tracker {
    /// Open the store and build the engines; a store failure here is fatal
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let repo = Arc::new(SqliteRepository::connect(&config.database).await?);
        let source: Arc<dyn MarketDataSource> =
            Arc::new(PolymarketSource::from_config(&config.venue)?);
        let store: Arc<dyn MarketRepository> = repo.clone();

        Ok(Self {
            discovery: DiscoveryEngine::new(store.clone(), source.clone(), config),
            collector: SnapshotCollector::new(store.clone(), source.clone(), config),
            resolution: ResolutionEngine::new(store, source, config),
            repo,
        })
    }
}
