//! Export command implementation

use crate::config::Config;
use crate::data::SnapshotExporter;
use crate::store::{MarketRepository, SqliteRepository};
use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory for the Parquet file
    #[arg(short, long, default_value = "./data")]
    pub output: PathBuf,

    /// Only snapshots captured at or after this RFC 3339 instant
    #[arg(long, value_parser = parse_rfc3339)]
    pub since: Option<DateTime<Utc>>,
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp {:?}: {}", value, e))
}

impl ExportArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let repo = SqliteRepository::connect(&config.database).await?;
        let snapshots = repo.get_snapshots_since(self.since).await?;
        repo.close().await;

        let exporter = SnapshotExporter::new(&self.output);
        match exporter.export(&snapshots, Utc::now())? {
            Some(path) => println!("Exported {} snapshots to {}", snapshots.len(), path.display()),
            None => println!("No snapshots to export"),
        }
        Ok(())
    }
}
