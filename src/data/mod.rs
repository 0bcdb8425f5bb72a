//! Data export module
//!
//! Writes stored snapshots to Parquet for offline analysis

mod parquet;

pub use parquet::{read_snapshots, snapshot_schema, SnapshotExporter};
