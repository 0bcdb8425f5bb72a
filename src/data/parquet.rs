//! Parquet export of stored snapshots

use crate::store::Snapshot;
use arrow::array::{Array, ArrayRef, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const PRICE_COLUMNS: [&str; 6] = [
    "best_bid",
    "best_ask",
    "spread",
    "midpoint",
    "last_trade_price",
    "volume_24h",
];

/// Snapshot schema; prices are strings to keep decimal precision
pub fn snapshot_schema() -> Schema {
    let mut fields = vec![
        Field::new("id", DataType::Int64, false),
        Field::new("market_id", DataType::Utf8, false),
        Field::new(
            "captured_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("minute_of_hour", DataType::Int64, false),
        Field::new("up_price", DataType::Utf8, false),
        Field::new("down_price", DataType::Utf8, false),
    ];
    for name in PRICE_COLUMNS {
        fields.push(Field::new(name, DataType::Utf8, true));
    }
    Schema::new(fields)
}

/// Writes snapshot batches into an output directory
pub struct SnapshotExporter {
    output_dir: PathBuf,
}

impl SnapshotExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// File path for an export taken at `timestamp`
    pub fn file_path(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let filename = format!("snapshots_{}.parquet", timestamp.format("%Y%m%d_%H%M%S"));
        self.output_dir.join(filename)
    }

    /// Export to a new timestamped file; `None` when there is nothing to write
    pub fn export(
        &self,
        snapshots: &[Snapshot],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<PathBuf>> {
        if snapshots.is_empty() {
            return Ok(None);
        }
        let path = self.file_path(now);
        self.write_snapshots(&path, snapshots)?;
        Ok(Some(path))
    }

    /// Write snapshots to a Parquet file
    pub fn write_snapshots(&self, path: &Path, snapshots: &[Snapshot]) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        self.ensure_dir()?;

        let schema = Arc::new(snapshot_schema());
        let file = File::create(path)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let ids: Vec<i64> = snapshots.iter().map(|s| s.id).collect();
        let market_ids: Vec<&str> = snapshots.iter().map(|s| s.market_id.as_str()).collect();
        let captured: Vec<i64> = snapshots
            .iter()
            .map(|s| s.captured_at.timestamp_micros())
            .collect();
        let minutes: Vec<i64> = snapshots.iter().map(|s| s.minute_of_hour).collect();
        let ups: Vec<String> = snapshots.iter().map(|s| s.up_price.to_string()).collect();
        let downs: Vec<String> = snapshots.iter().map(|s| s.down_price.to_string()).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(market_ids)),
            Arc::new(TimestampMicrosecondArray::from(captured).with_timezone("UTC")),
            Arc::new(Int64Array::from(minutes)),
            Arc::new(StringArray::from(ups)),
            Arc::new(StringArray::from(downs)),
        ];

        let optional: [fn(&Snapshot) -> Option<Decimal>; 6] = [
            |s| s.best_bid,
            |s| s.best_ask,
            |s| s.spread,
            |s| s.midpoint,
            |s| s.last_trade_price,
            |s| s.volume_24h,
        ];
        for field in optional {
            let values: Vec<Option<String>> = snapshots
                .iter()
                .map(|s| field(s).map(|d| d.to_string()))
                .collect();
            columns.push(Arc::new(StringArray::from(values)));
        }

        let batch = RecordBatch::try_new(schema, columns)?;

        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(path = ?path, count = snapshots.len(), "Exported snapshots to Parquet");

        Ok(())
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}

fn optional_decimal(array: &StringArray, row: usize) -> anyhow::Result<Option<Decimal>> {
    if array.is_null(row) {
        return Ok(None);
    }
    Ok(Some(Decimal::from_str(array.value(row))?))
}

/// Read snapshots back from an exported file
pub fn read_snapshots(path: &Path) -> anyhow::Result<Vec<Snapshot>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut snapshots = Vec::new();

    for batch_result in reader {
        let batch = batch_result?;

        let ids = column::<Int64Array>(&batch, "id")?;
        let market_ids = column::<StringArray>(&batch, "market_id")?;
        let captured = column::<TimestampMicrosecondArray>(&batch, "captured_at")?;
        let minutes = column::<Int64Array>(&batch, "minute_of_hour")?;
        let ups = column::<StringArray>(&batch, "up_price")?;
        let downs = column::<StringArray>(&batch, "down_price")?;
        let optional = PRICE_COLUMNS
            .iter()
            .map(|name| column::<StringArray>(&batch, name))
            .collect::<anyhow::Result<Vec<_>>>()?;

        for i in 0..batch.num_rows() {
            let captured_at = DateTime::from_timestamp_micros(captured.value(i))
                .ok_or_else(|| anyhow::anyhow!("Invalid captured_at"))?;

            snapshots.push(Snapshot {
                id: ids.value(i),
                market_id: market_ids.value(i).to_string(),
                captured_at,
                minute_of_hour: minutes.value(i),
                up_price: Decimal::from_str(ups.value(i))?,
                down_price: Decimal::from_str(downs.value(i))?,
                best_bid: optional_decimal(optional[0], i)?,
                best_ask: optional_decimal(optional[1], i)?,
                spread: optional_decimal(optional[2], i)?,
                midpoint: optional_decimal(optional[3], i)?,
                last_trade_price: optional_decimal(optional[4], i)?,
                volume_24h: optional_decimal(optional[5], i)?,
            });
        }
    }

    Ok(snapshots)
}
