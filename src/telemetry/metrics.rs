//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// New markets persisted by discovery
    MarketsDiscovered,
    /// Slugs skipped because of a venue or store error
    DiscoveryFailures,
    /// Snapshot rows written
    SnapshotsWritten,
    /// Markets whose snapshot was skipped
    SnapshotFailures,
    /// Outcomes recorded
    MarketsResolved,
    /// Past-due markets the venue has not closed yet
    ResolutionPending,
    /// Closed markets with no side above the threshold
    AmbiguousSettlements,
    /// Extra attempts made by the retry policy
    RetryAttempts,
}

impl CounterMetric {
    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::MarketsDiscovered => "updown_markets_discovered_total",
            CounterMetric::DiscoveryFailures => "updown_discovery_failures_total",
            CounterMetric::SnapshotsWritten => "updown_snapshots_written_total",
            CounterMetric::SnapshotFailures => "updown_snapshot_failures_total",
            CounterMetric::MarketsResolved => "updown_markets_resolved_total",
            CounterMetric::ResolutionPending => "updown_resolution_pending_total",
            CounterMetric::AmbiguousSettlements => "updown_ambiguous_settlements_total",
            CounterMetric::RetryAttempts => "updown_retry_attempts_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeMetric {
    /// Markets inside their hour at the last coarse pass
    ActiveMarkets,
}

impl GaugeMetric {
    pub fn name(&self) -> &'static str {
        match self {
            GaugeMetric::ActiveMarkets => "updown_active_markets",
        }
    }
}

const JOB_DURATION_METRIC: &str = "updown_job_duration_ms";

/// Increment a counter
pub fn increment_counter(metric: CounterMetric, value: u64) {
    metrics::counter!(metric.name()).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Record how long one run of a scheduled job took
pub fn record_job_duration(job: &'static str, duration: Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    metrics::histogram!(JOB_DURATION_METRIC, "job" => job).record(ms);
    tracing::debug!(metric = JOB_DURATION_METRIC, job, value_ms = ms, "Recording job duration");
}

/// Install the Prometheus recorder with an HTTP scrape listener on `port`
pub fn install_prometheus(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}
