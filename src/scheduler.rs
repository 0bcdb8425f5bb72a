//! Periodic job scheduler
//!
//! Each job runs in its own task on its own interval. A job finishes before
//! its next tick is considered, so a job never overlaps itself; different
//! jobs may run at the same time.

use crate::config::Config;
use crate::engine::{DiscoveryEngine, ResolutionEngine, SnapshotCollector};
use crate::telemetry::record_job_duration;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// The four periodic jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Discovery,
    Snapshot,
    ClosingSoon,
    Resolution,
}

impl Job {
    pub const ALL: [Job; 4] = [Job::Discovery, Job::Snapshot, Job::ClosingSoon, Job::Resolution];

    pub fn name(&self) -> &'static str {
        match self {
            Job::Discovery => "discovery",
            Job::Snapshot => "snapshot",
            Job::ClosingSoon => "closing_soon",
            Job::Resolution => "resolution",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Scheduler {
    discovery: DiscoveryEngine,
    collector: SnapshotCollector,
    resolution: ResolutionEngine,
    config: Config,
}

impl Scheduler {
    pub fn new(
        discovery: DiscoveryEngine,
        collector: SnapshotCollector,
        resolution: ResolutionEngine,
        config: Config,
    ) -> Self {
        Self {
            discovery,
            collector,
            resolution,
            config,
        }
    }

    /// Configured cadence of a job
    pub fn interval(&self, job: Job) -> Duration {
        let schedule = &self.config.schedule;
        let secs = match job {
            Job::Discovery => schedule.discovery_interval_secs,
            Job::Snapshot => schedule.snapshot_interval_secs,
            Job::ClosingSoon => schedule.closing_interval_secs,
            Job::Resolution => schedule.resolution_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Run one job to completion; returns the number of items it produced
    pub async fn run_job(&self, job: Job) -> usize {
        let started = Instant::now();

        let produced = match job {
            Job::Discovery => self.discovery.discover_new_markets().await.len(),
            Job::Snapshot => self.collector.collect_active().await,
            Job::ClosingSoon => {
                self.collector
                    .collect_closing_soon(self.config.collector.closing_window_minutes)
                    .await
            }
            Job::Resolution => self.resolution.check_resolutions().await,
        };

        let elapsed = started.elapsed();
        record_job_duration(job.name(), elapsed);
        tracing::debug!(
            job = %job,
            produced,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job finished"
        );
        produced
    }

    /// Spawn every job and wait until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let handles: Vec<JoinHandle<()>> = Job::ALL
            .iter()
            .map(|&job| {
                let scheduler = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.job_loop(job, shutdown).await })
            })
            .collect();

        tracing::info!(jobs = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job task panicked");
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn job_loop(&self, job: Job, mut shutdown: watch::Receiver<bool>) {
        let period = self.interval(job);
        let delay = first_delay(Utc::now(), period, self.config.schedule.align_to_wall_clock);

        let mut ticker = tokio::time::interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            job = %job,
            interval_secs = period.as_secs(),
            first_run_in_secs = delay.as_secs(),
            "Job scheduled"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_job(job).await;
                }
            }
        }

        tracing::info!(job = %job, "Job stopped");
    }
}

/// Delay before a job's first run
///
/// Aligned jobs fire on wall-clock multiples of their interval, like cron;
/// unaligned jobs fire right away.
pub fn first_delay(now: DateTime<Utc>, interval: Duration, align: bool) -> Duration {
    let period_ms = interval.as_millis() as i64;
    if !align || period_ms == 0 {
        return Duration::ZERO;
    }

    let remainder = now.timestamp_millis().rem_euclid(period_ms);
    if remainder == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - remainder) as u64)
    }
}

/// Resolve once SIGINT or SIGTERM arrives
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
