//! Benchmark orchestration: warmup, timed runs and bulk loads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{QueryClient, VersionInfo};
use crate::dispatcher::Dispatcher;
use crate::error::{BenchError, BenchResult};
use crate::measure::measure;
use crate::progress::{ProgressObserver, ProgressReporter};
use crate::stats::{SharedStats, StatsSnapshot};
use crate::workload::{self, WorkItem};

/// Outcome of one timed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchRun {
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_info: Option<VersionInfo>,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub concurrency: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeats: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk_size: Option<usize>,
    pub failed: u64,
    /// Latencies in milliseconds.
    pub stats: StatsSnapshot,
}

impl BenchRun {
    pub fn elapsed_secs(&self) -> f64 {
        (self.ended - self.started).num_milliseconds() as f64 / 1000.0
    }
}

/// Runs a statement repeatedly and measures it.
pub struct QueryRunner {
    client: Arc<QueryClient>,
    show_progress: bool,
}

impl QueryRunner {
    pub fn new(client: Arc<QueryClient>) -> Self {
        Self {
            client,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Execute `stmt` `times` times with unbounded fan-out, discarding results.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn warmup(&self, stmt: &str, times: u64) {
        if times == 0 {
            return;
        }
        debug!(times, "Warming up");
        let client = self.client.clone();
        let result = Dispatcher::new(0)
            .run(workload::repeat(stmt, times), move |item| {
                let client = client.clone();
                async move { client.execute(&item).await }
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Warmup failed");
        }
    }

    /// Execute `stmt` `repeats` times at `concurrency` and collect latencies.
    pub async fn run(&self, stmt: &str, repeats: u64, concurrency: u32) -> BenchResult<BenchRun> {
        let version_info = self.version_info().await;
        let stats = SharedStats::new();

        info!(statement = stmt, repeats, concurrency, "Starting timed run");
        let started = Utc::now();

        let client = self.client.clone();
        let sink = stats.clone();
        Dispatcher::new(concurrency)
            .with_progress(self.progress(stmt))
            .with_total_hint(Some(repeats))
            .run(workload::repeat(stmt, repeats), move |item| {
                let client = client.clone();
                let sink = sink.clone();
                async move { measure(&sink, client.execute(&item)).await }
            })
            .await?;

        let ended = Utc::now();
        let run = BenchRun {
            statement: stmt.to_string(),
            version_info,
            started,
            ended,
            concurrency,
            repeats: Some(repeats),
            bulk_size: None,
            failed: stats.failures(),
            stats: stats.snapshot().await,
        };
        info!(
            statement = stmt,
            mean_ms = run.stats.mean,
            p99_ms = run.stats.percentiles.p99,
            "Timed run finished"
        );
        Ok(run)
    }

    async fn version_info(&self) -> Option<VersionInfo> {
        version_info(&self.client).await
    }

    fn progress(&self, label: &str) -> Arc<dyn ProgressObserver> {
        progress_for(self.show_progress, label)
    }
}

/// Loads rows through batched insert requests and measures each batch.
pub struct BulkLoader {
    client: Arc<QueryClient>,
    bulk_size: usize,
    show_progress: bool,
}

impl BulkLoader {
    pub fn new(client: Arc<QueryClient>, bulk_size: usize) -> BenchResult<Self> {
        if bulk_size == 0 {
            return Err(BenchError::config("bulk_size must be > 0"));
        }
        Ok(Self {
            client,
            bulk_size,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Insert every `(statement, args)` row, `bulk_size` rows per request.
    ///
    /// `num_records`, when known, only drives the progress display.
    pub async fn load<I>(
        &self,
        rows: I,
        concurrency: u32,
        num_records: Option<u64>,
    ) -> BenchResult<BenchRun>
    where
        I: IntoIterator<Item = (Arc<str>, Vec<Value>)>,
    {
        let mut batches = workload::bulk_batches(rows, self.bulk_size).peekable();
        let statement = batches
            .peek()
            .map(|b: &WorkItem| b.stmt().to_string())
            .ok_or(BenchError::EmptyWorkload)?;

        let version_info = version_info(&self.client).await;
        let stats = SharedStats::new();

        info!(statement = %statement, bulk_size = self.bulk_size, concurrency, "Starting bulk load");
        let started = Utc::now();

        let client = self.client.clone();
        let sink = stats.clone();
        Dispatcher::new(concurrency)
            .with_progress(progress_for(self.show_progress, &statement))
            .with_total_hint(workload::bulk_total_hint(num_records, self.bulk_size))
            .run(batches, move |item| {
                let client = client.clone();
                let sink = sink.clone();
                async move { measure(&sink, client.execute(&item)).await }
            })
            .await?;

        Ok(BenchRun {
            statement,
            version_info,
            started,
            ended: Utc::now(),
            concurrency,
            repeats: None,
            bulk_size: Some(self.bulk_size),
            failed: stats.failures(),
            stats: stats.snapshot().await,
        })
    }
}

async fn version_info(client: &QueryClient) -> Option<VersionInfo> {
    match client.version_info(client.hosts().primary()).await {
        Ok(info) => Some(info),
        Err(e) => {
            debug!(error = %e, "Version lookup failed");
            None
        }
    }
}

fn progress_for(show: bool, label: &str) -> Arc<dyn ProgressObserver> {
    if show {
        let label: String = label.chars().take(40).collect();
        Arc::new(ProgressReporter::new(label))
    } else {
        Arc::new(ProgressReporter::hidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Percentiles;

    #[test]
    fn test_bench_run_serialization_skips_absent_fields() {
        let started = Utc::now();
        let run = BenchRun {
            statement: "select 1".to_string(),
            version_info: None,
            started,
            ended: started + chrono::Duration::milliseconds(1500),
            concurrency: 4,
            repeats: Some(10),
            bulk_size: None,
            failed: 0,
            stats: StatsSnapshot {
                count: 10,
                percentiles: Percentiles::default(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("version_info").is_none());
        assert!(json.get("bulk_size").is_none());
        assert_eq!(json["repeats"], 10);
        assert_eq!(json["stats"]["count"], 10);
        assert_eq!(run.elapsed_secs(), 1.5);
    }
}
