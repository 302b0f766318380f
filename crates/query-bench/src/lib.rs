//! Latency benchmarking for HTTP query services.
//!
//! This crate provides tools to:
//! - Spread statements across a set of hosts in round-robin order
//! - Execute them with a fixed number of requests in flight
//! - Aggregate latencies into fixed-memory running statistics
//! - Bulk-load JSON records through batched insert requests

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hosts;
pub mod measure;
pub mod progress;
pub mod runner;
pub mod stats;
pub mod workload;

pub use client::{QueryClient, VersionInfo};
pub use config::{BenchConfig, ClientConfig, ConcurrencySpec, DurationSource};
pub use dispatcher::Dispatcher;
pub use error::{BenchError, BenchResult};
pub use hosts::{Endpoint, HostRotator};
pub use measure::measure;
pub use progress::{NoProgress, ProgressObserver, ProgressReporter};
pub use runner::{BenchRun, BulkLoader, QueryRunner};
pub use stats::{Percentiles, RunningStats, SharedStats, StatsSnapshot};
pub use workload::WorkItem;
