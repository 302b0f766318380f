//! HTTP client for the query service.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClientConfig, DurationSource};
use crate::error::{BenchError, BenchResult};
use crate::hosts::{Endpoint, HostRotator};
use crate::workload::WorkItem;

/// Upper bound for the version lookup made before each timed run.
const VERSION_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends work items to the target hosts in round-robin order.
///
/// Holds a single pooled `reqwest::Client` for the lifetime of a run; cloning
/// a `reqwest::Client` shares that pool, so the number of open connections is
/// bounded by the pool rather than by the number of requests.
pub struct QueryClient {
    http: reqwest::Client,
    hosts: HostRotator,
    duration_source: DurationSource,
    version_timeout: Duration,
}

/// Version and build identifiers reported by a target host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub number: String,
    pub hash: String,
}

/// Response body of the query endpoint. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl QueryClient {
    /// Create a client for `hosts`.
    pub fn new(hosts: HostRotator, config: &ClientConfig) -> BenchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| BenchError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            hosts,
            duration_source: config.duration_source,
            version_timeout: config.timeout.min(VERSION_LOOKUP_TIMEOUT),
        })
    }

    pub fn hosts(&self) -> &HostRotator {
        &self.hosts
    }

    /// Execute `item` against the next host in rotation.
    ///
    /// Returns the request duration in milliseconds.
    pub async fn execute(&self, item: &WorkItem) -> BenchResult<f64> {
        let endpoint = self.hosts.next();
        self.execute_at(endpoint, item).await
    }

    /// Execute `item` against a specific endpoint.
    pub async fn execute_at(&self, endpoint: &Endpoint, item: &WorkItem) -> BenchResult<f64> {
        let start = Instant::now();

        let response = self
            .http
            .post(endpoint.query_url())
            .json(item)
            .send()
            .await
            .map_err(|e| BenchError::transport(endpoint.base_url(), e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| BenchError::transport(endpoint.base_url(), e))?;
        let elapsed = start.elapsed();

        let parsed: QueryResponse = serde_json::from_slice(&body).map_err(|e| {
            BenchError::transport(
                endpoint.base_url(),
                format!("malformed response (HTTP {}): {}", status, e),
            )
        })?;

        if let Some(error) = parsed.error {
            debug!(endpoint = %endpoint, status = %status, "Statement failed");
            return Err(BenchError::Request {
                statement: item.stmt().to_string(),
                message: error.message,
            });
        }

        match self.duration_source {
            DurationSource::WallClock => Ok(duration_ms(elapsed)),
            DurationSource::Server => match parsed.duration {
                Some(d) if d.is_finite() && d >= 0.0 => Ok(d),
                Some(d) => Err(BenchError::transport(
                    endpoint.base_url(),
                    format!("invalid duration in response: {}", d),
                )),
                None => Err(BenchError::transport(
                    endpoint.base_url(),
                    format!("response without duration (HTTP {})", status),
                )),
            },
        }
    }

    /// Query version information from the root of `endpoint`.
    pub async fn version_info(&self, endpoint: &Endpoint) -> BenchResult<VersionInfo> {
        let response = self
            .http
            .get(endpoint.base_url())
            .timeout(self.version_timeout)
            .send()
            .await
            .map_err(|e| BenchError::transport(endpoint.base_url(), e))?;

        if !response.status().is_success() {
            return Err(BenchError::transport(
                endpoint.base_url(),
                format!("version lookup failed: HTTP {}", response.status()),
            ));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BenchError::transport(endpoint.base_url(), e))?;
        let version = &json["version"];

        match (version["number"].as_str(), version["build_hash"].as_str()) {
            (Some(number), Some(hash)) => Ok(VersionInfo {
                number: number.to_string(),
                hash: hash.to_string(),
            }),
            _ => Err(BenchError::transport(
                endpoint.base_url(),
                "version lookup returned no version.number/version.build_hash",
            )),
        }
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shapes() {
        let ok: QueryResponse =
            serde_json::from_str(r#"{"cols": [], "rows": [], "rowcount": 0, "duration": 1.5}"#)
                .unwrap();
        assert_eq!(ok.duration, Some(1.5));
        assert!(ok.error.is_none());

        let err: QueryResponse = serde_json::from_str(
            r#"{"error": {"message": "SQLParseException[line 1:1: mismatched input]", "code": 4000}}"#,
        )
        .unwrap();
        assert!(err.error.unwrap().message.starts_with("SQLParseException"));

        assert!(serde_json::from_str::<QueryResponse>("[1, 2]").is_err());
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Duration::from_micros(1500)), 1.5);
    }
}
