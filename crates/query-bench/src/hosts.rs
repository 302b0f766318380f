//! Target host selection.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{BenchError, BenchResult};

/// A target host together with its query endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    query_url: String,
}

impl Endpoint {
    /// Parse a host specification such as `localhost:4200` or
    /// `https://db.example.com/`.
    pub fn parse(host: &str) -> BenchResult<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(BenchError::config("host must not be empty"));
        }
        let base_url = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        let query_url = format!("{}/_sql", base_url);
        Ok(Self {
            base_url,
            query_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Round-robin endpoint selector shared by concurrently running tasks.
///
/// The cursor is a single atomic counter, so every call to [`next`] claims
/// exactly one slot in the rotation even when callers race.
///
/// [`next`]: HostRotator::next
#[derive(Debug)]
pub struct HostRotator {
    endpoints: Arc<[Endpoint]>,
    cursor: AtomicUsize,
}

impl HostRotator {
    pub fn new(endpoints: Vec<Endpoint>) -> BenchResult<Self> {
        if endpoints.is_empty() {
            return Err(BenchError::config("at least one host must be specified"));
        }
        Ok(Self {
            endpoints: endpoints.into(),
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn from_hosts<S: AsRef<str>>(hosts: &[S]) -> BenchResult<Self> {
        let endpoints = hosts
            .iter()
            .map(|h| Endpoint::parse(h.as_ref()))
            .collect::<BenchResult<Vec<_>>>()?;
        Self::new(endpoints)
    }

    /// Next endpoint in rotation, wrapping around indefinitely.
    pub fn next(&self) -> &Endpoint {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.endpoints[slot % self.endpoints.len()]
    }

    /// The first configured endpoint, independent of rotation.
    pub fn primary(&self) -> &Endpoint {
        &self.endpoints[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_endpoint_adds_scheme_and_path() {
        let ep = Endpoint::parse("localhost:4200/").unwrap();
        assert_eq!(ep.base_url(), "http://localhost:4200");
        assert_eq!(ep.query_url(), "http://localhost:4200/_sql");

        let ep = Endpoint::parse("https://db.example.com").unwrap();
        assert_eq!(ep.query_url(), "https://db.example.com/_sql");
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(Endpoint::parse("  ").unwrap_err().is_config_error());
    }

    #[test]
    fn test_empty_endpoint_set_rejected() {
        let err = HostRotator::new(Vec::new()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_round_robin_wraps() {
        let rotator = HostRotator::from_hosts(&["a:1", "b:2", "c:3"]).unwrap();
        let picked: Vec<String> = (0..4).map(|_| rotator.next().to_string()).collect();
        assert_eq!(
            picked,
            vec!["http://a:1", "http://b:2", "http://c:3", "http://a:1"]
        );
    }

    #[test]
    fn test_concurrent_callers_share_rotation_evenly() {
        let rotator = Arc::new(HostRotator::from_hosts(&["a:1", "b:2", "c:3"]).unwrap());
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let rotator = rotator.clone();
                std::thread::spawn(move || {
                    (0..300)
                        .map(|_| rotator.next().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for host in handle.join().unwrap() {
                *counts.entry(host).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 600));
    }
}
