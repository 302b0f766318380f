//! Configuration loading and management.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Benchmark settings, loaded from YAML and/or assembled from CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub concurrency: ConcurrencySpec,
    #[serde(default = "default_repeats")]
    pub repeats: u64,
    #[serde(default = "default_warmup")]
    pub warmup: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub duration_source: DurationSource,
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_repeats() -> u64 {
    30
}

fn default_warmup() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_progress() -> bool {
    true
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            concurrency: ConcurrencySpec::default(),
            repeats: default_repeats(),
            warmup: default_warmup(),
            timeout_secs: default_timeout_secs(),
            duration_source: DurationSource::default(),
            progress: default_progress(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| BenchError::config(format!("{}: {}", path.display(), e)))
    }

    /// Validate configuration.
    pub fn validate(&self) -> BenchResult<()> {
        if self.hosts.is_empty() {
            return Err(BenchError::config("at least one host must be specified"));
        }
        if self.repeats == 0 {
            return Err(BenchError::config("repeats must be > 0"));
        }
        if self.timeout_secs == 0 {
            return Err(BenchError::config("timeout_secs must be > 0"));
        }
        self.concurrency.validate()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            duration_source: self.duration_source,
            max_idle_per_host: self.concurrency.max_level().max(1) as usize,
        }
    }
}

/// Where a request's duration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    /// The `duration` field reported by the query service.
    #[default]
    Server,
    /// Client-observed round trip time.
    WallClock,
}

/// HTTP client settings for one run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub duration_source: DurationSource,
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(default_timeout_secs()),
            duration_source: DurationSource::default(),
            max_idle_per_host: 1,
        }
    }
}

/// Concurrency levels to benchmark: a single level or a stepped range.
///
/// Written as `8` or `start..end:step` (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConcurrencyRepr", into = "String")]
pub enum ConcurrencySpec {
    Fixed(u32),
    Range { start: u32, end: u32, step: u32 },
}

impl Default for ConcurrencySpec {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl ConcurrencySpec {
    pub fn validate(&self) -> BenchResult<()> {
        match *self {
            Self::Fixed(0) => Err(BenchError::config("concurrency must be > 0")),
            Self::Fixed(_) => Ok(()),
            Self::Range { start, end, step } => {
                if start == 0 {
                    Err(BenchError::config("concurrency range must start at >= 1"))
                } else if step == 0 {
                    Err(BenchError::config("concurrency range step must be > 0"))
                } else if start >= end {
                    Err(BenchError::config(format!(
                        "concurrency range {}..{} is empty",
                        start, end
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Concurrency levels in execution order.
    pub fn levels(&self) -> Vec<u32> {
        match *self {
            Self::Fixed(c) => vec![c],
            Self::Range { start, end, step } if step > 0 => {
                (start..end).step_by(step as usize).collect()
            }
            Self::Range { .. } => Vec::new(),
        }
    }

    pub fn max_level(&self) -> u32 {
        self.levels().into_iter().max().unwrap_or(0)
    }
}

impl FromStr for ConcurrencySpec {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| BenchError::config(format!("invalid concurrency: {}", s)))
        };

        let spec = match s.split_once("..") {
            None => Self::Fixed(parse(s)?),
            Some((start, rest)) => {
                let (end, step) = match rest.split_once(':') {
                    Some((end, step)) => (parse(end)?, parse(step)?),
                    None => (parse(rest)?, 1),
                };
                Self::Range {
                    start: parse(start)?,
                    end,
                    step,
                }
            }
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Accepts both `concurrency: 8` and `concurrency: "1..10:2"` in YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConcurrencyRepr {
    Level(u32),
    Text(String),
}

impl TryFrom<ConcurrencyRepr> for ConcurrencySpec {
    type Error = BenchError;

    fn try_from(value: ConcurrencyRepr) -> Result<Self, Self::Error> {
        match value {
            ConcurrencyRepr::Level(c) => {
                let spec = Self::Fixed(c);
                spec.validate()?;
                Ok(spec)
            }
            ConcurrencyRepr::Text(s) => s.parse(),
        }
    }
}

impl From<ConcurrencySpec> for String {
    fn from(spec: ConcurrencySpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ConcurrencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(c) => write!(f, "{}", c),
            Self::Range { start, end, step } => write!(f, "{}..{}:{}", start, end, step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_fixed() {
        let spec: ConcurrencySpec = "8".parse().unwrap();
        assert_eq!(spec, ConcurrencySpec::Fixed(8));
        assert_eq!(spec.levels(), vec![8]);
    }

    #[test]
    fn test_parse_range() {
        let spec: ConcurrencySpec = "1..10:4".parse().unwrap();
        assert_eq!(spec.levels(), vec![1, 5, 9]);
        assert_eq!(spec.max_level(), 9);

        let spec: ConcurrencySpec = "2..5".parse().unwrap();
        assert_eq!(spec.levels(), vec![2, 3, 4]);
    }

    #[test]
    fn test_invalid_concurrency() {
        for bad in ["0", "abc", "0..4", "4..4", "5..1", "1..4:0", "-1"] {
            let err = bad.parse::<ConcurrencySpec>().unwrap_err();
            assert!(err.is_config_error(), "{} should be a config error", bad);
        }
    }

    #[test]
    fn test_validate_requires_hosts() {
        let config = BenchConfig::default();
        assert!(config.validate().unwrap_err().is_config_error());

        let config = BenchConfig {
            hosts: vec!["localhost:4200".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_repeats() {
        let config = BenchConfig {
            hosts: vec!["localhost:4200".to_string()],
            repeats: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hosts: [\"node1:4200\", \"node2:4200\"]\nconcurrency: \"1..20:5\"\nrepeats: 100\nduration_source: wall_clock"
        )
        .unwrap();

        let config = BenchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.repeats, 100);
        assert_eq!(config.warmup, 30);
        assert_eq!(config.concurrency.levels(), vec![1, 6, 11, 16]);
        assert_eq!(config.duration_source, DurationSource::WallClock);
        assert!(config.validate().is_ok());
        assert_eq!(config.client_config().max_idle_per_host, 16);
    }

    #[test]
    fn test_from_file_rejects_bad_concurrency() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hosts: [\"node1:4200\"]\nconcurrency: 0").unwrap();
        let err = BenchConfig::from_file(file.path()).unwrap_err();
        assert!(err.is_config_error());
    }
}
