//! Timing wrapper feeding request durations into shared statistics.

use std::future::Future;

use crate::error::BenchResult;
use crate::stats::SharedStats;

/// Await `request` and record its duration into `stats` on success.
///
/// Failed requests contribute no latency sample; they only bump the failure
/// counter before the error is handed back to the caller.
pub async fn measure<F>(stats: &SharedStats, request: F) -> BenchResult<f64>
where
    F: Future<Output = BenchResult<f64>>,
{
    match request.await {
        Ok(duration) => {
            stats.observe(duration).await;
            Ok(duration)
        }
        Err(e) => {
            stats.record_failure();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;

    #[tokio::test]
    async fn test_success_is_recorded() {
        let stats = SharedStats::new();
        let d = measure(&stats, async { Ok(2.5) }).await.unwrap();
        assert_eq!(d, 2.5);
        let snap = stats.snapshot().await;
        assert_eq!(snap.count, 1);
        assert_eq!(snap.max, 2.5);
    }

    #[tokio::test]
    async fn test_failure_is_not_sampled() {
        let stats = SharedStats::new();
        let result = measure(&stats, async {
            Err(BenchError::Request {
                statement: "select x".to_string(),
                message: "ColumnUnknownException".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(BenchError::Request { .. })));
        assert_eq!(stats.count().await, 0);
        assert_eq!(stats.failures(), 1);
    }
}
