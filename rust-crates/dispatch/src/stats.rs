//! Read-only rollups over the pool and the admission queue.

use crate::{
    pool::SignerPool,
    queue::QueueSnapshot,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerStats {
    pub id: usize,
    pub name: String,
    pub address: String,
    /// False while quarantined.
    pub available: bool,
    pub busy: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub size: usize,
    pub max_size: usize,
    pub total_queued: u64,
    pub total_dequeued: u64,
    pub total_processed: u64,
    pub avg_wait_ms: u64,
    pub max_wait_ms: u64,
    pub utilization_pct: f64,
    pub is_draining: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStats {
    pub total_signers: usize,
    /// Healthy and idle right now.
    pub available_signers: usize,
    pub busy_signers: usize,
    pub quarantined_signers: usize,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate_pct: f64,
    pub per_signer: Vec<SignerStats>,
    pub queue: QueueStats,
}

pub struct StatsAggregator;

impl StatsAggregator {
    pub fn queue(snapshot: &QueueSnapshot, is_draining: bool) -> QueueStats {
        let utilization_pct = if snapshot.max_size == 0 {
            0.0
        } else {
            round_tenth(snapshot.len as f64 / snapshot.max_size as f64 * 100.0)
        };
        QueueStats {
            size: snapshot.len,
            max_size: snapshot.max_size,
            total_queued: snapshot.total_queued,
            total_dequeued: snapshot.total_dequeued,
            total_processed: snapshot.total_processed,
            avg_wait_ms: snapshot.avg_wait.as_millis() as u64,
            max_wait_ms: snapshot.max_wait.as_millis() as u64,
            utilization_pct,
            is_draining,
        }
    }

    pub fn detailed<C>(pool: &SignerPool<C>, queue: QueueStats) -> DetailedStats {
        let per_signer = pool.signer_stats();
        let available_signers = per_signer.iter().filter(|s| s.available && !s.busy).count();
        let busy_signers = per_signer.iter().filter(|s| s.busy).count();
        let quarantined_signers = per_signer.iter().filter(|s| !s.available).count();
        let successful_operations: u64 = per_signer.iter().map(|s| s.success_count).sum();
        let failed_operations: u64 = per_signer.iter().map(|s| s.error_count).sum();
        let total_operations = successful_operations + failed_operations;
        let success_rate_pct = if total_operations == 0 {
            0.0
        } else {
            round_hundredth(successful_operations as f64 / total_operations as f64 * 100.0)
        };
        DetailedStats {
            total_signers: per_signer.len(),
            available_signers,
            busy_signers,
            quarantined_signers,
            total_operations,
            successful_operations,
            failed_operations,
            success_rate_pct,
            per_signer,
            queue,
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_hundredth(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::time::Duration;

    fn arb_snapshot(len: usize, max_size: usize) -> QueueSnapshot {
        QueueSnapshot {
            len,
            max_size,
            total_queued: 10,
            total_dequeued: 8,
            total_processed: 12,
            avg_wait: Duration::from_millis(1_500),
            max_wait: Duration::from_millis(4_250),
        }
    }

    #[test]
    fn queue__partially_full__reports_utilization() {
        // given
        let snapshot = arb_snapshot(1, 3);

        // when
        let stats = StatsAggregator::queue(&snapshot, true);

        // then
        assert_eq!(stats.utilization_pct, 33.3);
        assert_eq!(stats.avg_wait_ms, 1_500);
        assert_eq!(stats.max_wait_ms, 4_250);
        assert!(stats.is_draining);
    }

    #[test]
    fn queue__zero_capacity__reports_zero_utilization() {
        let stats = StatsAggregator::queue(&arb_snapshot(0, 0), false);
        assert_eq!(stats.utilization_pct, 0.0);
    }

    #[test]
    fn queue_stats__serializes_camel_case() {
        // given
        let stats = StatsAggregator::queue(&arb_snapshot(2, 4), false);

        // when
        let json = serde_json::to_value(&stats).unwrap();

        // then
        assert_eq!(json["maxSize"], 4);
        assert_eq!(json["totalProcessed"], 12);
        assert_eq!(json["utilizationPct"], 50.0);
        assert_eq!(json["isDraining"], false);
    }
}
