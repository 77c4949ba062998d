use crate::stats::mean;
use crate::{AggregateStats, ErrorRecord, Scenario};
use serde::Serialize;
use std::time::Duration;

/// Statistical summary of a finished run.
///
/// Built once from the frozen aggregate. With no recorded requests every latency figure and
/// rate is `0.`, never NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total_requests: u64,
    pub expected_requests: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percentage of successful requests.
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub p50_response_time: f64,
    pub p90_response_time: f64,
    pub p99_response_time: f64,
    pub actual_duration_seconds: f64,
    #[serde(rename = "actualRPS")]
    pub actual_rps: f64,
    pub errors: Vec<ErrorRecord>,
    pub per_entity_breakdown: Vec<EntityBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBreakdown {
    pub entity_id: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub avg_response_time: f64,
}

impl Report {
    /// `elapsed` is the measured span between the run's recorded start and end.
    pub fn build(stats: &AggregateStats, scenario: &Scenario, elapsed: Duration) -> Self {
        let times = stats.response_times();
        let mut sorted = times.to_vec();
        sorted.sort_by(f64::total_cmp);

        let (min, max) = match (sorted.first(), sorted.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => (0., 0.),
        };

        let actual_duration_seconds = elapsed.as_secs_f64();
        let actual_rps = if actual_duration_seconds > 0. {
            stats.total_requests() as f64 / actual_duration_seconds
        } else {
            0.
        };

        let success_rate = if stats.is_empty() {
            0.
        } else {
            stats.successful() as f64 / stats.total_requests() as f64 * 100.
        };

        let per_entity_breakdown = stats
            .per_entity()
            .iter()
            .map(|(entity_id, bucket)| EntityBreakdown {
                entity_id: entity_id.clone(),
                total: bucket.total,
                success: bucket.success,
                failed: bucket.failed,
                avg_response_time: bucket.avg_response_time(),
            })
            .collect();

        Self {
            total_requests: stats.total_requests(),
            expected_requests: scenario.expected_requests(),
            successful: stats.successful(),
            failed: stats.failed(),
            success_rate,
            avg_response_time: mean(times),
            min_response_time: min,
            max_response_time: max,
            p50_response_time: percentile(&sorted, 0.50),
            p90_response_time: percentile(&sorted, 0.90),
            p99_response_time: percentile(&sorted, 0.99),
            actual_duration_seconds,
            actual_rps,
            errors: stats.errors().to_vec(),
            per_entity_breakdown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_requests == 0
    }

    /// Error messages with their occurrence counts, most frequent first.
    pub fn error_counts(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for error in &self.errors {
            match counts.iter_mut().find(|(message, _)| *message == error.message) {
                Some((_, count)) => *count += 1,
                None => counts.push((error.message.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
