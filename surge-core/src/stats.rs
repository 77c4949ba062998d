use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Outcome of one completed dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    pub entity_id: String,
    pub success: bool,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl RequestResult {
    pub fn success(
        entity_id: impl Into<String>,
        response_time_ms: f64,
        status_code: u16,
        event_type: Option<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            success: true,
            response_time_ms,
            status_code: Some(status_code),
            error_message: None,
            event_type,
        }
    }

    pub fn failure(
        entity_id: impl Into<String>,
        response_time_ms: f64,
        error_message: impl Into<String>,
        status_code: Option<u16>,
        event_type: Option<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            success: false,
            response_time_ms,
            status_code,
            error_message: Some(error_message.into()),
            event_type,
        }
    }
}

/// A failed request as kept in the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub entity_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub response_times: Vec<f64>,
}

impl EntityStats {
    pub fn avg_response_time(&self) -> f64 {
        mean(&self.response_times)
    }
}

/// Cheap, copyable view of the global counters for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

impl Progress {
    /// Observed throughput over `elapsed_secs`, 0 before any time has passed.
    pub fn rate(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0. {
            self.total as f64 / elapsed_secs
        } else {
            0.
        }
    }
}

/// Run-wide counters and latency samples.
///
/// [`AggregateStats::record`] is the only mutation, so the counters, the latency list and the
/// per-merchant buckets always agree with each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    total_requests: u64,
    successful: u64,
    failed: u64,
    response_times: Vec<f64>,
    errors: Vec<ErrorRecord>,
    per_entity: BTreeMap<String, EntityStats>,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: RequestResult) {
        self.record_at(result, OffsetDateTime::now_utc());
    }

    pub fn record_at(&mut self, result: RequestResult, at: OffsetDateTime) {
        self.total_requests += 1;
        self.response_times.push(result.response_time_ms);

        let bucket = self.per_entity.entry(result.entity_id.clone()).or_default();
        bucket.total += 1;
        bucket.response_times.push(result.response_time_ms);

        if result.success {
            self.successful += 1;
            bucket.success += 1;
        } else {
            self.failed += 1;
            bucket.failed += 1;
            let message = result
                .error_message
                .or_else(|| result.status_code.map(|code| format!("HTTP {code}")))
                .unwrap_or_else(|| "Unknown error".to_string());
            self.errors.push(ErrorRecord {
                entity_id: result.entity_id,
                message,
                status_code: result.status_code,
                timestamp: at,
            });
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn response_times(&self) -> &[f64] {
        &self.response_times
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn per_entity(&self) -> &BTreeMap<String, EntityStats> {
        &self.per_entity
    }

    pub fn is_empty(&self) -> bool {
        self.total_requests == 0
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total_requests,
            successful: self.successful,
            failed: self.failed,
        }
    }

    /// Checks every cross-field invariant of the aggregate.
    pub fn is_consistent(&self) -> bool {
        let (total, success, failed) =
            self.per_entity
                .values()
                .fold((0, 0, 0), |(t, s, f), bucket| {
                    (t + bucket.total, s + bucket.success, f + bucket.failed)
                });

        self.total_requests == self.successful + self.failed
            && self.response_times.len() as u64 == self.total_requests
            && self.errors.len() as u64 == self.failed
            && total == self.total_requests
            && success == self.successful
            && failed == self.failed
            && self.per_entity.values().all(|bucket| {
                bucket.total == bucket.success + bucket.failed
                    && bucket.response_times.len() as u64 == bucket.total
            })
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.
    } else {
        statistical::mean(values)
    }
}
