use serde::{Serialize, Serializer};
use std::{collections::HashMap, time::Duration};

/// LoadRunResult
///
/// Outcome of one load generator execution, decoded from its captured stdout.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadRunResult {
    pub issued_requests: u64,
    pub total_bytes: u64,
    pub requests_per_second: f64,
    pub average_latency_seconds: f64,

    /// sorted ascending by percentile
    ///
    pub latency_percentiles: Vec<LatencyPercentile>,

    /// status code ("200", "503", ...) -> number of responses
    ///
    pub status_code_counts: HashMap<String, u64>,

    pub fastest_seconds: f64,
    pub slowest_seconds: f64,
    pub duration_seconds: f64,

    /// transport level errors reported by the load generator, by message
    ///
    pub error_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPercentile {
    /// in [0, 1]
    pub percentile: f64,
    pub latency_seconds: f64,
}

impl LatencyPercentile {
    pub fn new(percentile: f64, latency_seconds: f64) -> Self {
        Self {
            percentile,
            latency_seconds,
        }
    }
}

/// ExpositionSample
///
/// One `name{labels} value [timestamp]` line of a text exposition payload.
/// `value` may be NaN or infinite.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ExpositionSample {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

impl ExpositionSample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// ClusterMetrics
///
/// The subset of an exporter scrape the report cares about.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMetrics {
    pub cpu_millicores: f64,
    pub memory_bytes: f64,
    pub pod_scaling_delta: i64,

    /// instance identifier -> container start time (unix seconds)
    ///
    pub instance_start_timestamps: HashMap<String, f64>,
}

/// ConsolidatedReport
///
/// Snapshot built by [`crate::consolidate::ConsolidationEngine`]. It owns all
/// of its data and exposes it read-only.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedReport {
    pub(crate) requests_per_second: f64,
    pub(crate) average_latency_seconds: f64,
    pub(crate) p99_latency_seconds: f64,
    pub(crate) p99_available: bool,
    pub(crate) total_requests: u64,
    pub(crate) total_bytes: u64,
    pub(crate) error_rate: f64,
    pub(crate) runs_merged: usize,

    pub(crate) cluster_cpu_millicores: f64,
    pub(crate) cluster_memory_bytes: f64,
    pub(crate) pod_scaling_delta: i64,

    #[serde(
        rename = "initialization_latency_seconds",
        serialize_with = "serialize_optional_secs"
    )]
    pub(crate) initialization_latency: Option<Duration>,
    pub(crate) cold_started_instances: usize,
}

impl ConsolidatedReport {
    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    pub fn average_latency_seconds(&self) -> f64 {
        self.average_latency_seconds
    }

    /// zero when the run reported no percentile at or above 0.99,
    /// see [`Self::p99_available`]
    pub fn p99_latency_seconds(&self) -> f64 {
        self.p99_latency_seconds
    }

    pub fn p99_available(&self) -> bool {
        self.p99_available
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// fraction of requests answered with 4xx/5xx, in [0, 1]
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    pub fn runs_merged(&self) -> usize {
        self.runs_merged
    }

    pub fn cluster_cpu_millicores(&self) -> f64 {
        self.cluster_cpu_millicores
    }

    pub fn cluster_memory_bytes(&self) -> f64 {
        self.cluster_memory_bytes
    }

    pub fn pod_scaling_delta(&self) -> i64 {
        self.pod_scaling_delta
    }

    pub fn initialization_latency(&self) -> Option<Duration> {
        self.initialization_latency
    }

    pub fn cold_started_instances(&self) -> usize {
        self.cold_started_instances
    }
}

fn serialize_optional_secs<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}
