use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    cold_start::ColdStartCorrelator,
    types::{ClusterMetrics, ConsolidatedReport, LoadRunResult},
};

/// Percentile at or above which a latency entry counts as the tail latency.
pub const P99: f64 = 0.99;

/// MergePolicy
///
/// How several successful runs become the load generator half of a report.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// only the first run is reported
    #[default]
    First,

    /// rates and latencies averaged, counters summed
    Mean,
}

/// ConsolidationEngine
///
///
///
///
#[derive(Debug, Clone, Default)]
pub struct ConsolidationEngine {
    policy: MergePolicy,
    correlator: ColdStartCorrelator,
}

impl ConsolidationEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            correlator: ColdStartCorrelator,
        }
    }

    /// consolidate
    ///
    /// `runs` holds the successfully parsed runs in execution order.
    pub fn consolidate(
        &self,
        runs: &[LoadRunResult],
        cluster: &ClusterMetrics,
        epoch: DateTime<Utc>,
    ) -> ConsolidatedReport {
        let load = match self.policy {
            MergePolicy::First => runs.first().map(LoadFigures::of_run).unwrap_or_default(),
            MergePolicy::Mean => LoadFigures::mean(runs),
        };

        let cold_start = self
            .correlator
            .correlate_detailed(&cluster.instance_start_timestamps, epoch);

        tracing::debug!(
            "consolidated {} of {} runs with policy {:?}, {} cold starts",
            load.runs_merged,
            runs.len(),
            self.policy,
            cold_start.map_or(0, |c| c.instances)
        );

        ConsolidatedReport {
            requests_per_second: load.requests_per_second,
            average_latency_seconds: load.average_latency_seconds,
            p99_latency_seconds: load.p99_latency_seconds,
            p99_available: load.p99_available,
            total_requests: load.total_requests,
            total_bytes: load.total_bytes,
            error_rate: load.error_rate,
            runs_merged: load.runs_merged,

            cluster_cpu_millicores: cluster.cpu_millicores,
            cluster_memory_bytes: cluster.memory_bytes,
            pod_scaling_delta: cluster.pod_scaling_delta,

            initialization_latency: cold_start.map(|c| c.mean),
            cold_started_instances: cold_start.map_or(0, |c| c.instances),
        }
    }
}

/// Number of responses with a 4xx or 5xx status code.
pub fn error_count(run: &LoadRunResult) -> u64 {
    run.status_code_counts
        .iter()
        .filter(|(code, _)| is_error_status(code))
        .fold(0u64, |total, (_, &count)| total.saturating_add(count))
}

/// Error responses over issued requests, zero when nothing was issued and
/// never above one.
pub fn error_rate(run: &LoadRunResult) -> f64 {
    ratio(error_count(run), run.issued_requests)
}

/// Latency of the first percentile entry at or above 0.99.
pub fn p99_latency(run: &LoadRunResult) -> Option<f64> {
    run.latency_percentiles
        .iter()
        .find(|p| p.percentile >= P99)
        .map(|p| p.latency_seconds)
}

fn is_error_status(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 3
        && bytes.iter().all(u8::is_ascii_digit)
        && matches!(bytes[0], b'4' | b'5')
}

fn ratio(errors: u64, requests: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        (errors as f64 / requests as f64).min(1.0)
    }
}

fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

#[derive(Debug, Default)]
struct LoadFigures {
    requests_per_second: f64,
    average_latency_seconds: f64,
    p99_latency_seconds: f64,
    p99_available: bool,
    total_requests: u64,
    total_bytes: u64,
    error_rate: f64,
    runs_merged: usize,
}

impl LoadFigures {
    fn of_run(run: &LoadRunResult) -> Self {
        let p99 = p99_latency(run);

        Self {
            requests_per_second: run.requests_per_second,
            average_latency_seconds: run.average_latency_seconds,
            p99_latency_seconds: p99.unwrap_or(0.0),
            p99_available: p99.is_some(),
            total_requests: run.issued_requests,
            total_bytes: run.total_bytes,
            error_rate: error_rate(run),
            runs_merged: 1,
        }
    }

    fn mean(runs: &[LoadRunResult]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }

        let n = runs.len() as f64;
        let p99s: Vec<f64> = runs.iter().filter_map(p99_latency).collect();
        let total_requests = saturating_sum(runs.iter().map(|run| run.issued_requests));
        let total_errors = saturating_sum(runs.iter().map(error_count));

        Self {
            requests_per_second: runs.iter().map(|run| run.requests_per_second).sum::<f64>() / n,
            average_latency_seconds: runs
                .iter()
                .map(|run| run.average_latency_seconds)
                .sum::<f64>()
                / n,
            p99_latency_seconds: if p99s.is_empty() {
                0.0
            } else {
                p99s.iter().sum::<f64>() / p99s.len() as f64
            },
            p99_available: !p99s.is_empty(),
            total_requests,
            total_bytes: saturating_sum(runs.iter().map(|run| run.total_bytes)),
            error_rate: ratio(total_errors, total_requests),
            runs_merged: runs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exposition::ExpositionParser, extractor::MetricsExtractor, load_result::LoadResultParser,
        types::LatencyPercentile,
    };
    use std::{collections::HashMap, time::Duration};

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1000, 0).unwrap()
    }

    fn run(requests: u64, codes: &[(&str, u64)]) -> LoadRunResult {
        LoadRunResult {
            issued_requests: requests,
            status_code_counts: codes
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
            ..LoadRunResult::default()
        }
    }

    #[test]
    fn test_error_rate_all_success() {
        assert_eq!(error_rate(&run(10, &[("200", 10)])), 0.0);
    }

    #[test]
    fn test_error_rate_with_server_errors() {
        assert_eq!(error_rate(&run(10, &[("200", 8), ("500", 2)])), 0.2);
    }

    #[test]
    fn test_error_rate_counts_4xx_and_5xx_only() {
        let run = run(20, &[("200", 10), ("404", 4), ("503", 4), ("302", 1), ("5xx", 1)]);

        assert_eq!(error_count(&run), 8);
        assert_eq!(error_rate(&run), 0.4);
    }

    #[test]
    fn test_error_rate_without_requests_is_zero() {
        assert_eq!(error_rate(&run(0, &[("500", 3)])), 0.0);
    }

    #[test]
    fn test_error_rate_is_capped_at_one() {
        assert_eq!(error_rate(&run(10, &[("500", 20)])), 1.0);
    }

    #[test]
    fn test_huge_status_counts_saturate() {
        let run = LoadResultParser
            .parse(r#"{"requests": 10, "status_code_dist": {"500": 1e30, "503": 1e30}}"#)
            .unwrap();

        assert_eq!(error_count(&run), u64::MAX);
        assert_eq!(error_rate(&run), 1.0);
    }

    #[test]
    fn test_mean_policy_saturates_totals() {
        let runs = [run(u64::MAX, &[("500", u64::MAX)]), run(u64::MAX, &[("503", 1)])];

        let report = ConsolidationEngine::new(MergePolicy::Mean).consolidate(
            &runs,
            &ClusterMetrics::default(),
            epoch(),
        );

        assert_eq!(report.total_requests(), u64::MAX);
        assert_eq!(report.error_rate(), 1.0);
    }

    #[test]
    fn test_far_future_start_times_from_exposition() {
        let body = "serverless_pod_container_started_at_seconds{pod=\"a\"} 1e19\n\
                    serverless_pod_container_started_at_seconds{pod=\"b\"} 1e19\n";
        let cluster = MetricsExtractor::default().extract(&ExpositionParser.parse(body));

        let report = ConsolidationEngine::default().consolidate(&[], &cluster, epoch());

        assert_eq!(report.cold_started_instances(), 2);
        assert!(report.initialization_latency().is_some());
    }

    #[test]
    fn test_p99_selection() {
        let run = LoadRunResult {
            latency_percentiles: vec![
                LatencyPercentile::new(0.5, 0.01),
                LatencyPercentile::new(0.9, 0.02),
                LatencyPercentile::new(0.99, 0.05),
            ],
            ..LoadRunResult::default()
        };

        assert_eq!(p99_latency(&run), Some(0.05));
        assert_eq!(p99_latency(&LoadRunResult::default()), None);
    }

    #[test]
    fn test_consolidate_first_run_wins() {
        let mut first = run(10, &[("200", 8), ("500", 2)]);
        first.requests_per_second = 100.0;
        first.average_latency_seconds = 0.1;
        first.total_bytes = 512;
        first.latency_percentiles = vec![LatencyPercentile::new(0.99, 0.3)];

        let mut second = run(50, &[("200", 50)]);
        second.requests_per_second = 999.0;

        let cluster = ClusterMetrics {
            cpu_millicores: 1234.5,
            memory_bytes: 2048.0,
            pod_scaling_delta: -1,
            instance_start_timestamps: HashMap::from([
                ("pod-a".to_string(), 1002.5),
                ("pod-b".to_string(), 998.0),
            ]),
        };

        let report = ConsolidationEngine::default().consolidate(&[first, second], &cluster, epoch());

        assert_eq!(report.requests_per_second(), 100.0);
        assert_eq!(report.average_latency_seconds(), 0.1);
        assert_eq!(report.p99_latency_seconds(), 0.3);
        assert!(report.p99_available());
        assert_eq!(report.total_requests(), 10);
        assert_eq!(report.total_bytes(), 512);
        assert_eq!(report.error_rate(), 0.2);
        assert_eq!(report.runs_merged(), 1);
        assert_eq!(report.cluster_cpu_millicores(), 1234.5);
        assert_eq!(report.cluster_memory_bytes(), 2048.0);
        assert_eq!(report.pod_scaling_delta(), -1);
        assert_eq!(report.initialization_latency(), Some(Duration::from_millis(2500)));
        assert_eq!(report.cold_started_instances(), 1);
    }

    #[test]
    fn test_consolidate_without_runs() {
        let report =
            ConsolidationEngine::default().consolidate(&[], &ClusterMetrics::default(), epoch());

        assert_eq!(report.total_requests(), 0);
        assert_eq!(report.error_rate(), 0.0);
        assert_eq!(report.p99_latency_seconds(), 0.0);
        assert!(!report.p99_available());
        assert_eq!(report.runs_merged(), 0);
        assert_eq!(report.initialization_latency(), None);
    }

    #[test]
    fn test_consolidate_does_not_touch_inputs() {
        let runs = vec![run(10, &[("200", 10)])];
        let snapshot = runs.clone();

        let report =
            ConsolidationEngine::default().consolidate(&runs, &ClusterMetrics::default(), epoch());

        assert_eq!(runs, snapshot);
        assert_eq!(report.total_requests(), 10);
    }

    #[test]
    fn test_mean_policy() {
        let mut a = run(10, &[("200", 10)]);
        a.requests_per_second = 100.0;
        a.total_bytes = 100;
        a.latency_percentiles = vec![LatencyPercentile::new(0.99, 0.5)];

        let mut b = run(30, &[("200", 26), ("502", 4)]);
        b.requests_per_second = 300.0;
        b.total_bytes = 300;

        let report = ConsolidationEngine::new(MergePolicy::Mean).consolidate(
            &[a, b],
            &ClusterMetrics::default(),
            epoch(),
        );

        assert_eq!(report.requests_per_second(), 200.0);
        assert_eq!(report.total_requests(), 40);
        assert_eq!(report.total_bytes(), 400);
        assert_eq!(report.error_rate(), 0.1);
        assert_eq!(report.p99_latency_seconds(), 0.5);
        assert_eq!(report.runs_merged(), 2);
    }

    #[test]
    fn test_mean_policy_single_run_equals_first() {
        let mut only = run(10, &[("200", 9), ("429", 1)]);
        only.requests_per_second = 42.0;
        only.latency_percentiles = vec![LatencyPercentile::new(0.995, 0.07)];
        let runs = [only];
        let cluster = ClusterMetrics::default();

        let first = ConsolidationEngine::new(MergePolicy::First).consolidate(&runs, &cluster, epoch());
        let mean = ConsolidationEngine::new(MergePolicy::Mean).consolidate(&runs, &cluster, epoch());

        assert_eq!(first, mean);
    }
}
