use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    types::{LatencyPercentile, LoadRunResult},
};

/// LoadResultParser
///
/// Turns the captured stdout of one `hey` run into a [`LoadRunResult`].
/// Operates on text only; running the process is `load_runner`'s job.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadResultParser;

impl LoadResultParser {
    /// parse
    ///
    /// Fails with [`Error::MalformedOutput`] when there is no `{` in `raw_stdout`
    /// or when the JSON value starting there does not decode. The error keeps
    /// the whole raw text.
    pub fn parse(&self, raw_stdout: &str) -> Result<LoadRunResult> {
        let candidate = locate_payload(raw_stdout)
            .ok_or_else(|| Error::malformed(raw_stdout, "no JSON object start ('{') found"))?;

        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<RawOutput>();

        let output = match stream.next() {
            Some(Ok(output)) => output,
            Some(Err(err)) => return Err(Error::malformed(raw_stdout, err.to_string())),
            None => return Err(Error::malformed(raw_stdout, "empty JSON payload")),
        };

        tracing::trace!(
            "decoded load generator payload at byte offset {}",
            raw_stdout.len() - candidate.len()
        );

        Ok(output.into_result())
    }
}

/// Everything from the first `{` onwards, i.e. with any banner text removed.
fn locate_payload(raw: &str) -> Option<&str> {
    raw.char_indices()
        .find(|&(_, c)| c == '{')
        .map(|(start, _)| &raw[start..])
}

/// Wire schema of `hey`'s JSON output. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    #[serde(deserialize_with = "lenient_count")]
    requests: u64,
    #[serde(deserialize_with = "lenient_count")]
    bytes_total: u64,
    #[serde(deserialize_with = "lenient_float")]
    requests_per_second: f64,
    #[serde(deserialize_with = "lenient_float")]
    average: f64,
    #[serde(deserialize_with = "lenient_float")]
    total: f64,
    summary: RawSummary,
    latency_distribution: Option<Vec<RawPercentile>>,
    latency: RawLatency,
    status_code_dist: Option<HashMap<String, f64>>,
    status_code_count: Option<HashMap<String, f64>>,
    error_dist: Option<HashMap<String, f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSummary {
    #[serde(deserialize_with = "lenient_float")]
    total: f64,
    #[serde(deserialize_with = "lenient_float")]
    slowest: f64,
    #[serde(deserialize_with = "lenient_float")]
    fastest: f64,
    #[serde(deserialize_with = "lenient_float")]
    average: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLatency {
    distribution: Option<Vec<RawPercentile>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPercentile {
    #[serde(deserialize_with = "lenient_float")]
    percentage: f64,
    #[serde(deserialize_with = "lenient_float")]
    latency: f64,
}

impl RawOutput {
    fn into_result(self) -> LoadRunResult {
        // newer hey builds nest the distribution under `latency`
        let distribution = match self.latency_distribution {
            Some(distribution) if !distribution.is_empty() => distribution,
            _ => self.latency.distribution.unwrap_or_default(),
        };

        let mut latency_percentiles: Vec<LatencyPercentile> = distribution
            .into_iter()
            .map(|p| LatencyPercentile::new(p.percentage, p.latency))
            .collect();
        latency_percentiles.sort_by(|a, b| a.percentile.total_cmp(&b.percentile));

        let status_code_counts = self
            .status_code_dist
            .filter(|dist| !dist.is_empty())
            .or(self.status_code_count)
            .map(counts)
            .unwrap_or_default();

        let average_latency_seconds = if self.summary.average > 0.0 {
            self.summary.average
        } else {
            self.average
        };

        let duration_seconds = if self.summary.total > 0.0 {
            self.summary.total
        } else {
            self.total
        };

        LoadRunResult {
            issued_requests: self.requests,
            total_bytes: self.bytes_total,
            requests_per_second: self.requests_per_second,
            average_latency_seconds,
            latency_percentiles,
            status_code_counts,
            fastest_seconds: self.summary.fastest,
            slowest_seconds: self.summary.slowest,
            duration_seconds,
            error_counts: self.error_dist.map(counts).unwrap_or_default(),
        }
    }
}

fn counts(raw: HashMap<String, f64>) -> HashMap<String, u64> {
    raw.into_iter()
        .map(|(key, value)| (key, non_negative(value) as u64))
        .collect()
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Accepts any JSON number or `null`; negative and missing become zero.
fn lenient_float<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?
        .map(non_negative)
        .unwrap_or(0.0))
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_float(deserializer).map(|value| value as u64)
}
