use serde::Deserialize;

use crate::types::{ClusterMetrics, ExpositionSample};

/// MetricNames
///
/// Metric family prefixes the extractor recognizes, and the label that
/// identifies an instance on start-time series. The defaults match the
/// Kubernetes exporter shipped with the benchmark.
///
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricNames {
    pub cpu_millicores: String,
    pub memory_bytes: String,
    pub pod_scaling_delta: String,
    pub container_started_at: String,
    pub instance_label: String,
}

impl Default for MetricNames {
    fn default() -> Self {
        Self {
            cpu_millicores: "kubernetes_cluster_cpu_usage_millicores".into(),
            memory_bytes: "kubernetes_cluster_memory_usage_bytes".into(),
            pod_scaling_delta: "serverless_pod_scaled_difference".into(),
            container_started_at: "serverless_pod_container_started_at_seconds".into(),
            instance_label: "pod".into(),
        }
    }
}

/// MetricsExtractor
///
/// Projects parsed samples onto [`ClusterMetrics`]. Later samples overwrite
/// earlier ones, both for the scalar series and per instance. Unknown series,
/// non-finite values and start-time samples without the instance label are
/// ignored.
///
#[derive(Debug, Clone, Default)]
pub struct MetricsExtractor {
    names: MetricNames,
}

impl MetricsExtractor {
    pub fn new(names: MetricNames) -> Self {
        Self { names }
    }

    /// extract
    ///
    pub fn extract(&self, samples: &[ExpositionSample]) -> ClusterMetrics {
        let mut metrics = ClusterMetrics::default();

        for sample in samples {
            if !sample.value.is_finite() {
                tracing::trace!("ignoring non-finite sample {}", sample.name);
                continue;
            }

            let name = sample.name.as_str();

            if name.starts_with(&self.names.cpu_millicores) {
                metrics.cpu_millicores = sample.value;
            } else if name.starts_with(&self.names.memory_bytes) {
                metrics.memory_bytes = sample.value;
            } else if name.starts_with(&self.names.pod_scaling_delta) {
                // `as` truncates toward zero and saturates
                metrics.pod_scaling_delta = sample.value as i64;
            } else if name.starts_with(&self.names.container_started_at) {
                match sample.label(&self.names.instance_label) {
                    Some(instance) => {
                        if let Some(previous) = metrics
                            .instance_start_timestamps
                            .insert(instance.to_string(), sample.value)
                        {
                            tracing::debug!(
                                "duplicate start time for {instance}: {previous} replaced by {}",
                                sample.value
                            );
                        }
                    }
                    None => tracing::trace!(
                        "start time sample without `{}` label",
                        self.names.instance_label
                    ),
                }
            }
        }

        metrics
    }
}
