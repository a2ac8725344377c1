use chrono::{DateTime, Utc};
use std::{collections::HashMap, time::Duration};

/// ColdStart
///
/// Result of a correlation: mean delay between the benchmark epoch and the
/// start of every instance that came up after it.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColdStart {
    pub mean: Duration,
    pub instances: usize,
}

/// ColdStartCorrelator
///
/// Instances that started at or before the epoch already existed when the
/// benchmark began and are not cold starts caused by it.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct ColdStartCorrelator;

impl ColdStartCorrelator {
    /// correlate
    ///
    /// `None` when no instance started strictly after `epoch`.
    pub fn correlate(
        &self,
        start_timestamps: &HashMap<String, f64>,
        epoch: DateTime<Utc>,
    ) -> Option<Duration> {
        self.correlate_detailed(start_timestamps, epoch)
            .map(|cold_start| cold_start.mean)
    }

    /// correlate_detailed
    ///
    /// Same as [`Self::correlate`], also reporting how many instances qualified.
    pub fn correlate_detailed(
        &self,
        start_timestamps: &HashMap<String, f64>,
        epoch: DateTime<Utc>,
    ) -> Option<ColdStart> {
        let epoch_secs = epoch_seconds(epoch);

        let delays: Vec<f64> = start_timestamps
            .iter()
            .filter(|&(_, &started_at)| started_at.is_finite() && started_at > epoch_secs)
            .map(|(instance, &started_at)| {
                let delay = started_at - epoch_secs;
                tracing::trace!("{instance} started {delay}s after the benchmark epoch");
                delay
            })
            .collect();

        if delays.is_empty() {
            return None;
        }

        // averaged in seconds, summing Durations can overflow
        let mean = delays.iter().sum::<f64>() / delays.len() as f64;

        Some(ColdStart {
            mean: Duration::try_from_secs_f64(mean).ok()?,
            instances: delays.len(),
        })
    }
}

/// Unix seconds with sub-second precision.
pub fn epoch_seconds(epoch: DateTime<Utc>) -> f64 {
    epoch.timestamp() as f64 + f64::from(epoch.timestamp_subsec_nanos()) / 1e9
}
