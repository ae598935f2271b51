use crate::channels::{ChannelMap, ChannelRole};
use crate::dataset::Sweep;
use crate::params::{AnalysisParameters, RangeId};
use log::error;
use serde::{Deserialize, Serialize};

/// Scalar statistic computed over one window of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Mean,
    Absolute,
    Positive,
    Negative,
    PeakPeak,
}

/// The full statistic set for one (channel, window) pair.
///
/// Every field is `NaN` when the window selected no samples; `positive` and
/// `negative` are additionally `NaN` when no sample of the matching sign
/// exists (a deliberate choice over clipping to zero).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeStats {
    pub mean: f64,
    pub absolute: f64,
    pub positive: f64,
    pub negative: f64,
    pub peak_peak: f64,
}

impl RangeStats {
    pub const NAN: RangeStats = RangeStats {
        mean: f64::NAN,
        absolute: f64::NAN,
        positive: f64::NAN,
        negative: f64::NAN,
        peak_peak: f64::NAN,
    };

    pub fn get(&self, stat: Statistic) -> f64 {
        match stat {
            Statistic::Mean => self.mean,
            Statistic::Absolute => self.absolute,
            Statistic::Positive => self.positive,
            Statistic::Negative => self.negative,
            Statistic::PeakPeak => self.peak_peak,
        }
    }

    /// Compute all statistics over the given samples.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::NAN;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;

        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        let mut absolute = 0.0;
        let mut abs_best = -1.0;
        for &v in samples {
            if v > max {
                max = v;
            }
            if v < min {
                min = v;
            }
            if v.abs() > abs_best {
                abs_best = v.abs();
                absolute = v;
            }
        }
        let positive = if max > 0.0 { max } else { f64::NAN };
        let negative = if min < 0.0 { min } else { f64::NAN };

        Self {
            mean,
            absolute,
            positive,
            negative,
            peak_peak: max - min,
        }
    }
}

/// Per-channel statistics for one window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelStats {
    pub voltage: RangeStats,
    pub current: RangeStats,
}

impl ChannelStats {
    pub fn get(&self, role: ChannelRole) -> &RangeStats {
        match role {
            ChannelRole::Voltage => &self.voltage,
            ChannelRole::Current => &self.current,
        }
    }
}

/// All metrics extracted from one sweep. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepMetrics {
    pub sweep_id: String,
    /// Numeric parse of the identifier, 0 when non-numeric.
    pub sweep_index: usize,
    /// Elapsed time in seconds, derived from the stimulus period.
    pub time_s: f64,
    pub range1: ChannelStats,
    /// Present only in dual-range analyses.
    pub range2: Option<ChannelStats>,
}

impl SweepMetrics {
    /// Fixed-shape lookup keyed by channel, statistic, and range. Returns
    /// `NaN` for a range that was not computed, keeping extraction total.
    pub fn stat(&self, role: ChannelRole, stat: Statistic, range: RangeId) -> f64 {
        match range {
            RangeId::One => self.range1.get(role).get(stat),
            RangeId::Two => self
                .range2
                .as_ref()
                .map(|stats| stats.get(role).get(stat))
                .unwrap_or(f64::NAN),
        }
    }
}

/// Numeric sweep index, falling back to 0 for non-numeric identifiers.
pub fn sweep_index_of(id: &str) -> usize {
    id.trim().parse::<usize>().unwrap_or(0)
}

/// Compute the metric set for one sweep under the given parameters.
pub fn compute_sweep_metrics(
    sweep: &Sweep,
    sweep_id: &str,
    channels: &ChannelMap,
    params: &AnalysisParameters,
) -> SweepMetrics {
    let sweep_index = sweep_index_of(sweep_id);
    let time_s = sweep_index as f64 * params.stimulus_period_ms / 1000.0;

    let range1 = window_channel_stats(
        sweep,
        sweep_id,
        channels,
        params.range1_start,
        params.range1_end,
    );
    let range2 = if params.use_dual_range {
        match (params.range2_start, params.range2_end) {
            (Some(start), Some(end)) => {
                Some(window_channel_stats(sweep, sweep_id, channels, start, end))
            }
            _ => None,
        }
    } else {
        None
    };

    SweepMetrics {
        sweep_id: sweep_id.to_string(),
        sweep_index,
        time_s,
        range1,
        range2,
    }
}

fn window_channel_stats(
    sweep: &Sweep,
    sweep_id: &str,
    channels: &ChannelMap,
    start_ms: f64,
    end_ms: f64,
) -> ChannelStats {
    ChannelStats {
        voltage: window_stats(sweep, sweep_id, channels.voltage_channel(), start_ms, end_ms),
        current: window_stats(sweep, sweep_id, channels.current_channel(), start_ms, end_ms),
    }
}

fn window_stats(
    sweep: &Sweep,
    sweep_id: &str,
    channel: usize,
    start_ms: f64,
    end_ms: f64,
) -> RangeStats {
    let Some(data) = sweep.channel(channel) else {
        error!("sweep {sweep_id}: channel {channel} not present");
        return RangeStats::NAN;
    };
    // Both window ends are inclusive.
    let selected: Vec<f64> = sweep
        .time_ms
        .iter()
        .zip(data.iter())
        .filter(|(t, _)| **t >= start_ms && **t <= end_ms)
        .map(|(_, v)| *v)
        .collect();
    RangeStats::from_samples(&selected)
}
