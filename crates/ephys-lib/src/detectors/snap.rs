use crate::channels::{ChannelMap, ChannelRole};
use crate::dataset::SweepDataset;
use crate::detectors::peaks::{find_peak_in_window, SNAP_TOLERANCE_MS};
use crate::params::AnalysisParameters;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// One of the four adjustable window boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    Range1Start,
    Range1End,
    Range2Start,
    Range2End,
}

impl Boundary {
    pub fn label(&self) -> &'static str {
        match self {
            Boundary::Range1Start => "range1_start",
            Boundary::Range1End => "range1_end",
            Boundary::Range2Start => "range2_start",
            Boundary::Range2End => "range2_end",
        }
    }
}

/// A boundary that was moved onto a nearby extremum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapAdjustment {
    pub boundary: Boundary,
    pub original_ms: f64,
    pub snapped_ms: f64,
}

/// Outcome of a snapping pass: which boundaries moved and which searches
/// came up empty (those keep their original value).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapReport {
    pub adjusted: Vec<SnapAdjustment>,
    pub missed: Vec<Boundary>,
}

impl SnapReport {
    pub fn is_empty(&self) -> bool {
        self.adjusted.is_empty() && self.missed.is_empty()
    }
}

/// Nudges enabled window boundaries onto signal extrema before analysis.
///
/// Peak timing is assumed consistent across sweeps within one file, so a
/// single representative sweep (the first, unless overridden) drives every
/// snap decision.
#[derive(Debug, Clone)]
pub struct BoundarySnapper {
    tolerance_ms: f64,
    representative: Option<String>,
}

impl Default for BoundarySnapper {
    fn default() -> Self {
        Self {
            tolerance_ms: SNAP_TOLERANCE_MS,
            representative: None,
        }
    }
}

impl BoundarySnapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(mut self, tolerance_ms: f64) -> Self {
        self.tolerance_ms = tolerance_ms;
        self
    }

    /// Use a specific sweep instead of the first one as the representative
    /// signal for all snap decisions.
    pub fn with_representative(mut self, sweep_id: impl Into<String>) -> Self {
        self.representative = Some(sweep_id.into());
        self
    }

    /// Snap enabled boundaries and return the adjusted parameters plus a
    /// report. Parameters come back unchanged (and the report empty) when no
    /// snap flag is set or the dataset has no sweeps.
    pub fn adjust_boundaries(
        &self,
        dataset: &SweepDataset,
        params: &AnalysisParameters,
        channels: &ChannelMap,
    ) -> (AnalysisParameters, SnapReport) {
        if !params.any_snap_enabled() || dataset.is_empty() {
            return (params.clone(), SnapReport::default());
        }

        let sweep_id = match &self.representative {
            Some(id) => id.clone(),
            None => match dataset.sweeps().next() {
                Some(id) => id.to_string(),
                None => return (params.clone(), SnapReport::default()),
            },
        };

        // Search on the channel the Y axis reads.
        let channel = match params.y_axis.channel {
            Some(ChannelRole::Current) => channels.current_channel(),
            _ => channels.voltage_channel(),
        };

        let (time_ms, data) = match dataset.get_channel_vector(&sweep_id, channel) {
            Some(vectors) => vectors,
            None => {
                warn!("could not extract sweep {sweep_id} channel {channel} for peak snapping");
                return (params.clone(), SnapReport::default());
            }
        };

        let mut report = SnapReport::default();
        let mut snap = |enabled: bool, boundary: Boundary, value: f64| -> f64 {
            if !enabled {
                return value;
            }
            match find_peak_in_window(time_ms, data, value, self.tolerance_ms) {
                Some(snapped) => {
                    report.adjusted.push(SnapAdjustment {
                        boundary,
                        original_ms: value,
                        snapped_ms: snapped,
                    });
                    snapped
                }
                None => {
                    report.missed.push(boundary);
                    value
                }
            }
        };

        let range1 = (
            snap(params.snap_range1_start, Boundary::Range1Start, params.range1_start),
            snap(params.snap_range1_end, Boundary::Range1End, params.range1_end),
        );
        let range2 = if params.use_dual_range {
            match (params.range2_start, params.range2_end) {
                (Some(start), Some(end)) => Some((
                    snap(params.snap_range2_start, Boundary::Range2Start, start),
                    snap(params.snap_range2_end, Boundary::Range2End, end),
                )),
                _ => None,
            }
        } else {
            None
        };

        if report.adjusted.is_empty() {
            return (params.clone(), report);
        }

        for adj in &report.adjusted {
            debug!(
                "snapped {} from {:.3} ms to {:.3} ms",
                adj.boundary.label(),
                adj.original_ms,
                adj.snapped_ms
            );
        }
        (params.with_boundaries(range1, range2), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_with_spike(spike_time: f64) -> SweepDataset {
        let n = 400;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.05).collect();
        let voltage = vec![-80.0; n];
        let current: Vec<f64> = time
            .iter()
            .map(|&t| if (t - spike_time).abs() < 1e-9 { -250.0 } else { -10.0 })
            .collect();
        let mut ds = SweepDataset::new();
        ds.add_sweep("0", time, vec![voltage, current]).unwrap();
        ds
    }

    fn snapping_params(range1_start: f64) -> AnalysisParameters {
        AnalysisParameters {
            range1_start,
            range1_end: 15.0,
            snap_range1_start: true,
            ..Default::default()
        }
    }

    #[test]
    fn no_flags_is_a_no_op() {
        let ds = dataset_with_spike(5.0);
        let params = AnalysisParameters::default();
        let (adjusted, report) =
            BoundarySnapper::new().adjust_boundaries(&ds, &params, &ChannelMap::default());
        assert_eq!(adjusted, params);
        assert!(report.is_empty());
    }

    #[test]
    fn empty_dataset_is_a_no_op() {
        let ds = SweepDataset::new();
        let params = snapping_params(5.0);
        let (adjusted, report) =
            BoundarySnapper::new().adjust_boundaries(&ds, &params, &ChannelMap::default());
        assert_eq!(adjusted, params);
        assert!(report.is_empty());
    }

    #[test]
    fn snaps_boundary_onto_nearby_spike() {
        let ds = dataset_with_spike(5.05);
        // Default Y axis is Average Current, so the current channel drives the search.
        let params = snapping_params(5.0);
        let (adjusted, report) =
            BoundarySnapper::new().adjust_boundaries(&ds, &params, &ChannelMap::default());
        assert_eq!(report.adjusted.len(), 1);
        assert_eq!(report.adjusted[0].boundary, Boundary::Range1Start);
        assert!((adjusted.range1_start - 5.05).abs() < 1e-9);
        assert_eq!(adjusted.range1_end, params.range1_end);
    }

    #[test]
    fn miss_keeps_original_value_and_is_reported() {
        // Spike far outside the tolerance window around 5.0 ms.
        let ds = dataset_with_spike(12.0);
        let params = snapping_params(5.0);
        let (adjusted, report) =
            BoundarySnapper::new().adjust_boundaries(&ds, &params, &ChannelMap::default());
        assert!(report.adjusted.is_empty());
        assert_eq!(report.missed, vec![Boundary::Range1Start]);
        assert_eq!(adjusted.range1_start, 5.0);
    }
}
