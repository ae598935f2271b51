use crate::channels::ChannelMap;
use crate::dataset::SweepDataset;
use crate::metrics::{compute_sweep_metrics, SweepMetrics};
use crate::params::AnalysisParameters;
use crate::plot::{self, AnalysisResult, ExportTable};
use log::debug;

/// Drives metric extraction across every sweep of one dataset.
///
/// Stateless across calls; a sweep with no samples in a window contributes
/// `NaN` data points instead of aborting the run, so output arrays always
/// line up with the sweep count.
pub struct AnalysisEngine<'a> {
    channels: &'a ChannelMap,
}

impl<'a> AnalysisEngine<'a> {
    pub fn new(channels: &'a ChannelMap) -> Self {
        Self { channels }
    }

    /// One `SweepMetrics` per sweep, in dataset order.
    pub fn sweep_metrics(
        &self,
        dataset: &SweepDataset,
        params: &AnalysisParameters,
    ) -> Vec<SweepMetrics> {
        let mut metrics = Vec::with_capacity(dataset.sweep_count());
        for id in dataset.sweeps() {
            if let Some(sweep) = dataset.get_sweep(id) {
                metrics.push(compute_sweep_metrics(sweep, id, self.channels, params));
            }
        }
        debug!("computed metrics for {} sweeps", metrics.len());
        metrics
    }

    /// Full analysis: metrics for every sweep, then axis extraction.
    /// An empty dataset produces an explicitly empty result.
    pub fn analyze(&self, dataset: &SweepDataset, params: &AnalysisParameters) -> AnalysisResult {
        if dataset.is_empty() {
            return AnalysisResult::empty();
        }
        let metrics = self.sweep_metrics(dataset, params);
        plot::format_for_plot(&metrics, params)
    }

    /// Analysis followed by export-table formatting.
    pub fn export_table(&self, dataset: &SweepDataset, params: &AnalysisParameters) -> ExportTable {
        let result = self.analyze(dataset, params);
        plot::format_for_export(&result, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelRole;
    use crate::params::AxisConfig;

    fn three_sweep_dataset() -> SweepDataset {
        let mut ds = SweepDataset::new();
        for i in 0..3 {
            // 0..300 ms at 1 ms spacing; voltage steps differ per sweep in
            // the 100-200 ms window, current scales with the step.
            let time: Vec<f64> = (0..301).map(|s| s as f64).collect();
            let step_mv = -80.0 + 20.0 * i as f64;
            let voltage: Vec<f64> = time
                .iter()
                .map(|&t| if (100.0..=200.0).contains(&t) { step_mv } else { -80.0 })
                .collect();
            let current: Vec<f64> = time
                .iter()
                .map(|&t| if (100.0..=200.0).contains(&t) { step_mv * 2.0 } else { -5.0 })
                .collect();
            ds.add_sweep(i.to_string(), time, vec![voltage, current])
                .unwrap();
        }
        ds
    }

    #[test]
    fn analyze_three_sweeps_end_to_end() {
        let ds = three_sweep_dataset();
        let map = ChannelMap::default();
        let params = AnalysisParameters {
            range1_start: 100.0,
            range1_end: 200.0,
            stimulus_period_ms: 1000.0,
            x_axis: AxisConfig::average(ChannelRole::Voltage),
            y_axis: AxisConfig::average(ChannelRole::Current),
            ..Default::default()
        };
        let result = AnalysisEngine::new(&map).analyze(&ds, &params);
        assert_eq!(result.x_data.len(), 3);
        assert_eq!(result.y_data.len(), 3);
        // Every sample in the window sits at the step level.
        for (i, x) in result.x_data.iter().enumerate() {
            let expected = -80.0 + 20.0 * i as f64;
            assert!((x - expected).abs() < 1e-9, "sweep {i}: {x} vs {expected}");
            assert!((result.y_data[i] - expected * 2.0).abs() < 1e-9);
        }
        assert_eq!(result.x_label, "Average Voltage (mV)");
        assert_eq!(result.y_label, "Average Current (pA)");
        assert_eq!(result.sweep_ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn empty_dataset_analyzes_to_empty_result() {
        let ds = SweepDataset::new();
        let map = ChannelMap::default();
        let result = AnalysisEngine::new(&map).analyze(&ds, &AnalysisParameters::default());
        assert_eq!(result.sweep_count(), 0);
        assert!(result.y_data.is_empty());
    }
}
