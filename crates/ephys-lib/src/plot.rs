use crate::channels::ChannelRole;
use crate::metrics::{Statistic, SweepMetrics};
use crate::params::{AnalysisParameters, AxisConfig, Measure, PeakType, RangeId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Tabular form of an extracted series set, ready for CSV serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ExportTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.rows.len()
    }
}

/// Final per-sweep series for one analysis run. Pure transformation output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub x_data: Vec<f64>,
    pub y_data: Vec<f64>,
    pub x_data2: Vec<f64>,
    pub y_data2: Vec<f64>,
    pub x_label: String,
    pub y_label: String,
    pub y_label_r1: Option<String>,
    pub y_label_r2: Option<String>,
    pub sweep_ids: Vec<String>,
}

impl AnalysisResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn sweep_count(&self) -> usize {
        self.x_data.len()
    }
}

/// Resolve an axis configuration to one value per sweep plus its label.
///
/// Total over the metrics list: a missing range or statistic becomes `NaN`
/// (and is logged), never an error or a shortened array.
pub fn extract_axis_data(
    metrics: &[SweepMetrics],
    axis: &AxisConfig,
    range: RangeId,
) -> (Vec<f64>, String) {
    if axis.measure == Measure::Time {
        let values = metrics.iter().map(|m| m.time_s).collect();
        return (values, "Time (s)".to_string());
    }

    let role = axis.channel.unwrap_or_else(|| {
        warn!("axis has no channel for measure {:?}, defaulting to Voltage", axis.measure);
        ChannelRole::Voltage
    });

    let stat = match axis.measure {
        Measure::Average => Statistic::Mean,
        Measure::Peak => {
            let peak_type = axis.peak_type.unwrap_or_else(|| {
                warn!("peak type not specified for {}, defaulting to Absolute", role.label());
                PeakType::Absolute
            });
            match peak_type {
                PeakType::Absolute => Statistic::Absolute,
                PeakType::Positive => Statistic::Positive,
                PeakType::Negative => Statistic::Negative,
                PeakType::PeakPeak => Statistic::PeakPeak,
            }
        }
        Measure::Time => unreachable!(),
    };

    let values: Vec<f64> = metrics.iter().map(|m| m.stat(role, stat, range)).collect();

    if range == RangeId::Two {
        let missing = metrics.iter().filter(|m| m.range2.is_none()).count();
        if missing > 0 {
            warn!("{missing} sweeps have no range-2 metrics; extracted as NaN");
        }
    }
    debug!(
        "extracted {} values for {:?} {} (range {:?})",
        values.len(),
        axis.measure,
        role.label(),
        range
    );

    (values, axis_label(axis))
}

/// Human label for an axis, without touching any data.
pub fn axis_label(axis: &AxisConfig) -> String {
    if axis.measure == Measure::Time {
        return "Time (s)".to_string();
    }
    let role = axis.channel.unwrap_or(ChannelRole::Voltage);
    match axis.measure {
        Measure::Average => format!("Average {} ({})", role.label(), role.unit()),
        Measure::Peak => {
            let peak_type = axis.peak_type.unwrap_or(PeakType::Absolute);
            format!("{} {} ({})", peak_type.label(), role.label(), role.unit())
        }
        Measure::Time => unreachable!(),
    }
}

/// Build the per-sweep plot series for one analysis.
pub fn format_for_plot(metrics: &[SweepMetrics], params: &AnalysisParameters) -> AnalysisResult {
    if metrics.is_empty() {
        return AnalysisResult::empty();
    }

    let (x_data, x_label) = extract_axis_data(metrics, &params.x_axis, RangeId::One);
    let (y_data, y_label) = extract_axis_data(metrics, &params.y_axis, RangeId::One);

    let mut result = AnalysisResult {
        x_data,
        y_data,
        x_label,
        y_label,
        sweep_ids: metrics.iter().map(|m| m.sweep_id.clone()).collect(),
        ..Default::default()
    };

    if params.use_dual_range {
        // Time is identical for both ranges; voltage/current can differ.
        result.x_data2 = if params.x_axis.measure == Measure::Time {
            result.x_data.clone()
        } else {
            extract_axis_data(metrics, &params.x_axis, RangeId::Two).0
        };
        result.y_data2 = extract_axis_data(metrics, &params.y_axis, RangeId::Two).0;

        let mean_v1 = nan_mean(metrics.iter().map(|m| m.stat(ChannelRole::Voltage, Statistic::Mean, RangeId::One)));
        let mean_v2 = nan_mean(metrics.iter().map(|m| m.stat(ChannelRole::Voltage, Statistic::Mean, RangeId::Two)));
        result.y_label_r1 = Some(range_label(&result.y_label, mean_v1));
        result.y_label_r2 = Some(range_label(&result.y_label, mean_v2));
    }

    result
}

/// Convert plot series into the tabular export layout.
///
/// Single range: `(x, y)`. Dual range with a shared x axis: `(x, y1, y2)`
/// truncated to the shortest series. Dual range with per-range x values that
/// differ: `(x1, y1, x2, y2)` right-padded with `NaN` to the longest series.
pub fn format_for_export(result: &AnalysisResult, params: &AnalysisParameters) -> ExportTable {
    if result.x_data.is_empty() {
        return ExportTable::default();
    }

    if params.use_dual_range && !result.y_data2.is_empty() {
        format_dual_range(result, params)
    } else {
        ExportTable {
            headers: vec![result.x_label.clone(), result.y_label.clone()],
            rows: result
                .x_data
                .iter()
                .zip(result.y_data.iter())
                .map(|(x, y)| vec![*x, *y])
                .collect(),
        }
    }
}

fn format_dual_range(result: &AnalysisResult, params: &AnalysisParameters) -> ExportTable {
    let y_label_r1 = result
        .y_label_r1
        .clone()
        .unwrap_or_else(|| format!("{} Range 1", result.y_label));
    let y_label_r2 = result
        .y_label_r2
        .clone()
        .unwrap_or_else(|| format!("{} Range 2", result.y_label));

    let shared_x = params.x_axis.measure == Measure::Time
        || result.x_data2.is_empty()
        || arrays_equal(&result.x_data, &result.x_data2);

    if shared_x {
        let len = result
            .x_data
            .len()
            .min(result.y_data.len())
            .min(result.y_data2.len());
        if len != result.x_data.len() || len != result.y_data.len() || len != result.y_data2.len() {
            warn!(
                "array length mismatch in dual range export: x={}, y1={}, y2={}",
                result.x_data.len(),
                result.y_data.len(),
                result.y_data2.len()
            );
        }
        let rows = (0..len)
            .map(|i| vec![result.x_data[i], result.y_data[i], result.y_data2[i]])
            .collect();
        ExportTable {
            headers: vec![result.x_label.clone(), y_label_r1, y_label_r2],
            rows,
        }
    } else {
        let len = result.x_data.len().max(result.x_data2.len());
        let pad = |series: &[f64], i: usize| series.get(i).copied().unwrap_or(f64::NAN);
        let rows = (0..len)
            .map(|i| {
                vec![
                    pad(&result.x_data, i),
                    pad(&result.y_data, i),
                    pad(&result.x_data2, i),
                    pad(&result.y_data2, i),
                ]
            })
            .collect();
        ExportTable {
            headers: vec![
                format!("{} (Range 1)", result.x_label),
                y_label_r1,
                format!("{} (Range 2)", result.x_label),
                y_label_r2,
            ],
            rows,
        }
    }
}

/// Annotate a Y label with the mean step voltage, e.g. `"... (+40mV)"`.
fn range_label(base_label: &str, voltage: f64) -> String {
    if voltage.is_nan() {
        return base_label.to_string();
    }
    let rounded = voltage.round() as i64;
    if rounded >= 0 {
        format!("{base_label} (+{rounded}mV)")
    } else {
        format!("{base_label} ({rounded}mV)")
    }
}

fn nan_mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Exact elementwise equality; any `NaN` makes the arrays differ.
fn arrays_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}
