use crate::channels::ChannelRole;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("range {range} start {start} must be less than end {end}")]
    InvalidRange { range: u8, start: f64, end: f64 },
    #[error("dual range enabled but range 2 boundaries are missing")]
    MissingRange2,
    #[error("stimulus period must be positive, got {0}")]
    InvalidStimulusPeriod(f64),
    #[error("axis channel must be set exactly when measure is not Time")]
    AxisChannelMismatch,
}

/// What a plot/export axis measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measure {
    Time,
    Average,
    Peak,
}

/// Which extremum a Peak axis reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakType {
    Absolute,
    Positive,
    Negative,
    PeakPeak,
}

impl PeakType {
    pub fn label(&self) -> &'static str {
        match self {
            PeakType::Absolute => "Peak",
            PeakType::Positive => "Peak (+)",
            PeakType::Negative => "Peak (-)",
            PeakType::PeakPeak => "Peak-Peak",
        }
    }
}

/// One of the (up to two) analysis windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeId {
    One,
    Two,
}

/// Axis configuration: measure, channel, and (for Peak) which extremum.
///
/// `channel` is `None` exactly when `measure` is `Time`. `peak_type` is only
/// meaningful for `Peak` axes and defaults to `Absolute` when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub measure: Measure,
    pub channel: Option<ChannelRole>,
    pub peak_type: Option<PeakType>,
}

impl AxisConfig {
    pub fn time() -> Self {
        Self {
            measure: Measure::Time,
            channel: None,
            peak_type: None,
        }
    }

    pub fn average(channel: ChannelRole) -> Self {
        Self {
            measure: Measure::Average,
            channel: Some(channel),
            peak_type: None,
        }
    }

    pub fn peak(channel: ChannelRole, peak_type: PeakType) -> Self {
        Self {
            measure: Measure::Peak,
            channel: Some(channel),
            peak_type: Some(peak_type),
        }
    }

    fn validate(&self) -> Result<(), ParamError> {
        let wants_channel = self.measure != Measure::Time;
        if wants_channel != self.channel.is_some() {
            return Err(ParamError::AxisChannelMismatch);
        }
        Ok(())
    }
}

/// Channel bookkeeping carried alongside the analysis configuration: display
/// units plus whether the caller swapped the voltage/current roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub voltage_units: String,
    pub current_units: String,
    pub swapped: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            voltage_units: "mV".into(),
            current_units: "pA".into(),
            swapped: false,
        }
    }
}

/// Immutable configuration bundle for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Range 1 window in milliseconds.
    pub range1_start: f64,
    pub range1_end: f64,
    pub use_dual_range: bool,
    /// Range 2 window, required iff `use_dual_range`.
    pub range2_start: Option<f64>,
    pub range2_end: Option<f64>,
    /// Inter-sweep stimulus period in milliseconds; per-sweep elapsed time is
    /// `sweep_index * stimulus_period_ms / 1000` seconds.
    pub stimulus_period_ms: f64,
    pub x_axis: AxisConfig,
    pub y_axis: AxisConfig,
    pub snap_range1_start: bool,
    pub snap_range1_end: bool,
    pub snap_range2_start: bool,
    pub snap_range2_end: bool,
    pub channel_config: ChannelConfig,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            range1_start: 0.0,
            range1_end: 100.0,
            use_dual_range: false,
            range2_start: None,
            range2_end: None,
            stimulus_period_ms: 1000.0,
            x_axis: AxisConfig::time(),
            y_axis: AxisConfig::average(ChannelRole::Current),
            snap_range1_start: false,
            snap_range1_end: false,
            snap_range2_start: false,
            snap_range2_end: false,
            channel_config: ChannelConfig::default(),
        }
    }
}

impl AnalysisParameters {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.range1_start >= self.range1_end {
            return Err(ParamError::InvalidRange {
                range: 1,
                start: self.range1_start,
                end: self.range1_end,
            });
        }
        if self.use_dual_range {
            match (self.range2_start, self.range2_end) {
                (Some(start), Some(end)) if start < end => {}
                (Some(start), Some(end)) => {
                    return Err(ParamError::InvalidRange {
                        range: 2,
                        start,
                        end,
                    })
                }
                _ => return Err(ParamError::MissingRange2),
            }
        }
        if self.stimulus_period_ms <= 0.0 {
            return Err(ParamError::InvalidStimulusPeriod(self.stimulus_period_ms));
        }
        self.x_axis.validate()?;
        self.y_axis.validate()?;
        Ok(())
    }

    /// Non-destructive boundary update: returns a new instance with the
    /// window boundaries replaced and everything else carried over.
    pub fn with_boundaries(&self, range1: (f64, f64), range2: Option<(f64, f64)>) -> Self {
        Self {
            range1_start: range1.0,
            range1_end: range1.1,
            range2_start: range2.map(|r| r.0).or(self.range2_start),
            range2_end: range2.map(|r| r.1).or(self.range2_end),
            ..self.clone()
        }
    }

    pub fn any_snap_enabled(&self) -> bool {
        self.snap_range1_start
            || self.snap_range1_end
            || self.snap_range2_start
            || self.snap_range2_end
    }

    pub fn range(&self, id: RangeId) -> Option<(f64, f64)> {
        match id {
            RangeId::One => Some((self.range1_start, self.range1_end)),
            RangeId::Two => match (self.range2_start, self.range2_end) {
                (Some(start), Some(end)) => Some((start, end)),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid() {
        AnalysisParameters::default().validate().unwrap();
    }

    #[test]
    fn inverted_range_is_rejected() {
        let params = AnalysisParameters {
            range1_start: 200.0,
            range1_end: 100.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamError::InvalidRange { range: 1, .. })
        ));
    }

    #[test]
    fn dual_range_requires_range2() {
        let params = AnalysisParameters {
            use_dual_range: true,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ParamError::MissingRange2)));
    }

    #[test]
    fn time_axis_must_not_carry_channel() {
        let params = AnalysisParameters {
            x_axis: AxisConfig {
                measure: Measure::Time,
                channel: Some(ChannelRole::Voltage),
                peak_type: None,
            },
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamError::AxisChannelMismatch)
        ));
    }

    #[test]
    fn with_boundaries_leaves_original_untouched() {
        let params = AnalysisParameters::default();
        let updated = params.with_boundaries((10.0, 20.0), None);
        assert_eq!(params.range1_start, 0.0);
        assert_eq!(updated.range1_start, 10.0);
        assert_eq!(updated.range1_end, 20.0);
        assert_eq!(updated.stimulus_period_ms, params.stimulus_period_ms);
    }
}
