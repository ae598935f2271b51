use crate::models::{BatchAnalysisResult, FileAnalysisResult};
use crate::plot::ExportTable;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Cslow values above this are treated as implausible during validation (pF).
pub const CSLOW_SANITY_MAX: f64 = 10_000.0;

#[derive(Debug, Error)]
pub enum DensityError {
    #[error("Cslow must be positive, got {0}")]
    NonPositiveCslow(f64),
}

/// Suffix appended to base names for current-density export variants.
pub const CD_SUFFIX: &str = "_CD";

/// Per-file Cslow mapping keyed by base name.
pub type CslowMap = BTreeMap<String, f64>;

/// Derives current-density series from an already-computed batch result.
///
/// Recomputation is per-file and idempotent: it always starts from the
/// untouched original batch result, so editing a file's Cslow twice never
/// compounds a division.
#[derive(Debug, Default)]
pub struct CurrentDensityService;

impl CurrentDensityService {
    pub fn new() -> Self {
        Self
    }

    /// Divide a current series by a cell capacitance (pA -> pA/pF).
    pub fn calculate_current_density(
        &self,
        values: &[f64],
        cslow: f64,
    ) -> Result<Vec<f64>, DensityError> {
        if cslow <= 0.0 {
            return Err(DensityError::NonPositiveCslow(cslow));
        }
        Ok(values.iter().map(|v| v / cslow).collect())
    }

    /// Flag unusable Cslow entries before any recompute: missing files,
    /// non-positive values, and implausibly large values. Returns a map of
    /// per-file error messages; empty means the mapping is usable.
    pub fn validate_cslow_values(
        &self,
        mapping: &CslowMap,
        expected_names: &BTreeSet<String>,
    ) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        for name in expected_names {
            match mapping.get(name) {
                None => {
                    errors.insert(name.clone(), "no Cslow value provided".to_string());
                }
                Some(&cslow) if cslow <= 0.0 => {
                    errors.insert(name.clone(), format!("Cslow must be positive, got {cslow}"));
                }
                Some(&cslow) if cslow > CSLOW_SANITY_MAX => {
                    errors.insert(
                        name.clone(),
                        format!("Cslow {cslow} pF exceeds plausible maximum {CSLOW_SANITY_MAX}"),
                    );
                }
                Some(_) => {}
            }
        }
        errors
    }

    /// Recompute one file from its *original* (pre-division) result.
    ///
    /// The export table is copied from the original with only the y column(s)
    /// overwritten (column 1, and column 2 for dual range); headers naming
    /// Current get their unit rewritten to a density unit.
    pub fn recalculate_file(
        &self,
        original: &FileAnalysisResult,
        cslow: f64,
        use_dual_range: bool,
        current_units: &str,
    ) -> Result<FileAnalysisResult, DensityError> {
        let new_y = self.calculate_current_density(&original.y_data, cslow)?;
        let new_y2 = match (use_dual_range, &original.y_data2) {
            (true, Some(y2)) => Some(self.calculate_current_density(y2, cslow)?),
            _ => None,
        };

        let export_table = original.export_table.as_ref().map(|table| {
            let mut table = table.clone();
            overwrite_column(&mut table, 1, &new_y);
            if let Some(y2) = &new_y2 {
                overwrite_column(&mut table, 2, y2);
            }
            rewrite_current_headers(&mut table, &format!("{current_units}/pF"));
            table
        });

        let mut updated = original.clone();
        updated.y_data = new_y;
        if new_y2.is_some() {
            updated.y_data2 = new_y2;
        }
        updated.export_table = export_table;
        Ok(updated)
    }

    /// Build the active (derived) batch result from the original one.
    ///
    /// Files without a positive Cslow entry are carried over untouched and
    /// logged; the original result is never modified.
    pub fn apply_to_batch(
        &self,
        original: &BatchAnalysisResult,
        cslow_mapping: &CslowMap,
    ) -> BatchAnalysisResult {
        let use_dual = original.parameters.use_dual_range;
        let units = original.parameters.channel_config.current_units.clone();
        let mut active = original.clone();
        for result in &mut active.successful_results {
            match cslow_mapping.get(&result.base_name) {
                Some(&cslow) if cslow > 0.0 => {
                    match self.recalculate_file(result, cslow, use_dual, &units) {
                        Ok(updated) => *result = updated,
                        Err(e) => warn!("skipping {}: {e}", result.base_name),
                    }
                }
                _ => {
                    warn!("no usable Cslow for {}, leaving raw currents", result.base_name);
                }
            }
        }
        debug!("applied current density to {} files", active.successful_results.len());
        active
    }

    /// Copy of a result renamed with the `_CD` export suffix.
    pub fn with_cd_suffix(&self, result: &FileAnalysisResult) -> FileAnalysisResult {
        result.with_base_name(format!("{}{}", result.base_name, CD_SUFFIX))
    }

    /// Voltage-keyed summary table: one row per distinct x value (rounded to
    /// 0.1), one column per selected recording, cells right-padded with NaN
    /// where a recording has no sample at that voltage.
    pub fn summary_table(
        &self,
        results: &[&FileAnalysisResult],
        y_unit: &str,
    ) -> ExportTable {
        let sorted = sort_by_numeric_suffix(results);

        let mut headers = vec!["Voltage (mV)".to_string()];
        headers.extend(
            sorted
                .iter()
                .map(|r| format!("{} ({})", r.base_name, y_unit)),
        );

        // Key rows by the x value rounded to one decimal, in ascending order.
        let mut rows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for (col, result) in sorted.iter().enumerate() {
            for (i, &x) in result.x_data.iter().enumerate() {
                if x.is_nan() {
                    continue;
                }
                let key = (x * 10.0).round() as i64;
                let row = rows
                    .entry(key)
                    .or_insert_with(|| vec![f64::NAN; sorted.len()]);
                if let Some(&y) = result.y_data.get(i) {
                    row[col] = y;
                }
            }
        }

        let rows = rows
            .into_iter()
            .map(|(key, values)| {
                let mut row = Vec::with_capacity(values.len() + 1);
                row.push(key as f64 / 10.0);
                row.extend(values);
                row
            })
            .collect();

        ExportTable { headers, rows }
    }
}

/// Sort results by the trailing `_<number>` of their base name, files
/// without one first.
pub fn sort_by_numeric_suffix<'a>(
    results: &[&'a FileAnalysisResult],
) -> Vec<&'a FileAnalysisResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| numeric_suffix(&r.base_name));
    sorted
}

fn numeric_suffix(base_name: &str) -> u64 {
    base_name
        .rsplit('_')
        .next()
        .and_then(|tail| tail.parse::<u64>().ok())
        .unwrap_or(0)
}

fn overwrite_column(table: &mut ExportTable, column: usize, values: &[f64]) {
    for (row, &value) in table.rows.iter_mut().zip(values.iter()) {
        if let Some(cell) = row.get_mut(column) {
            *cell = value;
        }
    }
}

/// Rewrite the parenthesized unit of every header whose label names Current.
fn rewrite_current_headers(table: &mut ExportTable, unit: &str) {
    for header in &mut table.headers {
        if header.contains("Current") && header.contains('(') && header.contains(')') {
            let base = header.split('(').next().unwrap_or(header).trim();
            *header = format!("{base} ({unit})");
        }
    }
}

/// Serializable record of one summary column, pairing the positional
/// `Recording N` label with the underlying file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingLabel {
    pub recording: String,
    pub base_name: String,
    pub cslow: f64,
}

/// Positional labels for a sorted result set, mirroring the summary columns.
pub fn recording_labels(
    results: &[&FileAnalysisResult],
    cslow_mapping: &CslowMap,
) -> Vec<RecordingLabel> {
    sort_by_numeric_suffix(results)
        .iter()
        .enumerate()
        .map(|(idx, r)| RecordingLabel {
            recording: format!("Recording {}", idx + 1),
            base_name: r.base_name.clone(),
            cslow: cslow_mapping.get(&r.base_name).copied().unwrap_or(0.0),
        })
        .collect()
}
