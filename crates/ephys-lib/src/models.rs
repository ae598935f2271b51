use crate::params::AnalysisParameters;
use crate::plot::ExportTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One file's outcome within a batch run.
///
/// Replaced wholesale (never field-mutated) when a derived variant such as
/// current density is computed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysisResult {
    pub file_path: String,
    /// Cleaned stem (bracketed annotations removed); the canonical per-file
    /// key throughout batch results.
    pub base_name: String,
    pub success: bool,
    pub x_data: Vec<f64>,
    pub y_data: Vec<f64>,
    pub x_data2: Option<Vec<f64>>,
    pub y_data2: Option<Vec<f64>>,
    pub export_table: Option<ExportTable>,
    pub processing_time_s: f64,
    pub error_message: Option<String>,
    /// Boundaries actually used, after any peak snapping.
    pub actual_range1_start: Option<f64>,
    pub actual_range1_end: Option<f64>,
    pub actual_range2_start: Option<f64>,
    pub actual_range2_end: Option<f64>,
}

impl FileAnalysisResult {
    pub fn failure(
        file_path: impl Into<String>,
        base_name: impl Into<String>,
        error_message: impl Into<String>,
        processing_time_s: f64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            base_name: base_name.into(),
            success: false,
            x_data: Vec::new(),
            y_data: Vec::new(),
            x_data2: None,
            y_data2: None,
            export_table: None,
            processing_time_s,
            error_message: Some(error_message.into()),
            actual_range1_start: None,
            actual_range1_end: None,
            actual_range2_start: None,
            actual_range2_end: None,
        }
    }

    /// Copy with a different base name (used for `_CD` export variants).
    pub fn with_base_name(&self, base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            ..self.clone()
        }
    }
}

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalysisResult {
    pub successful_results: Vec<FileAnalysisResult>,
    pub failed_results: Vec<FileAnalysisResult>,
    pub parameters: AnalysisParameters,
    pub start_time_unix: f64,
    pub end_time_unix: f64,
    /// Base names selected for export; defaults to every successful file.
    pub selected_files: BTreeSet<String>,
}

impl BatchAnalysisResult {
    pub fn new(
        successful_results: Vec<FileAnalysisResult>,
        failed_results: Vec<FileAnalysisResult>,
        parameters: AnalysisParameters,
        start_time_unix: f64,
        end_time_unix: f64,
    ) -> Self {
        let selected_files = successful_results
            .iter()
            .map(|r| r.base_name.clone())
            .collect();
        Self {
            successful_results,
            failed_results,
            parameters,
            start_time_unix,
            end_time_unix,
            selected_files,
        }
    }

    pub fn total_files(&self) -> usize {
        self.successful_results.len() + self.failed_results.len()
    }

    pub fn processing_time_s(&self) -> f64 {
        (self.end_time_unix - self.start_time_unix).max(0.0)
    }

    /// Fraction of files that succeeded, in percent.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_files();
        if total == 0 {
            return 0.0;
        }
        self.successful_results.len() as f64 / total as f64 * 100.0
    }
}

/// Outcome of writing one file's CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub file_name: String,
    pub success: bool,
    pub records_exported: usize,
    pub error_message: Option<String>,
}

/// Aggregate outcome of a batch export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExportResult {
    pub export_results: Vec<ExportOutcome>,
    pub output_directory: String,
    pub total_records: usize,
}

impl BatchExportResult {
    pub fn success_count(&self) -> usize {
        self.export_results.iter().filter(|r| r.success).count()
    }
}
