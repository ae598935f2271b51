use crate::channels::ChannelMap;
use crate::dataset::SweepDataset;
use crate::detectors::snap::BoundarySnapper;
use crate::engine::AnalysisEngine;
use crate::io::csv as csv_io;
use crate::models::{BatchAnalysisResult, BatchExportResult, ExportOutcome, FileAnalysisResult};
use crate::params::{AnalysisParameters, ParamError};
use crate::plot::{self, ExportTable};
use anyhow::Context;
use csv::WriterBuilder;
use log::{error, info};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no files provided")]
    EmptyFileList,
    #[error(transparent)]
    InvalidParams(#[from] ParamError),
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Name of the supplementary CSV listing post-snap boundaries per file.
pub const BOUNDARY_AUDIT_FILE: &str = "analysis_boundaries.csv";

pub type DatasetLoader = dyn Fn(&Path) -> anyhow::Result<SweepDataset> + Send + Sync;
pub type ProgressCallback = dyn Fn(usize, usize, &str) + Send + Sync;

/// Runs the analysis pipeline over many files with shared parameters.
///
/// Each file gets its own dataset and engine; the channel map is read-only
/// for the duration of a batch. Per-file failures become failed result
/// records instead of aborting the run.
pub struct BatchProcessor {
    channels: ChannelMap,
    snapper: BoundarySnapper,
    loader: Box<DatasetLoader>,
    on_progress: Option<Box<ProgressCallback>>,
}

impl BatchProcessor {
    pub fn new(channels: ChannelMap) -> Self {
        Self {
            channels,
            snapper: BoundarySnapper::new(),
            loader: Box::new(|path| csv_io::load_sweep_csv(path)),
            on_progress: None,
        }
    }

    /// Replace the default sweep-CSV loader (e.g. with a format-specific one).
    pub fn with_loader(
        mut self,
        loader: impl Fn(&Path) -> anyhow::Result<SweepDataset> + Send + Sync + 'static,
    ) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_snapper(mut self, snapper: BoundarySnapper) -> Self {
        self.snapper = snapper;
        self
    }

    /// Progress callback, invoked with `(completed, total, file_name)`.
    pub fn on_progress(
        mut self,
        callback: impl Fn(usize, usize, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Process every file under one parameter set.
    ///
    /// Raises only for caller contract violations (empty list, invalid
    /// parameters, pool construction); every per-file condition is captured
    /// in the returned result. Sequential mode preserves input order;
    /// parallel mode makes no ordering promise.
    pub fn process_files(
        &self,
        file_paths: &[String],
        params: &AnalysisParameters,
        parallel: bool,
        max_workers: usize,
    ) -> Result<BatchAnalysisResult, BatchError> {
        if file_paths.is_empty() {
            return Err(BatchError::EmptyFileList);
        }
        params.validate()?;

        info!("processing {} files", file_paths.len());
        let start_unix = unix_now();
        let total = file_paths.len();

        let results: Vec<FileAnalysisResult> = if parallel && total > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(max_workers.max(1))
                .build()
                .map_err(|e| BatchError::WorkerPool(e.to_string()))?;
            let completed = AtomicUsize::new(0);
            pool.install(|| {
                file_paths
                    .par_iter()
                    .map(|path| {
                        let result = self.process_single_file(path, params);
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(callback) = &self.on_progress {
                            callback(done, total, &file_name_of(path));
                        }
                        result
                    })
                    .collect()
            })
        } else {
            let mut results = Vec::with_capacity(total);
            for (i, path) in file_paths.iter().enumerate() {
                if let Some(callback) = &self.on_progress {
                    callback(i + 1, total, &file_name_of(path));
                }
                results.push(self.process_single_file(path, params));
            }
            results
        };

        let (successful, failed): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.success);
        let end_unix = unix_now();
        info!(
            "batch complete: {} succeeded, {} failed in {:.2}s",
            successful.len(),
            failed.len(),
            end_unix - start_unix
        );

        Ok(BatchAnalysisResult::new(
            successful,
            failed,
            params.clone(),
            start_unix,
            end_unix,
        ))
    }

    fn process_single_file(&self, path: &str, params: &AnalysisParameters) -> FileAnalysisResult {
        let base_name = clean_base_name(path);
        let timer = Instant::now();
        match self.run_pipeline(Path::new(path), params) {
            Ok((analysis, table, used)) => FileAnalysisResult {
                file_path: path.to_string(),
                base_name,
                success: true,
                x_data: analysis.x_data,
                y_data: analysis.y_data,
                x_data2: params.use_dual_range.then_some(analysis.x_data2),
                y_data2: params.use_dual_range.then_some(analysis.y_data2),
                export_table: Some(table),
                processing_time_s: timer.elapsed().as_secs_f64(),
                error_message: None,
                actual_range1_start: Some(used.range1_start),
                actual_range1_end: Some(used.range1_end),
                actual_range2_start: if params.use_dual_range { used.range2_start } else { None },
                actual_range2_end: if params.use_dual_range { used.range2_end } else { None },
            },
            Err(e) => {
                error!("failed to process {base_name}: {e:#}");
                FileAnalysisResult::failure(
                    path,
                    base_name,
                    format!("{e:#}"),
                    timer.elapsed().as_secs_f64(),
                )
            }
        }
    }

    fn run_pipeline(
        &self,
        path: &Path,
        params: &AnalysisParameters,
    ) -> anyhow::Result<(plot::AnalysisResult, ExportTable, AnalysisParameters)> {
        let dataset = (self.loader)(path)?;

        let used = if params.any_snap_enabled() {
            let (adjusted, _report) =
                self.snapper
                    .adjust_boundaries(&dataset, params, &self.channels);
            adjusted
        } else {
            params.clone()
        };

        let engine = AnalysisEngine::new(&self.channels);
        let analysis = engine.analyze(&dataset, &used);
        let table = plot::format_for_export(&analysis, &used);
        Ok((analysis, table, used))
    }

    /// Write one CSV per selected successful file into `output_dir`, plus
    /// the boundary-audit file when snapping was in play. One file's export
    /// failure never blocks the others.
    pub fn export_results(
        &self,
        batch: &BatchAnalysisResult,
        output_dir: &Path,
    ) -> BatchExportResult {
        let mut outcomes = Vec::new();
        let mut total_records = 0usize;

        for result in &batch.successful_results {
            if !batch.selected_files.contains(&result.base_name) {
                continue;
            }
            let Some(table) = &result.export_table else {
                continue;
            };
            let file_name = format!("{}.csv", result.base_name);
            let path = output_dir.join(&file_name);
            match csv_io::write_export_table(&path, table) {
                Ok(records) => {
                    total_records += records;
                    outcomes.push(ExportOutcome {
                        file_name,
                        success: true,
                        records_exported: records,
                        error_message: None,
                    });
                }
                Err(e) => {
                    error!("export failed for {file_name}: {e:#}");
                    outcomes.push(ExportOutcome {
                        file_name,
                        success: false,
                        records_exported: 0,
                        error_message: Some(format!("{e:#}")),
                    });
                }
            }
        }

        if batch.parameters.any_snap_enabled() {
            let audit_path = output_dir.join(BOUNDARY_AUDIT_FILE);
            if let Err(e) = export_boundary_audit(batch, &audit_path) {
                error!("failed to export boundary audit: {e:#}");
            }
        }

        info!(
            "exported {} files, {} total records",
            outcomes.iter().filter(|o| o.success).count(),
            total_records
        );

        BatchExportResult {
            export_results: outcomes,
            output_directory: output_dir.display().to_string(),
            total_records,
        }
    }
}

/// Write the post-snap boundary audit. Returns `Ok(false)` (and writes
/// nothing) when no successful result carries boundary information.
pub fn export_boundary_audit(batch: &BatchAnalysisResult, path: &Path) -> anyhow::Result<bool> {
    let rows: Vec<&FileAnalysisResult> = batch
        .successful_results
        .iter()
        .filter(|r| r.actual_range1_start.is_some())
        .collect();
    if rows.is_empty() {
        info!("no boundary information to export");
        return Ok(false);
    }

    let dual = batch.parameters.use_dual_range;
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);

    let mut header = vec!["File", "Range1_Start", "Range1_End"];
    if dual {
        header.extend(["Range2_Start", "Range2_End"]);
    }
    writer.write_record(&header)?;

    for result in rows {
        let mut record = vec![
            result.base_name.clone(),
            format_boundary(result.actual_range1_start),
            format_boundary(result.actual_range1_end),
        ];
        if dual {
            record.push(format_boundary(result.actual_range2_start));
            record.push(format_boundary(result.actual_range2_end));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(true)
}

fn format_boundary(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => String::new(),
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// File stem with every bracketed group removed, e.g.
/// `rec_001[1-12].csv` -> `rec_001`.
pub fn clean_base_name(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let mut cleaned = String::with_capacity(stem.len());
    let mut depth = 0usize;
    for c in stem.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelRole;
    use crate::params::AxisConfig;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_recording(dir: &Path, name: &str, sweeps: usize) -> String {
        let path = dir.join(name);
        let mut text = String::from("sweep,time_ms,voltage_mV,current_pA\n");
        for sweep in 0..sweeps {
            for sample in 0..50 {
                let t = sample as f64;
                let v = if (10.0..=30.0).contains(&t) { -40.0 } else { -80.0 };
                let c = if (10.0..=30.0).contains(&t) {
                    -100.0 - 10.0 * sweep as f64
                } else {
                    -5.0
                };
                text.push_str(&format!("{sweep},{t},{v},{c}\n"));
            }
        }
        fs::write(&path, text).unwrap();
        path.display().to_string()
    }

    fn test_params() -> AnalysisParameters {
        AnalysisParameters {
            range1_start: 10.0,
            range1_end: 30.0,
            x_axis: AxisConfig::time(),
            y_axis: AxisConfig::average(ChannelRole::Current),
            ..Default::default()
        }
    }

    #[test]
    fn empty_file_list_is_a_usage_error() {
        let processor = BatchProcessor::new(ChannelMap::default());
        let err = processor
            .process_files(&[], &test_params(), false, 4)
            .unwrap_err();
        assert!(matches!(err, BatchError::EmptyFileList));
    }

    #[test]
    fn partial_failure_is_isolated() {
        let dir = tempdir().unwrap();
        let good1 = write_recording(dir.path(), "a.csv", 3);
        let missing = dir.path().join("nope.csv").display().to_string();
        let good2 = write_recording(dir.path(), "b.csv", 3);

        let processor = BatchProcessor::new(ChannelMap::default());
        let batch = processor
            .process_files(&[good1, missing, good2], &test_params(), false, 4)
            .unwrap();
        assert_eq!(batch.successful_results.len(), 2);
        assert_eq!(batch.failed_results.len(), 1);
        assert!(batch.failed_results[0].error_message.is_some());
        assert!((batch.success_rate() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sequential_progress_preserves_input_order() {
        let dir = tempdir().unwrap();
        let paths = vec![
            write_recording(dir.path(), "one.csv", 2),
            write_recording(dir.path(), "two.csv", 2),
            write_recording(dir.path(), "three.csv", 2),
        ];
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_in_cb = Arc::clone(&seen);
        let processor = BatchProcessor::new(ChannelMap::default()).on_progress(
            move |completed, total, name| {
                seen_in_cb.lock().unwrap().push((completed, total, name.to_string()));
            },
        );
        processor
            .process_files(&paths, &test_params(), false, 4)
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (1, 3, "one.csv".to_string()),
                (2, 3, "two.csv".to_string()),
                (3, 3, "three.csv".to_string()),
            ]
        );
    }

    #[test]
    fn parallel_mode_processes_every_file() {
        let dir = tempdir().unwrap();
        let paths: Vec<String> = (0..6)
            .map(|i| write_recording(dir.path(), &format!("rec_{i}.csv"), 2))
            .collect();
        let count = Arc::new(AtomicUsize::new(0));
        let count_in_cb = Arc::clone(&count);
        let processor = BatchProcessor::new(ChannelMap::default())
            .on_progress(move |_, _, _| {
                count_in_cb.fetch_add(1, Ordering::SeqCst);
            });
        let batch = processor
            .process_files(&paths, &test_params(), true, 3)
            .unwrap();
        assert_eq!(batch.successful_results.len(), 6);
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn export_writes_one_csv_per_file_and_no_audit_without_snapping() {
        let dir = tempdir().unwrap();
        let out = tempdir().unwrap();
        let paths = vec![
            write_recording(dir.path(), "rec_1.csv", 3),
            write_recording(dir.path(), "rec_2.csv", 3),
        ];
        let processor = BatchProcessor::new(ChannelMap::default());
        let batch = processor
            .process_files(&paths, &test_params(), false, 4)
            .unwrap();
        let export = processor.export_results(&batch, out.path());
        assert_eq!(export.success_count(), 2);
        assert_eq!(export.total_records, 6);
        assert!(out.path().join("rec_1.csv").exists());
        assert!(out.path().join("rec_2.csv").exists());
        assert!(!out.path().join(BOUNDARY_AUDIT_FILE).exists());
    }

    #[test]
    fn audit_file_rows_match_successful_files_when_snapping() {
        let dir = tempdir().unwrap();
        let out = tempdir().unwrap();
        let paths = vec![
            write_recording(dir.path(), "rec_1.csv", 3),
            write_recording(dir.path(), "rec_2.csv", 3),
        ];
        let params = AnalysisParameters {
            snap_range1_start: true,
            ..test_params()
        };
        let processor = BatchProcessor::new(ChannelMap::default());
        let batch = processor.process_files(&paths, &params, false, 4).unwrap();
        processor.export_results(&batch, out.path());
        let audit = fs::read_to_string(out.path().join(BOUNDARY_AUDIT_FILE)).unwrap();
        let lines: Vec<&str> = audit.lines().collect();
        assert_eq!(lines[0], "File,Range1_Start,Range1_End");
        assert_eq!(lines.len(), 1 + batch.successful_results.len());
    }

    #[test]
    fn snapped_boundaries_are_recorded_in_results() {
        let dir = tempdir().unwrap();
        // Spike at 10 ms sits exactly on the range start.
        let path = write_recording(dir.path(), "rec.csv", 2);
        let params = AnalysisParameters {
            snap_range1_start: true,
            ..test_params()
        };
        let processor = BatchProcessor::new(ChannelMap::default());
        let batch = processor
            .process_files(&[path], &params, false, 4)
            .unwrap();
        let result = &batch.successful_results[0];
        assert!(result.actual_range1_start.is_some());
        assert_eq!(result.actual_range1_end, Some(30.0));
    }

    #[test]
    fn base_names_drop_bracketed_suffixes() {
        assert_eq!(clean_base_name("/data/rec_001[1-12].csv"), "rec_001");
        assert_eq!(clean_base_name("plain.csv"), "plain");
        assert_eq!(clean_base_name("a[x]b[y].abf"), "ab");
    }
}
