use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ephys_lib::{
    batch::{BatchProcessor, BOUNDARY_AUDIT_FILE},
    channels::{ChannelMap, ChannelRole},
    dataset::SweepDataset,
    density::{recording_labels, CslowMap, CurrentDensityService, RecordingLabel},
    detectors::snap::{BoundarySnapper, SnapReport},
    engine::AnalysisEngine,
    io::csv as csv_io,
    models::BatchAnalysisResult,
    params::{AnalysisParameters, AxisConfig, ChannelConfig, Measure, PeakType},
    plot::AnalysisResult,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "ephys",
    version,
    about = "Batch analysis of sweep-based electrophysiology recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MeasureArg {
    Time,
    Average,
    Peak,
}

impl From<MeasureArg> for Measure {
    fn from(value: MeasureArg) -> Self {
        match value {
            MeasureArg::Time => Measure::Time,
            MeasureArg::Average => Measure::Average,
            MeasureArg::Peak => Measure::Peak,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ChannelArg {
    Voltage,
    Current,
}

impl From<ChannelArg> for ChannelRole {
    fn from(value: ChannelArg) -> Self {
        match value {
            ChannelArg::Voltage => ChannelRole::Voltage,
            ChannelArg::Current => ChannelRole::Current,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PeakArg {
    Absolute,
    Positive,
    Negative,
    #[value(name = "peak-peak")]
    PeakPeak,
}

impl From<PeakArg> for PeakType {
    fn from(value: PeakArg) -> Self {
        match value {
            PeakArg::Absolute => PeakType::Absolute,
            PeakArg::Positive => PeakType::Positive,
            PeakArg::Negative => PeakType::Negative,
            PeakArg::PeakPeak => PeakType::PeakPeak,
        }
    }
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// Range 1 window start (ms)
    #[arg(long, default_value_t = 0.0)]
    range1_start: f64,
    /// Range 1 window end (ms)
    #[arg(long, default_value_t = 100.0)]
    range1_end: f64,
    /// Compute a second, independent metric set over range 2
    #[arg(long)]
    dual_range: bool,
    #[arg(long, requires = "dual_range")]
    range2_start: Option<f64>,
    #[arg(long, requires = "dual_range")]
    range2_end: Option<f64>,
    /// Inter-sweep stimulus period (ms)
    #[arg(long, default_value_t = 1000.0)]
    stimulus_period: f64,
    #[arg(long, value_enum, default_value_t = MeasureArg::Time)]
    x_measure: MeasureArg,
    #[arg(long, value_enum)]
    x_channel: Option<ChannelArg>,
    #[arg(long, value_enum)]
    x_peak_type: Option<PeakArg>,
    #[arg(long, value_enum, default_value_t = MeasureArg::Average)]
    y_measure: MeasureArg,
    #[arg(long, value_enum, default_value_t = ChannelArg::Current)]
    y_channel: ChannelArg,
    #[arg(long, value_enum)]
    y_peak_type: Option<PeakArg>,
    /// Snap the named boundary onto a nearby signal extremum
    #[arg(long)]
    snap_range1_start: bool,
    #[arg(long)]
    snap_range1_end: bool,
    #[arg(long)]
    snap_range2_start: bool,
    #[arg(long)]
    snap_range2_end: bool,
    /// Exchange the voltage/current channel roles before analysis
    #[arg(long)]
    swap_channels: bool,
}

impl ParamArgs {
    fn to_parameters(&self) -> Result<AnalysisParameters> {
        let params = AnalysisParameters {
            range1_start: self.range1_start,
            range1_end: self.range1_end,
            use_dual_range: self.dual_range,
            range2_start: self.range2_start,
            range2_end: self.range2_end,
            stimulus_period_ms: self.stimulus_period,
            x_axis: axis_config(self.x_measure, self.x_channel, self.x_peak_type),
            y_axis: axis_config(self.y_measure, Some(self.y_channel), self.y_peak_type),
            snap_range1_start: self.snap_range1_start,
            snap_range1_end: self.snap_range1_end,
            snap_range2_start: self.snap_range2_start,
            snap_range2_end: self.snap_range2_end,
            channel_config: ChannelConfig {
                swapped: self.swap_channels,
                ..Default::default()
            },
        };
        params.validate().context("invalid analysis parameters")?;
        Ok(params)
    }

    fn channel_map(&self) -> ChannelMap {
        let mut map = ChannelMap::default();
        if self.swap_channels {
            map.swap();
        }
        map
    }
}

fn axis_config(
    measure: MeasureArg,
    channel: Option<ChannelArg>,
    peak_type: Option<PeakArg>,
) -> AxisConfig {
    match measure {
        MeasureArg::Time => AxisConfig::time(),
        _ => AxisConfig {
            measure: measure.into(),
            channel: channel.map(Into::into),
            peak_type: peak_type.map(Into::into),
        },
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one recording and optionally write its export table
    Analyze {
        input: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
        /// Write the export table CSV here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Process many recordings with shared parameters and export CSVs
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long)]
        parallel: bool,
        #[arg(long, default_value_t = 4)]
        max_workers: usize,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Batch analysis normalized to current density via a Cslow mapping
    CurrentDensity {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// TOML file mapping base names to Cslow values (pF)
        #[arg(long)]
        cslow: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long)]
        parallel: bool,
        #[arg(long, default_value_t = 4)]
        max_workers: usize,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Generate a synthetic multi-sweep recording for pipeline testing
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        sweeps: usize,
        #[arg(long, default_value_t = 0.05)]
        dt_ms: f64,
        #[arg(long, default_value_t = 300.0)]
        duration_ms: f64,
        /// Place a current extremum at this time in every sweep (ms)
        #[arg(long, default_value_t = 150.0)]
        peak_time_ms: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze { input, params, out } => cmd_analyze(&input, &params, out.as_deref())?,
        Commands::Batch {
            inputs,
            out_dir,
            parallel,
            max_workers,
            params,
        } => cmd_batch(&inputs, &out_dir, parallel, max_workers, &params)?,
        Commands::CurrentDensity {
            inputs,
            cslow,
            out_dir,
            parallel,
            max_workers,
            params,
        } => cmd_current_density(&inputs, &cslow, &out_dir, parallel, max_workers, &params)?,
        Commands::Synth {
            out,
            sweeps,
            dt_ms,
            duration_ms,
            peak_time_ms,
            seed,
        } => cmd_synth(&out, sweeps, dt_ms, duration_ms, peak_time_ms, seed)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct AnalyzeSummary {
    file: String,
    sweeps: usize,
    snap: SnapReport,
    result: AnalysisResult,
    exported: Option<String>,
    exported_records: Option<usize>,
}

fn cmd_analyze(input: &Path, args: &ParamArgs, out: Option<&Path>) -> Result<()> {
    let params = args.to_parameters()?;
    let channels = args.channel_map();
    let dataset = csv_io::load_sweep_csv(input)?;

    let (used, snap) = if params.any_snap_enabled() {
        BoundarySnapper::new().adjust_boundaries(&dataset, &params, &channels)
    } else {
        (params.clone(), SnapReport::default())
    };

    let engine = AnalysisEngine::new(&channels);
    let result = engine.analyze(&dataset, &used);

    let mut exported = None;
    let mut exported_records = None;
    if let Some(path) = out {
        let table = engine.export_table(&dataset, &used);
        let records = csv_io::write_export_table(path, &table)?;
        exported = Some(path.display().to_string());
        exported_records = Some(records);
    }

    let summary = AnalyzeSummary {
        file: input.display().to_string(),
        sweeps: dataset.sweep_count(),
        snap,
        result,
        exported,
        exported_records,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct FailureSummary {
    file: String,
    error: String,
}

#[derive(Serialize)]
struct BatchSummary {
    total_files: usize,
    succeeded: usize,
    failed: usize,
    success_rate: f64,
    processing_time_s: f64,
    exported_files: usize,
    total_records: usize,
    boundary_audit: Option<String>,
    failures: Vec<FailureSummary>,
}

fn run_batch(
    inputs: &[PathBuf],
    parallel: bool,
    max_workers: usize,
    args: &ParamArgs,
) -> Result<BatchAnalysisResult> {
    let params = args.to_parameters()?;
    let paths: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
    let processor = BatchProcessor::new(args.channel_map()).on_progress(|done, total, name| {
        eprintln!("[{done}/{total}] {name}");
    });
    Ok(processor.process_files(&paths, &params, parallel, max_workers)?)
}

fn cmd_batch(
    inputs: &[PathBuf],
    out_dir: &Path,
    parallel: bool,
    max_workers: usize,
    args: &ParamArgs,
) -> Result<()> {
    let batch = run_batch(inputs, parallel, max_workers, args)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let processor = BatchProcessor::new(args.channel_map());
    let export = processor.export_results(&batch, out_dir);

    let audit_path = out_dir.join(BOUNDARY_AUDIT_FILE);
    let summary = BatchSummary {
        total_files: batch.total_files(),
        succeeded: batch.successful_results.len(),
        failed: batch.failed_results.len(),
        success_rate: batch.success_rate(),
        processing_time_s: batch.processing_time_s(),
        exported_files: export.success_count(),
        total_records: export.total_records,
        boundary_audit: audit_path
            .exists()
            .then(|| audit_path.display().to_string()),
        failures: batch
            .failed_results
            .iter()
            .map(|r| FailureSummary {
                file: r.file_path.clone(),
                error: r.error_message.clone().unwrap_or_default(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct CurrentDensitySummary {
    total_files: usize,
    succeeded: usize,
    failed: usize,
    exported_files: usize,
    total_records: usize,
    summary_csv: String,
    recordings: Vec<RecordingLabel>,
}

fn cmd_current_density(
    inputs: &[PathBuf],
    cslow_path: &Path,
    out_dir: &Path,
    parallel: bool,
    max_workers: usize,
    args: &ParamArgs,
) -> Result<()> {
    let cslow_text = std::fs::read_to_string(cslow_path)
        .with_context(|| format!("reading {}", cslow_path.display()))?;
    let cslow_mapping: CslowMap =
        toml::from_str(&cslow_text).with_context(|| format!("parsing {}", cslow_path.display()))?;

    let batch = run_batch(inputs, parallel, max_workers, args)?;

    let service = CurrentDensityService::new();
    let errors = service.validate_cslow_values(&cslow_mapping, &batch.selected_files);
    if !errors.is_empty() {
        let details: Vec<String> = errors
            .iter()
            .map(|(name, message)| format!("{name}: {message}"))
            .collect();
        bail!("unusable Cslow values:\n{}", details.join("\n"));
    }

    let active = service.apply_to_batch(&batch, &cslow_mapping);

    // Individual exports carry the _CD suffix; the raw batch stays untouched.
    let cd_results: Vec<_> = active
        .successful_results
        .iter()
        .map(|r| service.with_cd_suffix(r))
        .collect();
    let cd_batch = BatchAnalysisResult::new(
        cd_results,
        Vec::new(),
        active.parameters.clone(),
        active.start_time_unix,
        active.end_time_unix,
    );

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let processor = BatchProcessor::new(args.channel_map());
    let export = processor.export_results(&cd_batch, out_dir);

    let selected: Vec<_> = active
        .successful_results
        .iter()
        .filter(|r| batch.selected_files.contains(&r.base_name))
        .collect();
    let y_unit = format!("{}/pF", active.parameters.channel_config.current_units);
    let summary_table = service.summary_table(&selected, &y_unit);
    let summary_csv = out_dir.join("Current_Density_Summary.csv");
    csv_io::write_export_table(&summary_csv, &summary_table)?;

    let summary = CurrentDensitySummary {
        total_files: batch.total_files(),
        succeeded: batch.successful_results.len(),
        failed: batch.failed_results.len(),
        exported_files: export.success_count(),
        total_records: export.total_records,
        summary_csv: summary_csv.display().to_string(),
        recordings: recording_labels(&selected, &cslow_mapping),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct SynthSummary {
    file: String,
    sweeps: usize,
    samples_per_sweep: usize,
}

fn cmd_synth(
    out: &Path,
    sweeps: usize,
    dt_ms: f64,
    duration_ms: f64,
    peak_time_ms: f64,
    seed: u64,
) -> Result<()> {
    if sweeps == 0 || dt_ms <= 0.0 || duration_ms <= dt_ms {
        bail!("synth needs at least one sweep and a positive time grid");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (duration_ms / dt_ms).floor() as usize;
    let mut dataset = SweepDataset::new();

    for sweep in 0..sweeps {
        let step_mv = -80.0 + 20.0 * sweep as f64;
        let peak_pa = -(100.0 + 30.0 * sweep as f64);
        let mut time = Vec::with_capacity(samples);
        let mut voltage = Vec::with_capacity(samples);
        let mut current = Vec::with_capacity(samples);
        for i in 0..samples {
            let t = i as f64 * dt_ms;
            let in_step = t >= duration_ms / 3.0 && t <= duration_ms * 2.0 / 3.0;
            let v = if in_step { step_mv } else { -80.0 };
            let leak = if in_step { step_mv * 0.25 } else { -5.0 };
            let spike = peak_pa * (-((t - peak_time_ms) / 0.1).powi(2)).exp();
            let noise = rng.gen_range(-0.5..0.5);
            time.push(t);
            voltage.push(v);
            current.push(leak + spike + noise);
        }
        dataset
            .add_sweep(sweep.to_string(), time, vec![voltage, current])
            .context("assembling synthetic dataset")?;
    }

    csv_io::write_sweep_csv(out, &dataset, &["voltage_mV", "current_pA"])?;
    let summary = SynthSummary {
        file: out.display().to_string(),
        sweeps,
        samples_per_sweep: samples,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
