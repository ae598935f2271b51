use assert_cmd::Command;
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct BatchSummary {
    total_files: usize,
    succeeded: usize,
    failed: usize,
    exported_files: usize,
    total_records: usize,
}

#[derive(Deserialize)]
struct SynthSummary {
    sweeps: usize,
    samples_per_sweep: usize,
}

fn synth(path: &Path, sweeps: usize, seed: u64) -> Result<SynthSummary, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("ephys")?;
    cmd.args([
        "synth",
        "--out",
        path.to_str().expect("utf8 path"),
        "--sweeps",
        &sweeps.to_string(),
        "--seed",
        &seed.to_string(),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn synth_then_batch_exports_csv_per_file() -> Result<(), Box<dyn Error>> {
    let data_dir = tempfile::tempdir()?;
    let out_dir = tempfile::tempdir()?;

    let rec1 = data_dir.path().join("cell_1.csv");
    let rec2 = data_dir.path().join("cell_2.csv");
    let made = synth(&rec1, 4, 7)?;
    assert_eq!(made.sweeps, 4);
    assert!(made.samples_per_sweep > 0);
    synth(&rec2, 4, 8)?;

    let mut cmd = Command::cargo_bin("ephys")?;
    cmd.args([
        "batch",
        rec1.to_str().unwrap(),
        rec2.to_str().unwrap(),
        "--out-dir",
        out_dir.path().to_str().unwrap(),
        "--range1-start",
        "110",
        "--range1-end",
        "190",
        "--x-measure",
        "average",
        "--x-channel",
        "voltage",
        "--y-measure",
        "average",
        "--y-channel",
        "current",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: BatchSummary = serde_json::from_slice(&output)?;
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.exported_files, 2);
    assert_eq!(summary.total_records, 8);

    for name in ["cell_1.csv", "cell_2.csv"] {
        let text = fs::read_to_string(out_dir.path().join(name))?;
        let header = text.lines().next().expect("header line");
        assert_eq!(header, "# Average Voltage (mV),Average Current (pA)");
        assert_eq!(text.lines().count(), 5);
    }
    // No snapping requested, so no audit file.
    assert!(!out_dir.path().join("analysis_boundaries.csv").exists());
    Ok(())
}

#[test]
fn batch_isolates_a_missing_file() -> Result<(), Box<dyn Error>> {
    let data_dir = tempfile::tempdir()?;
    let out_dir = tempfile::tempdir()?;
    let rec = data_dir.path().join("cell_1.csv");
    synth(&rec, 3, 3)?;
    let missing = data_dir.path().join("nope.csv");

    let mut cmd = Command::cargo_bin("ephys")?;
    cmd.args([
        "batch",
        rec.to_str().unwrap(),
        missing.to_str().unwrap(),
        "--out-dir",
        out_dir.path().to_str().unwrap(),
        "--range1-start",
        "110",
        "--range1-end",
        "190",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: BatchSummary = serde_json::from_slice(&output)?;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    Ok(())
}

#[test]
fn current_density_exports_suffixed_files_and_summary() -> Result<(), Box<dyn Error>> {
    let data_dir = tempfile::tempdir()?;
    let out_dir = tempfile::tempdir()?;
    let rec = data_dir.path().join("cell_1.csv");
    synth(&rec, 4, 11)?;

    let cslow_path = data_dir.path().join("cslow.toml");
    fs::write(&cslow_path, "cell_1 = 20.0\n")?;

    let mut cmd = Command::cargo_bin("ephys")?;
    cmd.args([
        "current-density",
        rec.to_str().unwrap(),
        "--cslow",
        cslow_path.to_str().unwrap(),
        "--out-dir",
        out_dir.path().to_str().unwrap(),
        "--range1-start",
        "110",
        "--range1-end",
        "190",
        "--x-measure",
        "average",
        "--x-channel",
        "voltage",
    ]);
    cmd.assert().success();

    let cd_csv = out_dir.path().join("cell_1_CD.csv");
    assert!(cd_csv.exists(), "expected {}", cd_csv.display());
    let text = fs::read_to_string(&cd_csv)?;
    let header = text.lines().next().expect("header line");
    assert!(header.contains("(pA/pF)"), "header was: {header}");

    let summary_csv = out_dir.path().join("Current_Density_Summary.csv");
    assert!(summary_csv.exists());
    let summary_text = fs::read_to_string(&summary_csv)?;
    assert!(summary_text.lines().next().unwrap().contains("cell_1 (pA/pF)"));
    Ok(())
}

#[test]
fn snap_flags_produce_boundary_audit() -> Result<(), Box<dyn Error>> {
    let data_dir = tempfile::tempdir()?;
    let out_dir = tempfile::tempdir()?;
    let rec = data_dir.path().join("cell_1.csv");
    synth(&rec, 3, 5)?;

    let mut cmd = Command::cargo_bin("ephys")?;
    cmd.args([
        "batch",
        rec.to_str().unwrap(),
        "--out-dir",
        out_dir.path().to_str().unwrap(),
        "--range1-start",
        "150",
        "--range1-end",
        "190",
        "--snap-range1-start",
    ]);
    cmd.assert().success();

    let audit = fs::read_to_string(out_dir.path().join("analysis_boundaries.csv"))?;
    let lines: Vec<&str> = audit.lines().collect();
    assert_eq!(lines[0], "File,Range1_Start,Range1_End");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("cell_1,"));
    Ok(())
}
