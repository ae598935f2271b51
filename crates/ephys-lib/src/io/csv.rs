use crate::dataset::SweepDataset;
use crate::plot::ExportTable;
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Load a sweep CSV: header `sweep,time_ms,<channel>...`, one row per
/// sample, rows grouped into sweeps by the `sweep` column in order of first
/// appearance.
pub fn load_sweep_csv(path: &Path) -> Result<SweepDataset> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(file);

    let headers = reader.headers().context("reading header")?.clone();
    if headers.len() < 3 {
        bail!(
            "{}: expected at least sweep, time_ms and one channel column, got {}",
            path.display(),
            headers.len()
        );
    }
    if headers.get(0) != Some("sweep") || headers.get(1) != Some("time_ms") {
        bail!(
            "{}: header must start with sweep,time_ms (got {:?})",
            path.display(),
            headers
        );
    }
    let channel_count = headers.len() - 2;

    // Accumulate per sweep id, preserving first-appearance order.
    let mut order: Vec<String> = Vec::new();
    let mut time: Vec<Vec<f64>> = Vec::new();
    let mut channels: Vec<Vec<Vec<f64>>> = Vec::new();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", row_idx + 2))?;
        let sweep_id = record
            .get(0)
            .map(str::to_string)
            .unwrap_or_default();
        let slot = match order.iter().position(|id| *id == sweep_id) {
            Some(slot) => slot,
            None => {
                order.push(sweep_id.clone());
                time.push(Vec::new());
                channels.push(vec![Vec::new(); channel_count]);
                order.len() - 1
            }
        };
        let t: f64 = record
            .get(1)
            .unwrap_or("")
            .parse()
            .with_context(|| format!("row {}: bad time_ms", row_idx + 2))?;
        time[slot].push(t);
        for ch in 0..channel_count {
            let v: f64 = record
                .get(ch + 2)
                .unwrap_or("")
                .parse()
                .with_context(|| format!("row {}: bad value in column {}", row_idx + 2, ch + 2))?;
            channels[slot][ch].push(v);
        }
    }

    if order.is_empty() {
        bail!("{}: no sweep rows found", path.display());
    }

    let mut dataset = SweepDataset::new();
    for (slot, id) in order.into_iter().enumerate() {
        dataset
            .add_sweep(id, std::mem::take(&mut time[slot]), std::mem::take(&mut channels[slot]))
            .with_context(|| format!("assembling {}", path.display()))?;
    }
    Ok(dataset)
}

/// Write a dataset back out in the sweep-CSV layout.
pub fn write_sweep_csv(path: &Path, dataset: &SweepDataset, channel_names: &[&str]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    let mut header = vec!["sweep".to_string(), "time_ms".to_string()];
    header.extend(channel_names.iter().map(|n| n.to_string()));
    writer.write_record(&header)?;
    let ids: Vec<String> = dataset.sweeps().map(str::to_string).collect();
    for id in ids {
        let sweep = dataset
            .get_sweep(&id)
            .context("sweep disappeared during write")?;
        for (i, t) in sweep.time_ms.iter().enumerate() {
            let mut record = vec![id.clone(), format!("{t}")];
            for channel in &sweep.channels {
                record.push(format!("{}", channel[i]));
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write an export table: a `# `-prefixed comma-joined header line, then
/// `%.6f` rows with `NaN` cells spelled `nan`. Returns the record count.
pub fn write_export_table(path: &Path, table: &ExportTable) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "# {}", table.headers.join(","))?;
    for row in &table.rows {
        let line: Vec<String> = row.iter().map(|v| format_cell(*v)).collect();
        writeln!(writer, "{}", line.join(","))?;
    }
    writer.flush()?;
    Ok(table.rows.len())
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value:.6}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn sweep_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.csv");
        let mut ds = SweepDataset::new();
        for i in 0..2 {
            let time = vec![0.0, 0.5, 1.0];
            let v = vec![-80.0, -80.0, -80.0];
            let c = vec![-5.0, -5.0 - i as f64, -5.0];
            ds.add_sweep(i.to_string(), time, vec![v, c]).unwrap();
        }
        write_sweep_csv(&path, &ds, &["voltage_mV", "current_pA"]).unwrap();
        let loaded = load_sweep_csv(&path).unwrap();
        assert_eq!(loaded.sweep_count(), 2);
        let order: Vec<&str> = loaded.sweeps().collect();
        assert_eq!(order, vec!["0", "1"]);
        let (t, c) = loaded.get_channel_vector("1", 1).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(c[1], -6.0);
    }

    #[test]
    fn rejects_missing_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "sweep,time_ms\n0,0.0\n").unwrap();
        assert!(load_sweep_csv(&path).is_err());
    }

    #[test]
    fn rejects_non_numeric_sample() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "sweep,time_ms,ch0\n0,0.0,oops\n").unwrap();
        assert!(load_sweep_csv(&path).is_err());
    }

    #[test]
    fn export_table_uses_hash_header_and_nan_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = ExportTable {
            headers: vec!["Time (s)".into(), "Average Current (pA)".into()],
            rows: vec![vec![0.0, -12.25], vec![1.0, f64::NAN]],
        };
        let records = write_export_table(&path, &table).unwrap();
        assert_eq!(records, 2);
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "# Time (s),Average Current (pA)");
        assert_eq!(lines.next().unwrap(), "0.000000,-12.250000");
        assert_eq!(lines.next().unwrap(), "1.000000,nan");
    }
}
