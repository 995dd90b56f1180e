//! CSV history ledger keyed by date.
//!
//! The ledger is a single CSV file rewritten in full on every update. Rows
//! are keyed by the date column: incoming records replace existing rows for
//! the same date and new dates are appended. Every numeric column carries its
//! arithmetic mean in the header, e.g. `Pasos (media: 8432.5)`, recomputed
//! over the merged rows on each write.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use regex::Regex;

use crate::error::{LedgerError, Result};
use crate::models::daily::{format_real, round2, COLUMNS};
use crate::models::DailyRecord;

/// Ledger filename, resolved against the current working directory.
pub const LEDGER_FILENAME: &str = "garmin_stats_history.csv";

/// Summary of a completed merge, for the run report.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// Total data rows in the rewritten file.
    pub rows_written: usize,
    /// Column label and mean, in column order, for every column that had at
    /// least one numeric value.
    pub averages: Vec<(String, f64)>,
}

/// Merges `new_records` into the ledger at `path` and rewrites it.
///
/// Existing rows whose date matches an incoming record are replaced; all
/// other rows are kept verbatim. An existing file that cannot be parsed is
/// treated as empty after a warning. With no incoming records this is a
/// no-op: the file is neither read nor written and `Ok(None)` is returned.
pub fn merge(path: &Path, new_records: &[DailyRecord]) -> Result<Option<MergeReport>> {
    if new_records.is_empty() {
        return Ok(None);
    }

    let new_dates: HashSet<String> = new_records
        .iter()
        .map(|record| record.date.format("%Y-%m-%d").to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    if path.exists() {
        match read_existing(path) {
            Ok(existing) => {
                rows.extend(
                    existing
                        .into_iter()
                        .filter(|cells| !new_dates.contains(&cells[0])),
                );
            }
            Err(err) => {
                eprintln!(
                    "Warning: could not read existing ledger ({err}). Rebuilding from the new records only."
                );
            }
        }
    }
    rows.extend(new_records.iter().map(DailyRecord::to_cells));

    let averages = column_averages(&rows);
    write_ledger(path, &rows, &averages)?;

    Ok(Some(MergeReport {
        rows_written: rows.len(),
        averages: named_averages(&averages),
    }))
}

/// Reads the existing ledger and realigns every row to the fixed column
/// order. Header labels are matched with any average annotation stripped, so
/// files written by previous runs parse cleanly.
fn read_existing(path: &Path) -> Result<Vec<Vec<String>>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let positions = column_positions(reader.headers()?)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells = positions
            .iter()
            .map(|&idx| record.get(idx).unwrap_or("").to_string())
            .collect();
        rows.push(cells);
    }
    Ok(rows)
}

/// Index of each fixed column inside the file's header row. Columns the file
/// carries beyond the fixed set are ignored; a missing fixed column makes the
/// file unparseable.
fn column_positions(headers: &csv::StringRecord) -> Result<Vec<usize>> {
    let stripped: Vec<String> = headers.iter().map(strip_annotation).collect();

    COLUMNS
        .iter()
        .map(|&label| {
            stripped.iter().position(|header| header == label).ok_or_else(|| {
                LedgerError::LedgerFormat(format!("missing column '{label}' in header"))
            })
        })
        .collect()
}

/// Strips a trailing `" (media: …)"` annotation from a header label, along
/// with any UTF-8 BOM left by other spreadsheet tools.
fn strip_annotation(label: &str) -> String {
    let annotation = Regex::new(r"\s*\(media:[^)]*\)\s*$").unwrap();
    annotation
        .replace(label.trim_start_matches('\u{feff}'), "")
        .to_string()
}

/// Arithmetic mean of each column after the date, rounded to two decimals.
/// Cells that do not parse as numbers (the heart-rate sentinel, blanks) are
/// excluded; a column with no numeric cells has no mean.
fn column_averages(rows: &[Vec<String>]) -> Vec<Option<f64>> {
    (1..COLUMNS.len())
        .map(|col| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|cells| cells.get(col))
                .filter_map(|cell| cell.parse::<f64>().ok())
                .collect();
            if values.is_empty() {
                None
            } else {
                Some(round2(values.iter().sum::<f64>() / values.len() as f64))
            }
        })
        .collect()
}

/// Rewrites the whole file: annotated header first, then every row in fixed
/// column order. The header line is written raw; no fixed label or average
/// ever needs quoting.
fn write_ledger(path: &Path, rows: &[Vec<String>], averages: &[Option<f64>]) -> Result<()> {
    let mut labels = vec![COLUMNS[0].to_string()];
    for (idx, label) in COLUMNS.iter().enumerate().skip(1) {
        labels.push(match averages[idx - 1] {
            Some(avg) => format!("{} (media: {})", label, format_real(avg)),
            None => (*label).to_string(),
        });
    }

    let mut file = File::create(path)?;
    writeln!(file, "{}", labels.join(","))?;

    let mut writer = csv::Writer::from_writer(file);
    for cells in rows {
        writer.write_record(cells)?;
    }
    writer.flush()?;
    Ok(())
}

fn named_averages(averages: &[Option<f64>]) -> Vec<(String, f64)> {
    COLUMNS
        .iter()
        .skip(1)
        .zip(averages)
        .filter_map(|(label, avg)| avg.map(|value| ((*label).to_string(), value)))
        .collect()
}
