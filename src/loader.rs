use crate::error::{DashboardError, Result};
use crate::preprocess::{preprocess, Preprocessed};
use crate::types::{RawDataset, RawRecord};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub parse_errors: usize,
    pub duplicates_removed: usize,
    pub cleaned_rows: usize,
}

/// Read a CSV file with a header row into raw string records.
pub fn load_records(path: &Path) -> Result<(RawDataset, LoadReport)> {
    info!("Loading data from {}", path.display());
    let file = File::open(path)?;
    read_records(file, &path.display().to_string())
}

/// Same as [`load_records`] over any reader; `source` only names the input in
/// errors.
pub fn read_records<R: Read>(reader: R, source: &str) -> Result<(RawDataset, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DashboardError::MissingHeader(source.to_string()));
    }

    let mut total_rows = 0usize;
    let mut parse_errors = 0usize;
    let mut records: Vec<RawRecord> = Vec::new();

    for result in rdr.records() {
        total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                debug!("Skipping row {}: {}", total_rows, e);
                parse_errors += 1;
                continue;
            }
        };
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        // Short rows leave trailing columns absent; extra cells are dropped.
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        records.push(record);
    }

    if parse_errors > 0 {
        warn!("{} rows could not be read from {}", parse_errors, source);
    }
    info!("Loaded {} records from {}", records.len(), source);

    let report = LoadReport {
        total_rows,
        parse_errors,
        ..LoadReport::default()
    };
    Ok((RawDataset { headers, records }, report))
}

/// Load the CSV and run the preprocessing pipeline over it.
pub fn load_and_clean(path: &Path) -> Result<(Preprocessed, LoadReport)> {
    let (raw, mut report) = load_records(path)?;
    let processed = preprocess(&raw.records);
    report.duplicates_removed = processed.duplicates_removed;
    report.cleaned_rows = processed.cleaned.len();
    Ok((processed, report))
}
