//! Cleaning pipeline: coercion, name normalization, derived features,
//! deduplication and the summary report.
//!
//! Nothing in here fails. A cell that does not parse becomes null (numbers,
//! dates) or `"Unknown"` (categorical text).

use crate::types::{columns, AgeGroup, BillType, CleanedRecord, RawRecord, SummaryReport, UNKNOWN};
use crate::util::{ceil_days, normalize_name, parse_datetime_safe, parse_f64_safe, stats};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Columns summarized in `numericStats`.
pub const NUMERIC_COLUMNS: &[&str] = &[
    columns::AGE,
    columns::BILLING_AMOUNT,
    columns::ROOM_NUMBER,
    columns::LENGTH_OF_STAY,
];

/// Columns tallied in `categoricalFreq`.
pub const CATEGORICAL_COLUMNS: &[&str] = &[
    columns::GENDER,
    columns::BLOOD_TYPE,
    columns::MEDICAL_CONDITION,
    columns::ADMISSION_TYPE,
    columns::AGE_GROUP,
    columns::INSURANCE_PROVIDER,
    columns::TEST_RESULTS,
    columns::TYPE_OF_BILL,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessed {
    pub cleaned: Vec<CleanedRecord>,
    pub summary: SummaryReport,
    /// Rows dropped because an identical record was seen earlier.
    pub duplicates_removed: usize,
}

pub fn preprocess(raw: &[RawRecord]) -> Preprocessed {
    debug!("Coercing {} raw records", raw.len());
    let coerced: Vec<CleanedRecord> = raw.iter().map(coerce_record).collect();

    let before = coerced.len();
    let cleaned = dedup(coerced);
    let duplicates_removed = before - cleaned.len();
    if duplicates_removed > 0 {
        debug!("Dropped {} duplicate records", duplicates_removed);
    }

    let summary = summarize(&cleaned);
    info!(
        "Preprocessed {} records ({} duplicates removed)",
        cleaned.len(),
        duplicates_removed
    );
    Preprocessed {
        cleaned,
        summary,
        duplicates_removed,
    }
}

fn text<'a>(raw: &'a RawRecord, col: &str) -> Option<&'a str> {
    raw.get(col).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn category(raw: &RawRecord, col: &str) -> String {
    text(raw, col).unwrap_or(UNKNOWN).to_string()
}

fn number(raw: &RawRecord, col: &str) -> Option<f64> {
    parse_f64_safe(raw.get(col).map(String::as_str))
}

/// Turn one raw row into a typed record: coercion, then name normalization,
/// then the derived features. Applying it to [`CleanedRecord::to_raw`] of its
/// own output gives the same record back.
pub fn coerce_record(raw: &RawRecord) -> CleanedRecord {
    use columns::*;

    let age = number(raw, AGE);
    let billing_amount = number(raw, BILLING_AMOUNT);
    let date_of_admission = parse_datetime_safe(raw.get(DATE_OF_ADMISSION).map(String::as_str));
    let discharge_date = parse_datetime_safe(raw.get(DISCHARGE_DATE).map(String::as_str));

    let dates_valid = match (date_of_admission, discharge_date) {
        (Some(admit), Some(discharge)) => Some(discharge > admit),
        _ => None,
    };
    let length_of_stay = match (dates_valid, date_of_admission, discharge_date) {
        (Some(true), Some(admit), Some(discharge)) => Some(ceil_days(admit, discharge)),
        _ => None,
    };

    let extra = raw
        .iter()
        .filter(|(k, _)| !columns::is_recognized(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    CleanedRecord {
        name: text(raw, NAME).map(normalize_name),
        age,
        gender: category(raw, GENDER),
        blood_type: category(raw, BLOOD_TYPE),
        medical_condition: category(raw, MEDICAL_CONDITION),
        date_of_admission,
        doctor: normalize_name(&category(raw, DOCTOR)),
        hospital: normalize_name(&category(raw, HOSPITAL)),
        insurance_provider: category(raw, INSURANCE_PROVIDER),
        billing_amount,
        room_number: number(raw, ROOM_NUMBER),
        admission_type: category(raw, ADMISSION_TYPE),
        discharge_date,
        medication: text(raw, MEDICATION).map(str::to_string),
        test_results: text(raw, TEST_RESULTS).map(str::to_string),
        city: text(raw, CITY).map(str::to_string),
        country: text(raw, COUNTRY).map(str::to_string),
        latitude: number(raw, LATITUDE),
        longitude: number(raw, LONGITUDE),
        type_of_bill: BillType::from_amount(billing_amount),
        dates_valid,
        length_of_stay,
        age_group: AgeGroup::from_age(age),
        extra,
    }
}

/// Key shared by records that are identical in every field: each column
/// name with its canonical cell text, ordered by column name.
pub fn dedup_key(record: &CleanedRecord) -> Vec<(String, Option<String>)> {
    let mut cells = record.cells();
    cells.sort_by(|a, b| a.0.cmp(&b.0));
    cells
}

/// Keep the first record seen for each key, preserving order.
pub fn dedup(records: Vec<CleanedRecord>) -> Vec<CleanedRecord> {
    let mut seen: HashSet<Vec<(String, Option<String>)>> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert(dedup_key(r)))
        .collect()
}

fn numeric_value(record: &CleanedRecord, col: &str) -> Option<f64> {
    match col {
        columns::AGE => record.age,
        columns::BILLING_AMOUNT => record.billing_amount,
        columns::ROOM_NUMBER => record.room_number,
        columns::LENGTH_OF_STAY => record.length_of_stay.map(|d| d as f64),
        _ => None,
    }
}

fn categorical_value<'a>(record: &'a CleanedRecord, col: &str) -> Option<&'a str> {
    match col {
        columns::GENDER => Some(&record.gender),
        columns::BLOOD_TYPE => Some(&record.blood_type),
        columns::MEDICAL_CONDITION => Some(&record.medical_condition),
        columns::ADMISSION_TYPE => Some(&record.admission_type),
        columns::AGE_GROUP => Some(record.age_group.as_str()),
        columns::INSURANCE_PROVIDER => Some(&record.insurance_provider),
        columns::TEST_RESULTS => record.test_results.as_deref(),
        columns::TYPE_OF_BILL => Some(record.type_of_bill.as_str()),
        _ => None,
    }
}

/// Missing-value counts, numeric statistics and category frequencies.
pub fn summarize(records: &[CleanedRecord]) -> SummaryReport {
    if records.is_empty() {
        return SummaryReport::default();
    }

    let mut missing_values: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        for (col, value) in record.cells() {
            let missing = value.map_or(true, |v| v.is_empty());
            *missing_values.entry(col).or_insert(0) += usize::from(missing);
        }
    }
    // Pass-through columns absent from some rows are missing there too.
    let extra_cols: BTreeSet<&String> = records.iter().flat_map(|r| r.extra.keys()).collect();
    for col in extra_cols {
        let absent = records.iter().filter(|r| !r.extra.contains_key(col)).count();
        *missing_values.entry(col.clone()).or_insert(0) += absent;
    }

    let numeric_stats = NUMERIC_COLUMNS
        .iter()
        .filter_map(|col| {
            stats(records.iter().map(|r| numeric_value(r, col))).map(|s| (col.to_string(), s))
        })
        .collect();

    let categorical_freq = CATEGORICAL_COLUMNS
        .iter()
        .map(|col| {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for r in records {
                let value = categorical_value(r, col).unwrap_or(UNKNOWN);
                *counts.entry(value.to_string()).or_insert(0) += 1;
            }
            (col.to_string(), counts)
        })
        .collect();

    SummaryReport {
        missing_values,
        numeric_stats,
        categorical_freq,
    }
}

/// Observed value kinds per column, e.g. `"number | null"`.
pub fn column_types(records: &[CleanedRecord]) -> BTreeMap<String, String> {
    let mut kinds: BTreeMap<String, BTreeSet<&'static str>> = BTreeMap::new();
    for record in records {
        for (col, value) in record.cells() {
            kinds.entry(col.clone()).or_default().insert(cell_kind(&col, value.is_some()));
        }
    }
    kinds
        .into_iter()
        .map(|(col, set)| (col, set.into_iter().collect::<Vec<_>>().join(" | ")))
        .collect()
}

fn cell_kind(col: &str, present: bool) -> &'static str {
    if !present {
        return "null";
    }
    match col {
        columns::AGE
        | columns::BILLING_AMOUNT
        | columns::ROOM_NUMBER
        | columns::LATITUDE
        | columns::LONGITUDE
        | columns::LENGTH_OF_STAY => "number",
        columns::DATE_OF_ADMISSION | columns::DISCHARGE_DATE => "date",
        columns::DATES_VALID => "boolean",
        _ => "string",
    }
}
