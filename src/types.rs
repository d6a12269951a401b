use crate::util::{format_iso, format_opt};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tabled::Tabled;

/// Column names as they appear in the CSV header.
pub mod columns {
    pub const NAME: &str = "Name";
    pub const AGE: &str = "Age";
    pub const GENDER: &str = "Gender";
    pub const BLOOD_TYPE: &str = "Blood Type";
    pub const MEDICAL_CONDITION: &str = "Medical Condition";
    pub const DATE_OF_ADMISSION: &str = "Date of Admission";
    pub const DOCTOR: &str = "Doctor";
    pub const HOSPITAL: &str = "Hospital";
    pub const INSURANCE_PROVIDER: &str = "Insurance Provider";
    pub const BILLING_AMOUNT: &str = "Billing Amount";
    pub const ROOM_NUMBER: &str = "Room Number";
    pub const ADMISSION_TYPE: &str = "Admission Type";
    pub const DISCHARGE_DATE: &str = "Discharge Date";
    pub const MEDICATION: &str = "Medication";
    pub const TEST_RESULTS: &str = "Test Results";
    pub const CITY: &str = "City";
    pub const COUNTRY: &str = "Country";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";

    pub const TYPE_OF_BILL: &str = "Type of Bill";
    pub const DATES_VALID: &str = "Dates Valid";
    pub const LENGTH_OF_STAY: &str = "Length of Stay";
    pub const AGE_GROUP: &str = "Age Group";

    /// Columns read from the source file, in export order.
    pub const SOURCE: &[&str] = &[
        NAME,
        AGE,
        GENDER,
        BLOOD_TYPE,
        MEDICAL_CONDITION,
        DATE_OF_ADMISSION,
        DOCTOR,
        HOSPITAL,
        INSURANCE_PROVIDER,
        BILLING_AMOUNT,
        ROOM_NUMBER,
        ADMISSION_TYPE,
        DISCHARGE_DATE,
        MEDICATION,
        TEST_RESULTS,
        CITY,
        COUNTRY,
        LATITUDE,
        LONGITUDE,
    ];

    /// Columns computed by preprocessing. Input values for these are ignored.
    pub const DERIVED: &[&str] = &[TYPE_OF_BILL, DATES_VALID, LENGTH_OF_STAY, AGE_GROUP];

    pub fn is_recognized(name: &str) -> bool {
        SOURCE.contains(&name) || DERIVED.contains(&name)
    }
}

pub const UNKNOWN: &str = "Unknown";

/// One CSV row: column name to the cell text as parsed.
pub type RawRecord = HashMap<String, String>;

/// Parsed CSV file, keeping the header order for re-export.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgeGroup {
    #[serde(rename = "0-18")]
    Child,
    #[serde(rename = "19-40")]
    Adult,
    #[serde(rename = "41-65")]
    MiddleAged,
    #[serde(rename = "65+")]
    Senior,
    Unknown,
}

impl AgeGroup {
    /// Display order of the known groups; `Unknown` is left out.
    pub const DOMAIN: [AgeGroup; 4] = [
        AgeGroup::Child,
        AgeGroup::Adult,
        AgeGroup::MiddleAged,
        AgeGroup::Senior,
    ];

    /// Inclusive upper bounds 18, 40 and 65.
    pub fn from_age(age: Option<f64>) -> Self {
        match age {
            None => AgeGroup::Unknown,
            Some(a) if a <= 18.0 => AgeGroup::Child,
            Some(a) if a <= 40.0 => AgeGroup::Adult,
            Some(a) if a <= 65.0 => AgeGroup::MiddleAged,
            Some(_) => AgeGroup::Senior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "0-18",
            AgeGroup::Adult => "19-40",
            AgeGroup::MiddleAged => "41-65",
            AgeGroup::Senior => "65+",
            AgeGroup::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BillType {
    Normal,
    Refund,
    Unknown,
}

impl BillType {
    pub fn from_amount(amount: Option<f64>) -> Self {
        match amount {
            None => BillType::Unknown,
            Some(a) if a < 0.0 => BillType::Refund,
            Some(_) => BillType::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::Normal => "Normal",
            BillType::Refund => "Refund",
            BillType::Unknown => UNKNOWN,
        }
    }

    /// Case-insensitive parse of a user-supplied bill type.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(BillType::Normal),
            "refund" => Some(BillType::Refund),
            "unknown" => Some(BillType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for BillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, normalized patient admission.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub name: Option<String>,
    pub age: Option<f64>,
    pub gender: String,
    pub blood_type: String,
    pub medical_condition: String,
    pub date_of_admission: Option<NaiveDateTime>,
    pub doctor: String,
    pub hospital: String,
    pub insurance_provider: String,
    pub billing_amount: Option<f64>,
    pub room_number: Option<f64>,
    pub admission_type: String,
    pub discharge_date: Option<NaiveDateTime>,
    pub medication: Option<String>,
    pub test_results: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub type_of_bill: BillType,
    pub dates_valid: Option<bool>,
    pub length_of_stay: Option<i64>,
    pub age_group: AgeGroup,
    /// Columns outside the recognized set, carried through untouched.
    pub extra: BTreeMap<String, String>,
}

impl CleanedRecord {
    /// Every column with its canonical text form; `None` means null.
    ///
    /// Numbers use their shortest round-trip representation and dates use
    /// [`crate::util::ISO_DATETIME`], so the output re-parses to the same
    /// record.
    pub fn cells(&self) -> Vec<(String, Option<String>)> {
        use columns::*;
        let num = |v: Option<f64>| v.map(|v| v.to_string());
        let date = |v: &Option<NaiveDateTime>| v.as_ref().map(format_iso);
        let mut cells = vec![
            (NAME.to_string(), self.name.clone()),
            (AGE.to_string(), num(self.age)),
            (GENDER.to_string(), Some(self.gender.clone())),
            (BLOOD_TYPE.to_string(), Some(self.blood_type.clone())),
            (MEDICAL_CONDITION.to_string(), Some(self.medical_condition.clone())),
            (DATE_OF_ADMISSION.to_string(), date(&self.date_of_admission)),
            (DOCTOR.to_string(), Some(self.doctor.clone())),
            (HOSPITAL.to_string(), Some(self.hospital.clone())),
            (INSURANCE_PROVIDER.to_string(), Some(self.insurance_provider.clone())),
            (BILLING_AMOUNT.to_string(), num(self.billing_amount)),
            (ROOM_NUMBER.to_string(), num(self.room_number)),
            (ADMISSION_TYPE.to_string(), Some(self.admission_type.clone())),
            (DISCHARGE_DATE.to_string(), date(&self.discharge_date)),
            (MEDICATION.to_string(), self.medication.clone()),
            (TEST_RESULTS.to_string(), self.test_results.clone()),
            (CITY.to_string(), self.city.clone()),
            (COUNTRY.to_string(), self.country.clone()),
            (LATITUDE.to_string(), num(self.latitude)),
            (LONGITUDE.to_string(), num(self.longitude)),
            (TYPE_OF_BILL.to_string(), Some(self.type_of_bill.to_string())),
            (DATES_VALID.to_string(), self.dates_valid.map(|b| b.to_string())),
            (LENGTH_OF_STAY.to_string(), self.length_of_stay.map(|d| d.to_string())),
            (AGE_GROUP.to_string(), Some(self.age_group.to_string())),
        ];
        cells.extend(
            self.extra
                .iter()
                .map(|(k, v)| (k.clone(), Some(v.clone()))),
        );
        cells
    }

    /// Back to a raw row, dropping null cells.
    pub fn to_raw(&self) -> RawRecord {
        self.cells()
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }

    pub fn admission_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.date_of_admission.map(|d| d.year())
    }

    pub fn admission_month(&self) -> Option<u32> {
        use chrono::Datelike;
        self.date_of_admission.map(|d| d.month())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub missing_values: BTreeMap<String, usize>,
    pub numeric_stats: BTreeMap<String, NumericStats>,
    pub categorical_freq: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct CountRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Percentage")]
    pub percentage: f64,
}

/// Wide pivot: one row per primary key, one count per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossTab {
    pub primary: String,
    pub secondary: String,
    pub columns: Vec<String>,
    pub rows: Vec<CrossTabRow>,
}

impl CrossTab {
    pub fn count(&self, row: &str, column: &str) -> Option<usize> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.key == row)
            .and_then(|r| r.counts.get(col).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTabRow {
    pub key: String,
    pub counts: Vec<usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PolarityRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Positive")]
    pub positive: usize,
    #[tabled(rename = "Negative")]
    pub negative: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct MeanRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Mean", display_with = "display_mean")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PairMeanRow {
    #[tabled(rename = "Primary")]
    pub primary: String,
    #[tabled(rename = "Secondary")]
    pub secondary: String,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Mean", display_with = "display_mean")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct PeriodRow {
    #[tabled(rename = "Month")]
    pub period: String,
    #[tabled(rename = "Label")]
    pub display: String,
    #[tabled(skip)]
    pub year: i32,
    #[tabled(skip)]
    pub month: u32,
    #[tabled(rename = "Total", display_with = "display_amount")]
    pub total: f64,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Mean", display_with = "display_mean")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTrendRow {
    pub year: i32,
    pub months: [f64; 12],
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct CountryYearRow {
    #[tabled(rename = "Year")]
    pub year: i32,
    #[tabled(rename = "Country")]
    pub country: String,
    #[tabled(rename = "Amount", display_with = "display_amount")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct HistogramRow {
    #[tabled(rename = "Range")]
    pub range: String,
    #[tabled(skip)]
    pub lower: Option<i64>,
    #[tabled(skip)]
    pub upper: Option<i64>,
    #[tabled(rename = "Count")]
    pub count: usize,
    #[tabled(rename = "Percentage")]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct InsuranceRow {
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "AvgAmount", display_with = "display_mean")]
    pub avg_amount: Option<f64>,
    #[tabled(rename = "TotalAmount", display_with = "display_amount")]
    pub total_amount: f64,
    #[tabled(rename = "Patients")]
    pub patient_count: usize,
    #[tabled(rename = "Refunds")]
    pub refund_count: usize,
    #[tabled(rename = "RefundPct")]
    pub refund_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BillingTier {
    Low,
    Medium,
    High,
}

impl BillingTier {
    pub fn from_avg(avg: Option<f64>) -> Self {
        match avg {
            Some(a) if a > 25_000.0 => BillingTier::High,
            Some(a) if a > 15_000.0 => BillingTier::Medium,
            _ => BillingTier::Low,
        }
    }
}

impl fmt::Display for BillingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingTier::Low => "Low",
            BillingTier::Medium => "Medium",
            BillingTier::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct HospitalMarker {
    #[tabled(rename = "Hospital")]
    pub hospital: String,
    #[tabled(rename = "City", display_with = "display_text")]
    pub city: Option<String>,
    #[tabled(rename = "Country", display_with = "display_text")]
    pub country: Option<String>,
    #[tabled(rename = "Lat", display_with = "display_coord")]
    pub latitude: Option<f64>,
    #[tabled(rename = "Lon", display_with = "display_coord")]
    pub longitude: Option<f64>,
    #[tabled(rename = "Patients")]
    pub patient_count: usize,
    #[tabled(rename = "AvgBilling", display_with = "display_mean")]
    pub avg_billing: Option<f64>,
    #[tabled(rename = "Tier")]
    pub tier: BillingTier,
    #[tabled(skip)]
    pub marker_size: f64,
    #[tabled(rename = "Dominant", display_with = "display_text")]
    pub dominant_test_result: Option<String>,
}

fn display_mean(v: &Option<f64>) -> String {
    format_opt(*v, 2)
}

fn display_amount(v: &f64) -> String {
    crate::util::format_number(*v, 2)
}

fn display_coord(v: &Option<f64>) -> String {
    v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
}

fn display_text(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "-".to_string())
}
