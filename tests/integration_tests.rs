//! End-to-end tests over a small admissions file: load, clean, aggregate,
//! filter, report and export.

use healthcare_dashboard::aggregate::{aggregate, AggregationSpec, BinConfig, Dimension, Uncached};
use healthcare_dashboard::filter::{self, FilterCriteria};
use healthcare_dashboard::types::{AgeGroup, BillType, CleanedRecord};
use healthcare_dashboard::{geocode, loader, output, preprocess, reports};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn sample_path() -> PathBuf {
    fixtures_path().join("healthcare_sample.csv")
}

fn load_sample() -> Vec<CleanedRecord> {
    let (processed, _) = loader::load_and_clean(&sample_path()).expect("fixture should load");
    processed.cleaned
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{}", std::process::id(), name))
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ============================================================================
// Loading and preprocessing
// ============================================================================

#[test]
fn test_load_reports_duplicates() {
    let (processed, report) = loader::load_and_clean(&sample_path()).unwrap();
    assert_eq!(report.total_rows, 10);
    assert_eq!(report.parse_errors, 0);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.cleaned_rows, 9);
    assert_eq!(processed.cleaned[0].name.as_deref(), Some("Bobby Jackson"));
    assert_eq!(processed.cleaned[0].hospital, "Sons And Miller");
}

#[test]
fn test_derived_columns() {
    let records = load_sample();
    let refund = records
        .iter()
        .find(|r| r.type_of_bill == BillType::Refund)
        .unwrap();
    assert_eq!(refund.dates_valid, Some(false));
    assert_eq!(refund.length_of_stay, None);

    let child = records.iter().find(|r| r.age == Some(15.0)).unwrap();
    assert_eq!(child.age_group, AgeGroup::Child);
    assert_eq!(child.billing_amount, Some(1250.0));
    assert_eq!(child.length_of_stay, Some(2));
    assert_eq!(child.extra.get("Ward").map(String::as_str), Some("East"));

    let no_age = records.iter().find(|r| r.age.is_none()).unwrap();
    assert_eq!(no_age.age_group, AgeGroup::Unknown);
    assert_eq!(no_age.type_of_bill, BillType::Unknown);
    assert_eq!(no_age.dates_valid, None);
}

#[test]
fn test_summary_report() {
    let (processed, _) = loader::load_and_clean(&sample_path()).unwrap();
    let summary = &processed.summary;
    assert_eq!(summary.missing_values["Age"], 1);
    assert_eq!(summary.missing_values["Billing Amount"], 1);
    assert_eq!(summary.missing_values["Length of Stay"], 2);
    assert_eq!(summary.missing_values["Ward"], 0);
    assert_eq!(summary.numeric_stats["Age"].count, 8);
    assert_eq!(summary.categorical_freq["Gender"]["Female"], 5);
    assert_eq!(summary.categorical_freq["Type of Bill"]["Refund"], 1);

    let json = serde_json::to_value(summary).unwrap();
    assert!(json.get("missingValues").is_some());
    assert!(json.get("numericStats").is_some());
    assert!(json.get("categoricalFreq").is_some());
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_counts_and_polarity() {
    let records = load_sample();
    let genders = aggregate(&records, &AggregationSpec::Count(Dimension::Gender));
    let rows = genders.counts();
    assert_eq!(rows[0].key, "Male");
    assert_eq!(rows[0].count, 4);
    assert_eq!(rows[0].percentage, 44.4);
    assert_eq!(rows[1].count, 5);

    let polarity = aggregate(&records, &AggregationSpec::BloodTypePolarity);
    let a = &polarity.polarity()[0];
    assert_eq!((a.group.as_str(), a.positive, a.negative), ("A", 2, 1));
}

#[test]
fn test_cost_histogram() {
    let records = load_sample();
    let result = aggregate(
        &records,
        &AggregationSpec::Histogram {
            measure: healthcare_dashboard::Measure::BillingAmount,
            bins: BinConfig::default(),
        },
    );
    let counts: Vec<usize> = result.histogram().iter().map(|b| b.count).collect();
    assert_eq!(counts, vec![0, 1, 0, 2, 3, 1]);
}

#[test]
fn test_monthly_periods_are_chronological() {
    let records = load_sample();
    let result = aggregate(&records, &AggregationSpec::MonthlyBilling);
    let periods: Vec<&str> = result.periods().iter().map(|p| p.period.as_str()).collect();
    assert_eq!(
        periods,
        vec!["2023-08", "2023-09", "2023-12", "2024-01", "2024-03", "2024-09", "2024-11"]
    );
    assert_eq!(result.periods()[3].display, "Jan '24");
    assert_eq!(result.periods()[3].count, 2);
}

// ============================================================================
// Reports
// ============================================================================

#[test]
fn test_financial_report() {
    let records = load_sample();
    let report = reports::financial(&mut Uncached(&records), &BinConfig::default());
    assert!(approx(report.kpis.total_revenue, 185_852.81));
    assert!(approx(report.kpis.total_refunds, -502.51));
    assert_eq!(report.kpis.unique_patients, 9);
    assert_eq!(report.insurance[0].provider, "Aetna");
    assert!(approx(report.insurance[0].total_amount, 94_193.42));
    let last = report.insurance.last().unwrap();
    assert_eq!(last.provider, "UnitedHealthcare");
    assert_eq!(last.refund_percentage, 100.0);
    assert_eq!(report.annual.len(), 2);
}

#[test]
fn test_geographic_markers() {
    let records = load_sample();
    let report = reports::geographic(&mut Uncached(&records));
    assert_eq!(report.hospitals.len(), 4);
    assert_eq!(report.hospitals[0].hospital, "Kim Inc");
    let sons = &report.hospitals[1];
    assert_eq!(sons.hospital, "Sons And Miller");
    assert_eq!(sons.patient_count, 3);
    assert_eq!(sons.city.as_deref(), Some("Paris"));
    assert_eq!(report.countries[0].key, "France");
}

// ============================================================================
// Filter session
// ============================================================================

#[test]
fn test_filter_session_drives_reports() {
    filter::init(load_sample(), None::<fn(&[CleanedRecord])>);

    let stats = filter::set_filter(FilterCriteria {
        country: Some("France".to_string()),
        ..FilterCriteria::default()
    })
    .unwrap();
    assert_eq!((stats.total, stats.filtered, stats.active_filter_count), (9, 3, 1));

    let overview = filter::with_session(|m| reports::overview(m)).unwrap();
    assert_eq!(overview.kpis.total_patients, 3);

    let stats = filter::set_filter(FilterCriteria {
        year: Some(2024),
        month: Some(3),
        ..FilterCriteria::default()
    })
    .unwrap();
    assert_eq!(stats.filtered, 2);

    let options = filter::with_session(|m| m.options()).unwrap();
    assert_eq!(options.years, vec![2023, 2024]);
    assert_eq!(options.countries, vec!["France", "Germany", "Italy", "Spain"]);

    let stats = filter::clear_filter().unwrap();
    assert_eq!(stats.filtered, 9);
    assert_eq!(filter::get_filtered_data().unwrap().len(), 9);
}

// ============================================================================
// Export and enrichment
// ============================================================================

#[test]
fn test_cleaned_export_reloads_identically() {
    let records = load_sample();
    let path = temp_file("cleaned_export.csv");
    output::write_records(&path, &records).unwrap();

    let (raw, _) = loader::load_records(&path).unwrap();
    let reloaded = preprocess(&raw.records);
    std::fs::remove_file(&path).ok();

    assert_eq!(reloaded.duplicates_removed, 0);
    assert_eq!(reloaded.cleaned, records);
}

#[test]
fn test_enrich_csv() {
    let path = temp_file("enriched.csv");
    let report = geocode::enrich_csv(&sample_path(), &path).unwrap();
    assert_eq!(report.rows, 10);
    assert_eq!(report.hospitals, 5);

    let (raw, _) = loader::load_records(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let kim: Vec<_> = raw
        .records
        .iter()
        .filter(|r| r["Hospital"] == "Kim Inc")
        .collect();
    assert_eq!(kim.len(), 3);
    assert_eq!(kim[0]["Latitude"], kim[2]["Latitude"]);
    assert_eq!(kim[0]["City"], geocode::assign_city("Kim Inc").name);
    assert!(raw.records.iter().all(|r| !r["Country"].is_empty()));
    assert_eq!(raw.records[7]["Discharge Date"], "");
    assert_eq!(raw.records[0]["Date of Admission"], "2024-01-31");
}
