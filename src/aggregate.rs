//! Group-by engine behind every chart.
//!
//! Each building block takes the records it should describe (already
//! filtered, if a filter is active) and returns plain rows. Percentages are
//! always relative to `records.len()` of that call.

use crate::types::{
    columns, CleanedRecord, CountRow, CountryYearRow, CrossTab, CrossTabRow, HistogramRow, MeanRow,
    PairMeanRow, PeriodRow, PolarityRow, YearTrendRow, UNKNOWN,
};
use crate::util::{average, percentage};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Base blood types, each split into `+` and `-`.
pub const BLOOD_GROUPS: [&str; 4] = ["A", "B", "AB", "O"];

const GENDERS: &[&str] = &["Male", "Female"];
const AGE_GROUPS: &[&str] = &["0-18", "19-40", "41-65", "65+"];
const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
const ADMISSION_TYPES: &[&str] = &["Emergency", "Urgent", "Elective"];
const TEST_RESULTS: &[&str] = &["Normal", "Abnormal", "Inconclusive"];
const BILL_TYPES: &[&str] = &["Normal", "Refund"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Gender,
    AgeGroup,
    BloodType,
    MedicalCondition,
    AdmissionType,
    InsuranceProvider,
    TestResults,
    TypeOfBill,
    Country,
    City,
    Hospital,
}

impl Dimension {
    pub fn column(self) -> &'static str {
        match self {
            Dimension::Gender => columns::GENDER,
            Dimension::AgeGroup => columns::AGE_GROUP,
            Dimension::BloodType => columns::BLOOD_TYPE,
            Dimension::MedicalCondition => columns::MEDICAL_CONDITION,
            Dimension::AdmissionType => columns::ADMISSION_TYPE,
            Dimension::InsuranceProvider => columns::INSURANCE_PROVIDER,
            Dimension::TestResults => columns::TEST_RESULTS,
            Dimension::TypeOfBill => columns::TYPE_OF_BILL,
            Dimension::Country => columns::COUNTRY,
            Dimension::City => columns::CITY,
            Dimension::Hospital => columns::HOSPITAL,
        }
    }

    /// Grouping key of a record. Null cells group under `"Unknown"`.
    pub fn value<'a>(self, r: &'a CleanedRecord) -> &'a str {
        match self {
            Dimension::Gender => &r.gender,
            Dimension::AgeGroup => r.age_group.as_str(),
            Dimension::BloodType => &r.blood_type,
            Dimension::MedicalCondition => &r.medical_condition,
            Dimension::AdmissionType => &r.admission_type,
            Dimension::InsuranceProvider => &r.insurance_provider,
            Dimension::TestResults => r.test_results.as_deref().unwrap_or(UNKNOWN),
            Dimension::TypeOfBill => r.type_of_bill.as_str(),
            Dimension::Country => r.country.as_deref().unwrap_or(UNKNOWN),
            Dimension::City => r.city.as_deref().unwrap_or(UNKNOWN),
            Dimension::Hospital => &r.hospital,
        }
    }

    /// Natural ordering for dimensions with a known domain. Open-ended
    /// dimensions return `None` and are ordered by descending count.
    pub fn fixed_domain(self) -> Option<&'static [&'static str]> {
        match self {
            Dimension::Gender => Some(GENDERS),
            Dimension::AgeGroup => Some(AGE_GROUPS),
            Dimension::BloodType => Some(BLOOD_TYPES),
            Dimension::AdmissionType => Some(ADMISSION_TYPES),
            Dimension::TestResults => Some(TEST_RESULTS),
            Dimension::TypeOfBill => Some(BILL_TYPES),
            Dimension::MedicalCondition
            | Dimension::InsuranceProvider
            | Dimension::Country
            | Dimension::City
            | Dimension::Hospital => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    BillingAmount,
    LengthOfStay,
    Age,
}

impl Measure {
    pub fn value(self, r: &CleanedRecord) -> Option<f64> {
        match self {
            Measure::BillingAmount => r.billing_amount,
            Measure::LengthOfStay => r.length_of_stay.map(|d| d as f64),
            Measure::Age => r.age,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Measure::BillingAmount => columns::BILLING_AMOUNT,
            Measure::LengthOfStay => columns::LENGTH_OF_STAY,
            Measure::Age => columns::AGE,
        }
    }
}

/// Histogram bin edges. Bins are half-open `[edges[i], edges[i + 1])`.
///
/// Values below the first edge or at/above the last are dropped unless the
/// matching `include_*` flag adds an overflow bin for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinConfig {
    pub edges: Vec<i64>,
    pub include_below: bool,
    pub include_above: bool,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            edges: vec![0, 1_000, 5_000, 10_000, 20_000, 50_000, 100_000],
            include_below: false,
            include_above: false,
        }
    }
}

/// What a chart asks the engine for. Used as the cache key, so it must stay
/// `Hash + Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationSpec {
    Count(Dimension),
    CrossTab {
        primary: Dimension,
        secondary: Dimension,
    },
    BloodTypePolarity,
    MeanBy {
        group: Dimension,
        measure: Measure,
    },
    MeanByPair {
        primary: Dimension,
        secondary: Dimension,
        measure: Measure,
    },
    MonthlyBilling,
    AnnualTrend,
    CountryYearBilling,
    Histogram {
        measure: Measure,
        bins: BinConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "rows")]
pub enum AggregationResult {
    Counts(Vec<CountRow>),
    CrossTab(CrossTab),
    Polarity(Vec<PolarityRow>),
    Means(Vec<MeanRow>),
    PairMeans(Vec<PairMeanRow>),
    Periods(Vec<PeriodRow>),
    YearTrends(Vec<YearTrendRow>),
    CountryYears(Vec<CountryYearRow>),
    Histogram(Vec<HistogramRow>),
}

impl AggregationResult {
    pub fn counts(&self) -> &[CountRow] {
        match self {
            AggregationResult::Counts(rows) => rows,
            _ => &[],
        }
    }

    pub fn cross_tab(&self) -> Option<&CrossTab> {
        match self {
            AggregationResult::CrossTab(t) => Some(t),
            _ => None,
        }
    }

    pub fn polarity(&self) -> &[PolarityRow] {
        match self {
            AggregationResult::Polarity(rows) => rows,
            _ => &[],
        }
    }

    pub fn means(&self) -> &[MeanRow] {
        match self {
            AggregationResult::Means(rows) => rows,
            _ => &[],
        }
    }

    pub fn pair_means(&self) -> &[PairMeanRow] {
        match self {
            AggregationResult::PairMeans(rows) => rows,
            _ => &[],
        }
    }

    pub fn periods(&self) -> &[PeriodRow] {
        match self {
            AggregationResult::Periods(rows) => rows,
            _ => &[],
        }
    }

    pub fn year_trends(&self) -> &[YearTrendRow] {
        match self {
            AggregationResult::YearTrends(rows) => rows,
            _ => &[],
        }
    }

    pub fn country_years(&self) -> &[CountryYearRow] {
        match self {
            AggregationResult::CountryYears(rows) => rows,
            _ => &[],
        }
    }

    pub fn histogram(&self) -> &[HistogramRow] {
        match self {
            AggregationResult::Histogram(rows) => rows,
            _ => &[],
        }
    }
}

pub fn aggregate(records: &[CleanedRecord], spec: &AggregationSpec) -> AggregationResult {
    match spec {
        AggregationSpec::Count(dim) => AggregationResult::Counts(count_by(records, *dim)),
        AggregationSpec::CrossTab { primary, secondary } => {
            AggregationResult::CrossTab(cross_tab(records, *primary, *secondary))
        }
        AggregationSpec::BloodTypePolarity => {
            AggregationResult::Polarity(blood_type_polarity(records))
        }
        AggregationSpec::MeanBy { group, measure } => {
            AggregationResult::Means(mean_by(records, *group, *measure))
        }
        AggregationSpec::MeanByPair {
            primary,
            secondary,
            measure,
        } => AggregationResult::PairMeans(mean_by_pair(records, *primary, *secondary, *measure)),
        AggregationSpec::MonthlyBilling => AggregationResult::Periods(monthly_billing(records)),
        AggregationSpec::AnnualTrend => AggregationResult::YearTrends(annual_trend(records)),
        AggregationSpec::CountryYearBilling => {
            AggregationResult::CountryYears(country_year_billing(records))
        }
        AggregationSpec::Histogram { measure, bins } => {
            AggregationResult::Histogram(histogram(records, *measure, bins))
        }
    }
}

fn tally(records: &[CleanedRecord], dim: Dimension) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *counts.entry(dim.value(r)).or_insert(0) += 1;
    }
    counts
}

/// Keys in display order: the fixed domain first (even when a value was
/// never seen), then every other observed key by descending count, ties
/// alphabetical.
fn order_keys(dim: Dimension, counts: &HashMap<&str, usize>) -> Vec<String> {
    let domain = dim.fixed_domain().unwrap_or(&[]);
    let mut rest: Vec<(&str, usize)> = counts
        .iter()
        .filter(|(k, _)| !domain.contains(*k))
        .map(|(k, v)| (*k, *v))
        .collect();
    rest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    domain
        .iter()
        .copied()
        .chain(rest.into_iter().map(|(k, _)| k))
        .map(str::to_string)
        .collect()
}

pub fn count_by(records: &[CleanedRecord], dim: Dimension) -> Vec<CountRow> {
    let counts = tally(records, dim);
    order_keys(dim, &counts)
        .into_iter()
        .map(|key| {
            let count = counts.get(key.as_str()).copied().unwrap_or(0);
            CountRow {
                percentage: percentage(count, records.len()),
                key,
                count,
            }
        })
        .collect()
}

/// Records grouped by `dim`, in the same key order as [`count_by`]. Keys
/// with no records are left out.
pub fn group_by(records: &[CleanedRecord], dim: Dimension) -> Vec<(String, Vec<&CleanedRecord>)> {
    let counts = tally(records, dim);
    let mut groups: HashMap<&str, Vec<&CleanedRecord>> = HashMap::new();
    for r in records {
        groups.entry(dim.value(r)).or_default().push(r);
    }
    order_keys(dim, &counts)
        .into_iter()
        .filter_map(|key| groups.remove(key.as_str()).map(|rows| (key, rows)))
        .collect()
}

pub fn cross_tab(records: &[CleanedRecord], primary: Dimension, secondary: Dimension) -> CrossTab {
    let columns = order_keys(secondary, &tally(records, secondary));
    let keys = order_keys(primary, &tally(records, primary));

    let mut cells: HashMap<(&str, &str), usize> = HashMap::new();
    for r in records {
        *cells
            .entry((primary.value(r), secondary.value(r)))
            .or_insert(0) += 1;
    }

    let rows = keys
        .into_iter()
        .map(|key| {
            let counts: Vec<usize> = columns
                .iter()
                .map(|col| {
                    cells
                        .get(&(key.as_str(), col.as_str()))
                        .copied()
                        .unwrap_or(0)
                })
                .collect();
            CrossTabRow {
                total: counts.iter().sum(),
                key,
                counts,
            }
        })
        .collect();

    CrossTab {
        primary: primary.column().to_string(),
        secondary: secondary.column().to_string(),
        columns,
        rows,
    }
}

pub fn blood_type_polarity(records: &[CleanedRecord]) -> Vec<PolarityRow> {
    BLOOD_GROUPS
        .iter()
        .map(|group| {
            let positive = format!("{}+", group);
            let negative = format!("{}-", group);
            PolarityRow {
                group: group.to_string(),
                positive: records.iter().filter(|r| r.blood_type == positive).count(),
                negative: records.iter().filter(|r| r.blood_type == negative).count(),
            }
        })
        .collect()
}

/// Mean of `measure` per group, over the non-null values in each group.
///
/// Fixed domains keep their natural order; open domains are sorted by
/// descending mean with empty means last.
pub fn mean_by(records: &[CleanedRecord], group: Dimension, measure: Measure) -> Vec<MeanRow> {
    let counts = tally(records, group);
    let mut values: HashMap<&str, Vec<f64>> = HashMap::new();
    for r in records {
        if let Some(v) = measure.value(r) {
            values.entry(group.value(r)).or_default().push(v);
        }
    }

    let mut rows: Vec<MeanRow> = order_keys(group, &counts)
        .into_iter()
        .map(|key| MeanRow {
            count: counts.get(key.as_str()).copied().unwrap_or(0),
            mean: values.get(key.as_str()).and_then(|v| average(v)),
            key,
        })
        .collect();

    if group.fixed_domain().is_none() {
        rows.sort_by(|a, b| match (a.mean, b.mean) {
            (Some(x), Some(y)) => y
                .partial_cmp(&x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.key.cmp(&b.key),
        });
    }
    rows
}

/// Mean of `measure` for every (primary, secondary) combination, both axes
/// in display order.
pub fn mean_by_pair(
    records: &[CleanedRecord],
    primary: Dimension,
    secondary: Dimension,
    measure: Measure,
) -> Vec<PairMeanRow> {
    let primary_keys = order_keys(primary, &tally(records, primary));
    let secondary_keys = order_keys(secondary, &tally(records, secondary));

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    let mut values: HashMap<(&str, &str), Vec<f64>> = HashMap::new();
    for r in records {
        let key = (primary.value(r), secondary.value(r));
        *counts.entry(key).or_insert(0) += 1;
        if let Some(v) = measure.value(r) {
            values.entry(key).or_default().push(v);
        }
    }

    let mut rows = Vec::with_capacity(primary_keys.len() * secondary_keys.len());
    for p in &primary_keys {
        for s in &secondary_keys {
            let key = (p.as_str(), s.as_str());
            rows.push(PairMeanRow {
                primary: p.clone(),
                secondary: s.clone(),
                count: counts.get(&key).copied().unwrap_or(0),
                mean: values.get(&key).and_then(|v| average(v)),
            });
        }
    }
    rows
}

/// Billing per (year, month) of admission, chronological. Records without
/// an admission date are left out.
pub fn monthly_billing(records: &[CleanedRecord]) -> Vec<PeriodRow> {
    let mut periods: BTreeMap<(i32, u32), (usize, Vec<f64>)> = BTreeMap::new();
    for r in records {
        if let (Some(year), Some(month)) = (r.admission_year(), r.admission_month()) {
            let e = periods.entry((year, month)).or_default();
            e.0 += 1;
            if let Some(amount) = r.billing_amount {
                e.1.push(amount);
            }
        }
    }
    periods
        .into_iter()
        .map(|((year, month), (count, amounts))| PeriodRow {
            period: format!("{}-{:02}", year, month),
            display: format!(
                "{} '{:02}",
                MONTHS[(month as usize).saturating_sub(1) % 12],
                year.rem_euclid(100)
            ),
            year,
            month,
            total: amounts.iter().sum(),
            count,
            mean: average(&amounts),
        })
        .collect()
}

/// Billing per calendar month, one row per admission year.
pub fn annual_trend(records: &[CleanedRecord]) -> Vec<YearTrendRow> {
    let mut years: BTreeMap<i32, [f64; 12]> = BTreeMap::new();
    for r in records {
        if let (Some(year), Some(month)) = (r.admission_year(), r.admission_month()) {
            let months = years.entry(year).or_insert([0.0; 12]);
            months[(month as usize - 1) % 12] += r.billing_amount.unwrap_or(0.0);
        }
    }
    years
        .into_iter()
        .map(|(year, months)| YearTrendRow {
            year,
            total: months.iter().sum(),
            months,
        })
        .collect()
}

/// Billing per (admission year, country), ordered by year then country.
pub fn country_year_billing(records: &[CleanedRecord]) -> Vec<CountryYearRow> {
    let mut totals: BTreeMap<(i32, String), f64> = BTreeMap::new();
    for r in records {
        if let Some(year) = r.admission_year() {
            let country = Dimension::Country.value(r).to_string();
            *totals.entry((year, country)).or_insert(0.0) += r.billing_amount.unwrap_or(0.0);
        }
    }
    totals
        .into_iter()
        .map(|((year, country), amount)| CountryYearRow {
            year,
            country,
            amount,
        })
        .collect()
}

fn edge_label(v: i64) -> String {
    v.to_formatted_string(&Locale::en)
}

/// Count of `measure` values per bin, with percentages of all records passed
/// in (nulls and out-of-range values still count towards the total).
pub fn histogram(records: &[CleanedRecord], measure: Measure, bins: &BinConfig) -> Vec<HistogramRow> {
    let total = records.len();
    let values: Vec<f64> = records.iter().filter_map(|r| measure.value(r)).collect();
    let count_where = |pred: &dyn Fn(f64) -> bool| values.iter().filter(|v| pred(**v)).count();

    let mut rows = Vec::new();
    let (first, last) = match (bins.edges.first(), bins.edges.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return rows,
    };

    if bins.include_below {
        let count = count_where(&|v| v < first as f64);
        rows.push(HistogramRow {
            range: format!("< {}", edge_label(first)),
            lower: None,
            upper: Some(first),
            count,
            percentage: percentage(count, total),
        });
    }
    for pair in bins.edges.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let count = count_where(&|v| v >= lo as f64 && v < hi as f64);
        rows.push(HistogramRow {
            range: format!("{} - {}", edge_label(lo), edge_label(hi)),
            lower: Some(lo),
            upper: Some(hi),
            count,
            percentage: percentage(count, total),
        });
    }
    if bins.include_above {
        let count = count_where(&|v| v >= last as f64);
        rows.push(HistogramRow {
            range: format!(">= {}", edge_label(last)),
            lower: Some(last),
            upper: None,
            count,
            percentage: percentage(count, total),
        });
    }
    rows
}

/// Memoized aggregation results keyed by `(filter hash, spec)`.
///
/// The owner calls [`AggregationCache::invalidate`] whenever the filtered
/// record set is replaced.
#[derive(Debug, Default)]
pub struct AggregationCache {
    entries: HashMap<(u64, AggregationSpec), Arc<AggregationResult>>,
    hits: usize,
    misses: usize,
}

impl AggregationCache {
    pub fn get_or_compute(
        &mut self,
        filter_hash: u64,
        spec: &AggregationSpec,
        records: &[CleanedRecord],
    ) -> Arc<AggregationResult> {
        let key = (filter_hash, spec.clone());
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return Arc::clone(hit);
        }
        self.misses += 1;
        debug!("Computing {:?} over {} records", spec, records.len());
        let result = Arc::new(aggregate(records, spec));
        self.entries.insert(key, Arc::clone(&result));
        result
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

/// Something charts can pull records and aggregations from.
pub trait ChartSource {
    fn records(&self) -> &[CleanedRecord];
    fn chart(&mut self, spec: &AggregationSpec) -> Arc<AggregationResult>;
}

/// Computes every chart on demand over a borrowed slice.
pub struct Uncached<'a>(pub &'a [CleanedRecord]);

impl ChartSource for Uncached<'_> {
    fn records(&self) -> &[CleanedRecord] {
        self.0
    }

    fn chart(&mut self, spec: &AggregationSpec) -> Arc<AggregationResult> {
        Arc::new(aggregate(self.0, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::coerce_record;
    use crate::types::RawRecord;
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, &str)]) -> CleanedRecord {
        let raw: RawRecord = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        coerce_record(&raw)
    }

    #[test]
    fn fixed_domain_counts_keep_order_and_zeroes() {
        let records = vec![
            record(&[("Age", "70")]),
            record(&[("Age", "30")]),
            record(&[("Age", "35")]),
        ];
        let rows = count_by(&records, Dimension::AgeGroup);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["0-18", "19-40", "41-65", "65+"]);
        assert_eq!(rows[0].count, 0);
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[1].percentage, 66.7);
        assert_eq!(rows[3].percentage, 33.3);
    }

    #[test]
    fn open_domain_sorted_by_descending_count() {
        let records = vec![
            record(&[("Medical Condition", "Asthma")]),
            record(&[("Medical Condition", "Cancer")]),
            record(&[("Medical Condition", "Cancer")]),
            record(&[("Medical Condition", "Arthritis")]),
        ];
        let rows = count_by(&records, Dimension::MedicalCondition);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Cancer", "Arthritis", "Asthma"]);
        assert_eq!(rows[0].percentage, 50.0);
    }

    #[test]
    fn values_outside_fixed_domain_follow_it() {
        let records = vec![
            record(&[("Gender", "Female")]),
            record(&[("Gender", "")]),
        ];
        let rows = count_by(&records, Dimension::Gender);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Male", "Female", "Unknown"]);
    }

    #[test]
    fn empty_input_is_safe() {
        let gender = count_by(&[], Dimension::Gender);
        assert_eq!(gender.len(), 2);
        assert!(gender.iter().all(|r| r.count == 0 && r.percentage == 0.0));
        assert!(count_by(&[], Dimension::InsuranceProvider).is_empty());
        assert!(monthly_billing(&[]).is_empty());
        assert_eq!(histogram(&[], Measure::BillingAmount, &BinConfig::default()).len(), 6);
        let tab = cross_tab(&[], Dimension::AgeGroup, Dimension::AdmissionType);
        assert_eq!(tab.rows.len(), 4);
        assert!(tab.rows.iter().all(|r| r.total == 0));
    }

    #[test]
    fn percentages_use_the_subset_size() {
        let mut records = Vec::new();
        for i in 0..200 {
            let condition = if i % 4 == 0 && i < 40 { "Obesity" } else { "Diabetes" };
            let country = if i < 50 { "France" } else { "Spain" };
            let name = format!("patient {}", i);
            records.push(record(&[
                ("Name", name.as_str()),
                ("Medical Condition", condition),
                ("Country", country),
            ]));
        }
        let subset: Vec<CleanedRecord> = records
            .iter()
            .filter(|r| r.country.as_deref() == Some("France"))
            .cloned()
            .collect();
        assert_eq!(subset.len(), 50);
        let rows = count_by(&subset, Dimension::MedicalCondition);
        let obesity = rows.iter().find(|r| r.key == "Obesity").unwrap();
        assert_eq!(obesity.count, 10);
        assert_eq!(obesity.percentage, 20.0);
    }

    #[test]
    fn histogram_bins_are_half_open() {
        let records = vec![
            record(&[("Billing Amount", "999.99")]),
            record(&[("Billing Amount", "1000")]),
            record(&[("Billing Amount", "100000")]),
            record(&[("Billing Amount", "-20")]),
        ];
        let rows = histogram(&records, Measure::BillingAmount, &BinConfig::default());
        assert_eq!(rows[0].range, "0 - 1,000");
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[1].range, "1,000 - 5,000");
        assert_eq!(rows[1].count, 1);
        assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), 2);
        assert_eq!(rows[1].percentage, 25.0);
    }

    #[test]
    fn histogram_overflow_bins_are_optional() {
        let records = vec![
            record(&[("Billing Amount", "100000")]),
            record(&[("Billing Amount", "-20")]),
        ];
        let bins = BinConfig {
            include_below: true,
            include_above: true,
            ..BinConfig::default()
        };
        let rows = histogram(&records, Measure::BillingAmount, &bins);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].range, "< 0");
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[7].range, ">= 100,000");
        assert_eq!(rows[7].count, 1);
    }

    #[test]
    fn blood_type_polarity_split() {
        let mut records: Vec<CleanedRecord> =
            (0..3).map(|_| record(&[("Blood Type", "A+")])).collect();
        records.push(record(&[("Blood Type", "A-")]));
        records.push(record(&[("Blood Type", "O-")]));
        let rows = blood_type_polarity(&records);
        assert_eq!(
            rows[0],
            PolarityRow {
                group: "A".to_string(),
                positive: 3,
                negative: 1
            }
        );
        assert_eq!(rows[3].negative, 1);
        assert_eq!(rows[2].positive + rows[2].negative, 0);
    }

    #[test]
    fn cross_tab_is_wide() {
        let records = vec![
            record(&[("Age", "10"), ("Admission Type", "Urgent")]),
            record(&[("Age", "12"), ("Admission Type", "Urgent")]),
            record(&[("Age", "50"), ("Admission Type", "Elective")]),
        ];
        let tab = cross_tab(&records, Dimension::AgeGroup, Dimension::AdmissionType);
        assert_eq!(tab.columns, vec!["Emergency", "Urgent", "Elective"]);
        assert_eq!(tab.count("0-18", "Urgent"), Some(2));
        assert_eq!(tab.count("41-65", "Elective"), Some(1));
        assert_eq!(tab.count("65+", "Emergency"), Some(0));
        assert_eq!(tab.rows[0].total, 2);
    }

    #[test]
    fn mean_by_ignores_nulls_and_sorts_open_domains() {
        let records = vec![
            record(&[
                ("Medical Condition", "Asthma"),
                ("Date of Admission", "2024-01-01"),
                ("Discharge Date", "2024-01-03"),
            ]),
            record(&[
                ("Medical Condition", "Cancer"),
                ("Date of Admission", "2024-01-01"),
                ("Discharge Date", "2024-01-11"),
            ]),
            record(&[("Medical Condition", "Cancer")]),
            record(&[("Medical Condition", "Flu")]),
        ];
        let rows = mean_by(&records, Dimension::MedicalCondition, Measure::LengthOfStay);
        assert_eq!(rows[0].key, "Cancer");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].mean, Some(10.0));
        assert_eq!(rows[1].mean, Some(2.0));
        assert_eq!(rows[2].key, "Flu");
        assert_eq!(rows[2].mean, None);
    }

    #[test]
    fn mean_by_pair_covers_every_combination() {
        let records = vec![
            record(&[
                ("Medical Condition", "Asthma"),
                ("Admission Type", "Urgent"),
                ("Billing Amount", "100"),
            ]),
            record(&[
                ("Medical Condition", "Asthma"),
                ("Admission Type", "Urgent"),
                ("Billing Amount", "300"),
            ]),
        ];
        let rows = mean_by_pair(
            &records,
            Dimension::MedicalCondition,
            Dimension::AdmissionType,
            Measure::BillingAmount,
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].secondary, "Urgent");
        assert_eq!(rows[1].mean, Some(200.0));
        assert_eq!(rows[0].count, 0);
    }

    #[test]
    fn temporal_rollups_skip_missing_dates() {
        let records = vec![
            record(&[("Date of Admission", "2023-12-05"), ("Billing Amount", "100"), ("Country", "France")]),
            record(&[("Date of Admission", "2024-01-10"), ("Billing Amount", "200"), ("Country", "France")]),
            record(&[("Date of Admission", "2024-01-20"), ("Billing Amount", "300"), ("Country", "Spain")]),
            record(&[("Billing Amount", "5000")]),
        ];
        let monthly = monthly_billing(&records);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].period, "2023-12");
        assert_eq!(monthly[0].display, "Dec '23");
        assert_eq!(monthly[1].total, 500.0);
        assert_eq!(monthly[1].count, 2);
        assert_eq!(monthly[1].mean, Some(250.0));

        let annual = annual_trend(&records);
        assert_eq!(annual.len(), 2);
        assert_eq!(annual[1].months[0], 500.0);
        assert_eq!(annual[0].months[11], 100.0);

        let by_country = country_year_billing(&records);
        assert_eq!(by_country.len(), 3);
        assert_eq!(by_country[1].country, "France");
        assert_eq!(by_country[1].year, 2024);
        assert_eq!(by_country[1].amount, 200.0);
    }

    #[test]
    fn cache_reuses_results_until_invalidated() {
        let records = vec![record(&[("Gender", "Male")])];
        let spec = AggregationSpec::Count(Dimension::Gender);
        let mut cache = AggregationCache::default();

        let first = cache.get_or_compute(1, &spec, &records);
        let second = cache.get_or_compute(1, &spec, &records);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);

        cache.get_or_compute(2, &spec, &records);
        assert_eq!(cache.len(), 2);

        cache.invalidate();
        assert!(cache.is_empty());
        let third = cache.get_or_compute(1, &spec, &records);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.misses(), 3);
    }
}
