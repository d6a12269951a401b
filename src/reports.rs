use crate::aggregate::{
    group_by, AggregationResult, AggregationSpec, BinConfig, ChartSource, Dimension, Measure,
};
use crate::types::{
    BillType, BillingTier, CleanedRecord, CountRow, CountryYearRow, CrossTab, HistogramRow,
    HospitalMarker, InsuranceRow, MeanRow, PairMeanRow, PeriodRow, PolarityRow, YearTrendRow,
};
use crate::util::{average, percentage, round1};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewKpis {
    pub total_patients: usize,
    pub total_billing: f64,
    pub avg_age: Option<f64>,
    pub avg_length_of_stay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewReport {
    pub kpis: OverviewKpis,
    pub test_results: Vec<CountRow>,
    pub condition_by_test_result: CrossTab,
    pub condition_by_age_group: CrossTab,
    pub conditions: Vec<CountRow>,
    pub admission_types: Vec<CountRow>,
    pub stay_by_condition: Vec<MeanRow>,
    pub stay_by_condition_and_admission: Vec<PairMeanRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenderSplit {
    pub male_pct: f64,
    pub female_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemographicsReport {
    pub total_patients: usize,
    pub avg_age: Option<f64>,
    pub gender_split: Option<GenderSplit>,
    pub genders: Vec<CountRow>,
    pub age_groups: Vec<CountRow>,
    pub blood_types: Vec<PolarityRow>,
    pub admission_by_age_group: CrossTab,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialKpis {
    pub total_revenue: f64,
    pub total_refunds: f64,
    pub total_records: usize,
    pub unique_patients: usize,
    pub avg_length_of_stay: Option<f64>,
    pub avg_billing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialReport {
    pub kpis: FinancialKpis,
    pub cost_distribution: Vec<HistogramRow>,
    pub insurance: Vec<InsuranceRow>,
    pub monthly: Vec<PeriodRow>,
    pub annual: Vec<YearTrendRow>,
    pub by_country_year: Vec<CountryYearRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeographicReport {
    pub hospitals: Vec<HospitalMarker>,
    pub countries: Vec<CountRow>,
}

fn counts(result: Arc<AggregationResult>) -> Vec<CountRow> {
    result.counts().to_vec()
}

fn cross(result: Arc<AggregationResult>) -> CrossTab {
    result.cross_tab().cloned().unwrap_or_default()
}

fn mean_of(records: &[CleanedRecord], measure: Measure) -> Option<f64> {
    let values: Vec<f64> = records.iter().filter_map(|r| measure.value(r)).collect();
    average(&values)
}

pub fn overview<S: ChartSource + ?Sized>(src: &mut S) -> OverviewReport {
    let records = src.records();
    let kpis = OverviewKpis {
        total_patients: records.len(),
        total_billing: records.iter().filter_map(|r| r.billing_amount).sum(),
        avg_age: mean_of(records, Measure::Age),
        avg_length_of_stay: mean_of(records, Measure::LengthOfStay),
    };

    OverviewReport {
        kpis,
        test_results: counts(src.chart(&AggregationSpec::Count(Dimension::TestResults))),
        condition_by_test_result: cross(src.chart(&AggregationSpec::CrossTab {
            primary: Dimension::MedicalCondition,
            secondary: Dimension::TestResults,
        })),
        condition_by_age_group: cross(src.chart(&AggregationSpec::CrossTab {
            primary: Dimension::MedicalCondition,
            secondary: Dimension::AgeGroup,
        })),
        conditions: counts(src.chart(&AggregationSpec::Count(Dimension::MedicalCondition))),
        admission_types: counts(src.chart(&AggregationSpec::Count(Dimension::AdmissionType))),
        stay_by_condition: src
            .chart(&AggregationSpec::MeanBy {
                group: Dimension::MedicalCondition,
                measure: Measure::LengthOfStay,
            })
            .means()
            .to_vec(),
        stay_by_condition_and_admission: src
            .chart(&AggregationSpec::MeanByPair {
                primary: Dimension::MedicalCondition,
                secondary: Dimension::AdmissionType,
                measure: Measure::LengthOfStay,
            })
            .pair_means()
            .to_vec(),
    }
}

/// Male share from the gender counts; female is the complement.
pub fn gender_split(genders: &[CountRow], total: usize) -> Option<GenderSplit> {
    if total == 0 {
        return None;
    }
    let male = genders
        .iter()
        .find(|row| row.key == "Male")
        .map_or(0, |row| row.count);
    let male_pct = percentage(male, total);
    Some(GenderSplit {
        male_pct,
        female_pct: round1(100.0 - male_pct),
    })
}

pub fn demographics<S: ChartSource + ?Sized>(src: &mut S) -> DemographicsReport {
    let total_patients = src.records().len();
    let avg_age = mean_of(src.records(), Measure::Age);
    let genders = counts(src.chart(&AggregationSpec::Count(Dimension::Gender)));

    DemographicsReport {
        total_patients,
        avg_age,
        gender_split: gender_split(&genders, total_patients),
        genders,
        age_groups: counts(src.chart(&AggregationSpec::Count(Dimension::AgeGroup))),
        blood_types: src.chart(&AggregationSpec::BloodTypePolarity).polarity().to_vec(),
        admission_by_age_group: cross(src.chart(&AggregationSpec::CrossTab {
            primary: Dimension::AgeGroup,
            secondary: Dimension::AdmissionType,
        })),
    }
}

pub fn financial_kpis(records: &[CleanedRecord]) -> FinancialKpis {
    let sum_of = |kind: BillType| -> f64 {
        records
            .iter()
            .filter(|r| r.type_of_bill == kind)
            .filter_map(|r| r.billing_amount)
            .sum()
    };
    let unique_patients = records
        .iter()
        .filter_map(|r| r.name.as_deref())
        .collect::<HashSet<_>>()
        .len();
    FinancialKpis {
        total_revenue: sum_of(BillType::Normal),
        total_refunds: sum_of(BillType::Refund),
        total_records: records.len(),
        unique_patients,
        avg_length_of_stay: mean_of(records, Measure::LengthOfStay),
        avg_billing: mean_of(records, Measure::BillingAmount),
    }
}

/// Per-provider billing, largest total first.
pub fn insurance_analysis(records: &[CleanedRecord]) -> Vec<InsuranceRow> {
    #[derive(Default)]
    struct Acc {
        amounts: Vec<f64>,
        patients: usize,
        refunds: usize,
    }
    let mut map: HashMap<&str, Acc> = HashMap::new();
    for r in records {
        let e = map.entry(r.insurance_provider.as_str()).or_default();
        e.patients += 1;
        if let Some(amount) = r.billing_amount {
            e.amounts.push(amount);
        }
        if r.type_of_bill == BillType::Refund {
            e.refunds += 1;
        }
    }

    let mut rows: Vec<InsuranceRow> = map
        .into_iter()
        .map(|(provider, acc)| InsuranceRow {
            provider: provider.to_string(),
            avg_amount: average(&acc.amounts),
            total_amount: acc.amounts.iter().sum(),
            patient_count: acc.patients,
            refund_count: acc.refunds,
            refund_percentage: percentage(acc.refunds, acc.patients),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_amount
            .partial_cmp(&a.total_amount)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.provider.cmp(&b.provider))
    });
    rows
}

pub fn financial<S: ChartSource + ?Sized>(src: &mut S, bins: &BinConfig) -> FinancialReport {
    let kpis = financial_kpis(src.records());
    let insurance = insurance_analysis(src.records());
    FinancialReport {
        kpis,
        cost_distribution: src
            .chart(&AggregationSpec::Histogram {
                measure: Measure::BillingAmount,
                bins: bins.clone(),
            })
            .histogram()
            .to_vec(),
        insurance,
        monthly: src.chart(&AggregationSpec::MonthlyBilling).periods().to_vec(),
        annual: src.chart(&AggregationSpec::AnnualTrend).year_trends().to_vec(),
        by_country_year: src
            .chart(&AggregationSpec::CountryYearBilling)
            .country_years()
            .to_vec(),
    }
}

pub fn marker_size(patient_count: usize) -> f64 {
    (patient_count as f64 / 2.0).clamp(8.0, 22.0)
}

/// Most frequent test result; ties go to the result that first appears later.
fn dominant_test_result(records: &[&CleanedRecord]) -> Option<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        if let Some(result) = r.test_results.as_deref() {
            let n = tally.entry(result).or_insert(0);
            if *n == 0 {
                order.push(result);
            }
            *n += 1;
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for key in order {
        let n = tally[key];
        if best.map_or(true, |(_, top)| n >= top) {
            best = Some((key, n));
        }
    }
    best.map(|(key, _)| key.to_string())
}

/// One marker per hospital, placed at the location of its first record.
/// Busiest hospitals come first.
pub fn hospital_markers(records: &[CleanedRecord]) -> Vec<HospitalMarker> {
    group_by(records, Dimension::Hospital)
        .into_iter()
        .filter_map(|(hospital, group)| {
            let first = group.first()?;
            let amounts: Vec<f64> = group.iter().filter_map(|r| r.billing_amount).collect();
            let avg_billing = average(&amounts);
            Some(HospitalMarker {
                city: first.city.clone(),
                country: first.country.clone(),
                latitude: first.latitude,
                longitude: first.longitude,
                patient_count: group.len(),
                avg_billing,
                tier: BillingTier::from_avg(avg_billing),
                marker_size: marker_size(group.len()),
                dominant_test_result: dominant_test_result(&group),
                hospital,
            })
        })
        .collect()
}

pub fn geographic<S: ChartSource + ?Sized>(src: &mut S) -> GeographicReport {
    GeographicReport {
        hospitals: hospital_markers(src.records()),
        countries: counts(src.chart(&AggregationSpec::Count(Dimension::Country))),
    }
}
