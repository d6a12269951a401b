//! Cross-tab filtering and the session's shared dataset.
//!
//! [`FilterManager`] owns the cleaned records, the active criteria and the
//! filtered subset. The subset is rebuilt from scratch on every change and
//! swapped in with one assignment; readers only ever get `Arc` handles.
//! The functions at the bottom of the module drive one process-wide manager.

use crate::aggregate::{AggregationCache, AggregationResult, AggregationSpec, ChartSource};
use crate::error::{DashboardError, Result};
use crate::types::{BillType, CleanedRecord};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Sparse filter; `None` fields do not constrain anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FilterCriteria {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub hospital: Option<String>,
    pub insurance_provider: Option<String>,
    pub bill_type: Option<BillType>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    pub fn active_count(&self) -> usize {
        [
            self.year.is_some(),
            self.month.is_some(),
            self.country.is_some(),
            self.city.is_some(),
            self.hospital.is_some(),
            self.insurance_provider.is_some(),
            self.bill_type.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Stable within a process; used to key cached aggregations.
    pub fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// AND of every present criterion, each an exact match. Year and month come
/// from the admission date, so they reject records without one.
pub fn build_predicate(criteria: &FilterCriteria) -> impl Fn(&CleanedRecord) -> bool + '_ {
    move |r: &CleanedRecord| {
        let text_matches = |wanted: &Option<String>, actual: Option<&str>| {
            wanted.as_deref().map_or(true, |w| actual == Some(w))
        };
        criteria.year.map_or(true, |y| r.admission_year() == Some(y))
            && criteria.month.map_or(true, |m| r.admission_month() == Some(m))
            && text_matches(&criteria.country, r.country.as_deref())
            && text_matches(&criteria.city, r.city.as_deref())
            && text_matches(&criteria.hospital, Some(r.hospital.as_str()))
            && text_matches(&criteria.insurance_provider, Some(r.insurance_provider.as_str()))
            && criteria.bill_type.map_or(true, |b| r.type_of_bill == b)
    }
}

pub fn apply_filter(records: &[CleanedRecord], criteria: &FilterCriteria) -> Vec<CleanedRecord> {
    let keep = build_predicate(criteria);
    records.iter().filter(|r| keep(r)).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub filtered: usize,
    pub active_filter_count: usize,
}

/// Distinct values to offer in the filter pickers, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub countries: Vec<String>,
    pub cities: Vec<String>,
    pub hospitals: Vec<String>,
    pub insurance_providers: Vec<String>,
}

pub fn filter_options(records: &[CleanedRecord]) -> FilterOptions {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
    FilterOptions {
        years: records
            .iter()
            .filter_map(CleanedRecord::admission_year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        countries: distinct(records.iter().filter_map(|r| r.country.as_deref())),
        cities: distinct(records.iter().filter_map(|r| r.city.as_deref())),
        hospitals: distinct(records.iter().map(|r| r.hospital.as_str())),
        insurance_providers: distinct(records.iter().map(|r| r.insurance_provider.as_str())),
    }
}

pub type ChangeCallback = Arc<dyn Fn(&[CleanedRecord]) + Send + Sync>;

/// A committed filter change waiting to be handed to the callback.
pub struct Notification {
    callback: Option<ChangeCallback>,
    data: Arc<Vec<CleanedRecord>>,
}

impl Notification {
    pub fn deliver(self) {
        if let Some(callback) = self.callback {
            callback(&self.data);
        }
    }

    /// Deliver, catching a panicking callback so the caller can clear its
    /// busy flag before re-raising it.
    fn deliver_guarded(self) -> thread::Result<()> {
        panic::catch_unwind(AssertUnwindSafe(|| self.deliver()))
    }
}

pub struct FilterManager {
    original: Arc<Vec<CleanedRecord>>,
    filtered: Arc<Vec<CleanedRecord>>,
    criteria: FilterCriteria,
    on_change: Option<ChangeCallback>,
    busy: bool,
    cache: AggregationCache,
}

impl FilterManager {
    pub fn new(data: Vec<CleanedRecord>) -> Self {
        let original = Arc::new(data);
        info!("FilterManager initialized with {} records", original.len());
        Self {
            filtered: Arc::clone(&original),
            original,
            criteria: FilterCriteria::default(),
            on_change: None,
            busy: false,
            cache: AggregationCache::default(),
        }
    }

    /// Register the single listener for filter changes, replacing any
    /// previous one.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: Fn(&[CleanedRecord]) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
    }

    /// Start a filter change: reject it if one is in flight, otherwise
    /// rebuild the filtered set and drop cached charts. The caller must
    /// deliver the notification and then call [`FilterManager::finish`].
    pub fn begin(&mut self, criteria: FilterCriteria) -> Result<Notification> {
        if self.busy {
            warn!("Rejected filter change while another is being applied");
            return Err(DashboardError::FilterBusy);
        }
        self.busy = true;

        self.filtered = if criteria.is_empty() {
            Arc::clone(&self.original)
        } else {
            Arc::new(apply_filter(&self.original, &criteria))
        };
        self.criteria = criteria;
        self.cache.invalidate();
        info!(
            "Filtered data: {} of {} records ({} active filters)",
            self.filtered.len(),
            self.original.len(),
            self.criteria.active_count()
        );

        Ok(Notification {
            callback: self.on_change.clone(),
            data: Arc::clone(&self.filtered),
        })
    }

    pub fn finish(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_filter(&mut self, criteria: FilterCriteria) -> Result<FilterStats> {
        let notification = self.begin(criteria)?;
        let delivered = notification.deliver_guarded();
        self.finish();
        if let Err(payload) = delivered {
            panic::resume_unwind(payload);
        }
        Ok(self.stats())
    }

    pub fn clear_filter(&mut self) -> Result<FilterStats> {
        self.set_filter(FilterCriteria::default())
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn filtered_data(&self) -> Arc<Vec<CleanedRecord>> {
        Arc::clone(&self.filtered)
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            total: self.original.len(),
            filtered: self.filtered.len(),
            active_filter_count: self.criteria.active_count(),
        }
    }

    pub fn options(&self) -> FilterOptions {
        filter_options(&self.original)
    }

    /// Aggregate the current filtered set, reusing a cached result when the
    /// same spec was computed under the same criteria.
    pub fn aggregate(&mut self, spec: &AggregationSpec) -> Arc<AggregationResult> {
        let key = self.criteria.hash_key();
        self.cache.get_or_compute(key, spec, &self.filtered)
    }

    pub fn cache(&self) -> &AggregationCache {
        &self.cache
    }
}

impl ChartSource for FilterManager {
    fn records(&self) -> &[CleanedRecord] {
        &self.filtered
    }

    fn chart(&mut self, spec: &AggregationSpec) -> Arc<AggregationResult> {
        self.aggregate(spec)
    }
}

static SESSION: Lazy<Mutex<Option<FilterManager>>> = Lazy::new(|| Mutex::new(None));

fn session() -> MutexGuard<'static, Option<FilterManager>> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` against the session's manager.
pub fn with_session<T>(f: impl FnOnce(&mut FilterManager) -> T) -> Result<T> {
    let mut guard = session();
    let manager = guard.as_mut().ok_or(DashboardError::NoDataLoaded)?;
    Ok(f(manager))
}

/// Install a freshly loaded dataset as the session state, dropping any
/// previous dataset, filter and callback.
pub fn init<F>(data: Vec<CleanedRecord>, callback: Option<F>)
where
    F: Fn(&[CleanedRecord]) + Send + Sync + 'static,
{
    let mut manager = FilterManager::new(data);
    if let Some(cb) = callback {
        manager.on_change(cb);
    }
    *session() = Some(manager);
}

pub fn is_loaded() -> bool {
    session().is_some()
}

/// Apply `criteria` to the session dataset and notify the listener.
///
/// The listener runs without the session lock held, so it may read the
/// session. Calling `set_filter` from inside it fails with
/// [`DashboardError::FilterBusy`].
pub fn set_filter(criteria: FilterCriteria) -> Result<FilterStats> {
    debug!("set_filter {:?}", criteria);
    let notification = with_session(|m| m.begin(criteria))??;
    let delivered = notification.deliver_guarded();
    let stats = with_session(|m| {
        m.finish();
        m.stats()
    });
    if let Err(payload) = delivered {
        panic::resume_unwind(payload);
    }
    stats
}

pub fn clear_filter() -> Result<FilterStats> {
    set_filter(FilterCriteria::default())
}

pub fn get_filtered_data() -> Result<Arc<Vec<CleanedRecord>>> {
    with_session(|m| m.filtered_data())
}

pub fn get_stats() -> Result<FilterStats> {
    with_session(|m| m.stats())
}

pub fn aggregate(spec: &AggregationSpec) -> Result<Arc<AggregationResult>> {
    with_session(|m| m.aggregate(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Dimension;
    use crate::preprocess::coerce_record;
    use crate::types::RawRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(pairs: &[(&str, &str)]) -> CleanedRecord {
        let raw: RawRecord = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        coerce_record(&raw)
    }

    fn sample() -> Vec<CleanedRecord> {
        vec![
            record(&[
                ("Date of Admission", "2023-03-10"),
                ("Country", "France"),
                ("City", "Paris"),
                ("Hospital", "Smith Plc"),
                ("Billing Amount", "100"),
            ]),
            record(&[
                ("Date of Admission", "2024-03-02"),
                ("Country", "France"),
                ("City", "Lyon"),
                ("Hospital", "Smith Plc"),
                ("Billing Amount", "-5"),
            ]),
            record(&[
                ("Date of Admission", "2024-07-19"),
                ("Country", "Spain"),
                ("City", "Madrid"),
                ("Hospital", "Garcia Ltd"),
                ("Insurance Provider", "Aetna"),
            ]),
            record(&[("Country", "Spain"), ("Hospital", "Garcia Ltd")]),
        ]
    }

    #[test]
    fn empty_criteria_keep_everything() {
        let records = sample();
        assert_eq!(apply_filter(&records, &FilterCriteria::default()).len(), 4);
    }

    #[test]
    fn criteria_are_anded() {
        let records = sample();
        let criteria = FilterCriteria {
            country: Some("France".to_string()),
            year: Some(2024),
            ..FilterCriteria::default()
        };
        let out = apply_filter(&records, &criteria);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].city.as_deref(), Some("Lyon"));
    }

    #[test]
    fn month_filter_rejects_missing_dates() {
        let records = sample();
        let criteria = FilterCriteria {
            month: Some(3),
            ..FilterCriteria::default()
        };
        assert_eq!(apply_filter(&records, &criteria).len(), 2);
        let spain = FilterCriteria {
            country: Some("Spain".to_string()),
            month: Some(7),
            ..FilterCriteria::default()
        };
        assert_eq!(apply_filter(&records, &spain).len(), 1);
    }

    #[test]
    fn hospital_insurance_and_bill_type() {
        let records = sample();
        let by_hospital = FilterCriteria {
            hospital: Some("Garcia Ltd".to_string()),
            insurance_provider: Some("Aetna".to_string()),
            ..FilterCriteria::default()
        };
        assert_eq!(apply_filter(&records, &by_hospital).len(), 1);
        let refunds = FilterCriteria {
            bill_type: Some(BillType::Refund),
            ..FilterCriteria::default()
        };
        assert_eq!(apply_filter(&records, &refunds).len(), 1);
    }

    #[test]
    fn manager_replaces_subset_and_notifies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut manager = FilterManager::new(sample());
        manager.on_change(move |data| {
            seen.fetch_add(data.len(), Ordering::SeqCst);
        });

        let before = manager.filtered_data();
        let stats = manager
            .set_filter(FilterCriteria {
                country: Some("Spain".to_string()),
                ..FilterCriteria::default()
            })
            .unwrap();
        assert_eq!(
            stats,
            FilterStats {
                total: 4,
                filtered: 2,
                active_filter_count: 1
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(before.len(), 4);

        let stats = manager.clear_filter().unwrap();
        assert_eq!(stats.filtered, 4);
        assert_eq!(stats.active_filter_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn overlapping_changes_are_rejected() {
        let mut manager = FilterManager::new(sample());
        let pending = manager.begin(FilterCriteria::default()).unwrap();
        let err = manager.begin(FilterCriteria::default()).err().unwrap();
        assert_eq!(err.error_code(), "FILTER_BUSY");
        pending.deliver();
        manager.finish();
        assert!(!manager.is_busy());
        assert!(manager.set_filter(FilterCriteria::default()).is_ok());
    }

    #[test]
    fn panicking_callback_does_not_leave_manager_busy() {
        let mut manager = FilterManager::new(sample());
        manager.on_change(|_| panic!("listener failed"));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            manager.set_filter(FilterCriteria::default())
        }));
        assert!(outcome.is_err());
        assert!(!manager.is_busy());

        manager.on_change(|_| {});
        let stats = manager
            .set_filter(FilterCriteria {
                country: Some("Spain".to_string()),
                ..FilterCriteria::default()
            })
            .unwrap();
        assert_eq!(stats.filtered, 2);
    }

    #[test]
    fn filter_change_invalidates_cached_charts() {
        let mut manager = FilterManager::new(sample());
        let spec = AggregationSpec::Count(Dimension::Country);
        let all = manager.aggregate(&spec);
        assert!(Arc::ptr_eq(&all, &manager.aggregate(&spec)));
        assert_eq!(all.counts()[0].count, 2);

        manager
            .set_filter(FilterCriteria {
                city: Some("Paris".to_string()),
                ..FilterCriteria::default()
            })
            .unwrap();
        assert!(manager.cache().is_empty());
        let paris = manager.aggregate(&spec);
        assert_eq!(paris.counts().len(), 1);
        assert_eq!(paris.counts()[0].percentage, 100.0);
    }

    #[test]
    fn options_are_distinct_and_sorted() {
        let options = filter_options(&sample());
        assert_eq!(options.years, vec![2023, 2024]);
        assert_eq!(options.countries, vec!["France", "Spain"]);
        assert_eq!(options.cities, vec!["Lyon", "Madrid", "Paris"]);
        assert_eq!(options.hospitals, vec!["Garcia Ltd", "Smith Plc"]);
    }

    #[test]
    fn session_rejects_reentrant_filters() {
        let reentry = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&reentry);
        init(
            sample(),
            Some(move |_: &[CleanedRecord]| {
                let inner = set_filter(FilterCriteria::default());
                let visible = get_stats().map(|s| s.filtered).ok();
                *slot.lock().unwrap() = Some((inner.err().map(|e| e.error_code()), visible));
            }),
        );
        assert!(is_loaded());

        let stats = set_filter(FilterCriteria {
            country: Some("France".to_string()),
            ..FilterCriteria::default()
        })
        .unwrap();
        assert_eq!(stats.filtered, 2);
        assert_eq!(
            *reentry.lock().unwrap(),
            Some((Some("FILTER_BUSY"), Some(2)))
        );
        assert_eq!(get_filtered_data().unwrap().len(), 2);
        assert_eq!(aggregate(&AggregationSpec::Count(Dimension::City)).unwrap().counts().len(), 2);

        // A listener that panics must not wedge the session.
        init(sample(), Some(|_: &[CleanedRecord]| panic!("listener failed")));
        let outcome = panic::catch_unwind(|| set_filter(FilterCriteria::default()));
        assert!(outcome.is_err());
        assert!(!with_session(|m| m.is_busy()).unwrap());

        // The next change reaches the listener again instead of FILTER_BUSY.
        let retry = panic::catch_unwind(|| {
            set_filter(FilterCriteria {
                city: Some("Madrid".to_string()),
                ..FilterCriteria::default()
            })
        });
        assert!(retry.is_err());
        assert_eq!(get_stats().unwrap().filtered, 1);
    }
}
