//! Data core for a healthcare admissions dashboard.
//!
//! Raw CSV rows go through [`preprocess`] (coercion, derived columns,
//! deduplication, summary statistics). The cleaned records then feed the
//! [`aggregate`] engine, either directly or through the process-wide
//! [`filter`] session, which keeps one filtered view and caches chart
//! aggregations against it. [`reports`] composes the dashboard tabs from
//! engine specs.
//!
//! ```no_run
//! use healthcare_dashboard::aggregate::{AggregationSpec, Dimension};
//! use healthcare_dashboard::{filter, loader};
//! use std::path::Path;
//!
//! let (processed, _) = loader::load_and_clean(Path::new("admissions.csv"))?;
//! filter::init(processed.cleaned, None::<fn(&[healthcare_dashboard::CleanedRecord])>);
//! let genders = filter::aggregate(&AggregationSpec::Count(Dimension::Gender))?;
//! println!("{:?}", genders.counts());
//! # Ok::<(), healthcare_dashboard::DashboardError>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod geocode;
pub mod loader;
pub mod output;
pub mod preprocess;
pub mod reports;
pub mod types;
pub mod util;

pub use aggregate::{aggregate, AggregationResult, AggregationSpec, BinConfig, Dimension, Measure};
pub use config::DashboardConfig;
pub use error::{DashboardError, Result};
pub use filter::{FilterCriteria, FilterManager, FilterOptions, FilterStats};
pub use loader::{load_and_clean, LoadReport};
pub use preprocess::{preprocess, Preprocessed};
pub use types::{AgeGroup, BillType, CleanedRecord, RawRecord, SummaryReport};
