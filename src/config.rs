use crate::aggregate::BinConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DATA_FILE: &str = "healthcare_dataset_with_coordinates.csv";

/// Settings for one dashboard session.
///
/// ```
/// use healthcare_dashboard::config::DashboardConfig;
///
/// let config = DashboardConfig::default()
///     .with_preview_rows(5)
///     .with_refund_bin(true);
/// assert!(config.bins.include_below);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data_path: PathBuf,
    /// Rows shown per table in console previews.
    pub preview_rows: usize,
    /// Cost-distribution bins for the financial tab.
    pub bins: BinConfig,
    /// Where exports (cleaned CSV, summary JSON, report JSON) are written.
    pub out_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_FILE),
            preview_rows: 10,
            bins: BinConfig::default(),
            out_dir: PathBuf::from("."),
        }
    }
}

impl DashboardConfig {
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows.max(1);
        self
    }

    /// Adds a leading `< 0` bin so refunds show up in the histogram.
    pub fn with_refund_bin(mut self, include: bool) -> Self {
        self.bins.include_below = include;
        self
    }

    pub fn with_overflow_bin(mut self, include: bool) -> Self {
        self.bins.include_above = include;
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    pub fn out_path(&self, file_name: &str) -> PathBuf {
        self.out_dir.join(file_name)
    }
}
