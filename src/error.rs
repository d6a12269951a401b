//! Error types for loading, exporting and filtering the dashboard data.
//!
//! Data-quality problems never show up here: coercion degrades bad cells to
//! null or `"Unknown"`. Only the ingestion/export boundary and the filter
//! controller produce errors.

use serde::ser::SerializeStruct;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    /// The CSV file has no header row, so columns cannot be addressed.
    #[error("CSV file '{0}' has no header row")]
    MissingHeader(String),

    /// A tab or filter was requested before any dataset was loaded.
    #[error("No data loaded")]
    NoDataLoaded,

    /// A filter change arrived while another one was still being applied.
    #[error("A filter update is already in progress")]
    FilterBusy,

    /// Filter input from the user could not be understood.
    #[error("Invalid filter value for '{field}': {value}")]
    InvalidFilter { field: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DashboardError {
    /// Stable code for callers that branch on the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "MISSING_HEADER",
            Self::NoDataLoaded => "NO_DATA_LOADED",
            Self::FilterBusy => "FILTER_BUSY",
            Self::InvalidFilter { .. } => "INVALID_FILTER",
            Self::Io(_) => "IO_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the session can carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoDataLoaded | Self::FilterBusy | Self::InvalidFilter { .. }
        )
    }
}

/// Errors serialize as `{code, message}` so a front end can display them.
impl Serialize for DashboardError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DashboardError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
