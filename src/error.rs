#[cfg(feature = "python")]
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    /// Reference dataset or run configuration is unusable. Aborts the run.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required columns are absent. Aborts the affected step.
    #[error("Missing column(s): {0}")]
    Schema(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    pub fn missing_columns<S: AsRef<str>>(names: &[S]) -> Self {
        let joined = names
            .iter()
            .map(|s| format!("'{}'", s.as_ref()))
            .collect::<Vec<_>>()
            .join(", ");
        ReportError::Schema(joined)
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(feature = "python")]
impl From<ReportError> for PyErr {
    fn from(err: ReportError) -> PyErr {
        match err {
            ReportError::Config(_) => PyValueError::new_err(err.to_string()),
            ReportError::Schema(_) => PyKeyError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
