#[cfg(feature = "python")]
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

use crate::pipeline::Rejection;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Rejected: {}", .0.reason)]
    Rejected(Box<Rejection>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Polars error: {0}")]
    Frame(#[from] polars::error::PolarsError),
}

impl TraceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TraceError::NotFound(_))
    }
}

#[cfg(feature = "python")]
impl From<TraceError> for PyErr {
    fn from(err: TraceError) -> PyErr {
        match err {
            TraceError::NotFound(_) => PyKeyError::new_err(err.to_string()),
            TraceError::Malformed(_) | TraceError::Rejected(_) | TraceError::Json(_) => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
