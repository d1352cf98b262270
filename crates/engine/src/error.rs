//! Error taxonomy for the technical-signal engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The series is shorter than the window a requested computation needs.
    #[error("Insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Clustering was requested on an empty level list.
    #[error("Cannot cluster an empty level list")]
    EmptyLevels,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid series: {0}")]
    InvalidSeries(String),
}

impl From<ta::errors::TaError> for EngineError {
    fn from(err: ta::errors::TaError) -> Self {
        EngineError::InvalidParameter(format!("ta rejected indicator parameters: {err:?}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
