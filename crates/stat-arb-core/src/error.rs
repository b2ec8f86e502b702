use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatArbError {
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate series: {0}")]
    DegenerateSeries(String),

    #[error("Zero variance in rolling window ending at bar {index}")]
    ZeroVarianceWindow { index: usize },

    #[error("Invalid thresholds: entry {entry}, exit {exit}: {reason}")]
    InvalidThreshold {
        entry: Decimal,
        exit: Decimal,
        reason: String,
    },

    #[error("Misaligned series: {0}")]
    MisalignedSeries(String),

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StatArbError {
    fn from(e: serde_json::Error) -> Self {
        StatArbError::SerializationError(e.to_string())
    }
}
