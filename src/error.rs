use thiserror::Error;

/// Errors raised by the simulator.
#[derive(Error, Debug)]
pub enum EnvError {
    // Validation errors
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid price for {field}: {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("allocation_percentage must be between 0.0 and 1.0, received: {0}")]
    AllocationOutOfRange(f64),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid scaler bounds: min {min}, max {max}")]
    InvalidScalerBounds { min: f64, max: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // State machine errors
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("index out of range: {index}, observations length: {len}")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("window too short: need at least {required} states, have {actual}")]
    InsufficientWindow { required: usize, actual: usize },

    #[error("not enough data: need at least {required} bars, feeder has {actual}")]
    InsufficientData { required: usize, actual: usize },

    // Arithmetic errors
    #[error("undefined arithmetic in {context}: {reason}")]
    ArithmeticUndefined {
        context: &'static str,
        reason: String,
    },

    #[error("observation contains non-finite values")]
    NonFiniteObservation,

    // Collaborator errors
    #[error("data frame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("timestamp parse error: {0}")]
    Timestamp(String),
}

pub type Result<T> = std::result::Result<T, EnvError>;

impl EnvError {
    pub(crate) fn undefined(context: &'static str, reason: impl Into<String>) -> Self {
        Self::ArithmeticUndefined {
            context,
            reason: reason.into(),
        }
    }
}
