//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Too few (or no) usable data points for the requested analysis
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// An analytical module failed or ran past its deadline
    #[error("Computation error: {0}")]
    Computation(String),

    /// The query references a column that is not in the dataset schema
    #[error("Unknown column: {column}")]
    UnknownColumn {
        column: String,
        suggestion: Option<String>,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InsufficientData(_) => "insufficient_data",
            Error::Computation(_) => "computation",
            Error::UnknownColumn { .. } => "unknown_column",
            Error::InvalidData(_) => "invalid_data",
            Error::Config(_) => "config",
            Error::Csv(_) => "csv",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Regex(_) => "regex",
        }
    }

    /// User-facing hint for unknown column errors
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownColumn {
                column,
                suggestion: Some(s),
            } => Some(format!(
                "Column '{}' was not found. Did you mean '{}'? Please re-check the query.",
                column, s
            )),
            Error::UnknownColumn {
                column,
                suggestion: None,
            } => Some(format!(
                "Column '{}' was not found. Please re-check the query.",
                column
            )),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
