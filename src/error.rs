//! Error types for norms parsing and lookup

use thiserror::Error;

/// Errors raised while building or querying a [`crate::NormsTable`]
#[derive(Debug, Error)]
pub enum NormsError {
    /// The rows do not follow the header / response / continuation layout
    #[error("malformed norms table at row {row}: {reason}")]
    Format { row: usize, reason: String },

    /// A category was requested that the table does not contain
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NormsError>;
