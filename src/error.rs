//! Error types for dms_rank

use thiserror::Error;

/// Main error type for the ranking and enrichment pipeline
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Duplicate identifier '{id}' in count matrix")]
    DuplicateIdentifier { id: String },

    #[error("Non-numeric count '{value}' in column '{column}' (row {row})")]
    NonNumericCount {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Invalid sample metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    #[error("Coefficient mismatch: tested '{tested}', requested '{requested}'")]
    CoefficientMismatch { tested: String, requested: String },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DmsError>;
