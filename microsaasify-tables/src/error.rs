//! Error types for the tables crate.

use thiserror::Error;

/// Errors raised while shaping provider data into a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("malformed cell at row {row}, column {column}: {reason}")]
    MalformedCell {
        row: usize,
        column: usize,
        reason: String,
    },
}

pub type TableResult<T> = Result<T, TableError>;
