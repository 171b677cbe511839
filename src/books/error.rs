//! Catalog errors.

use crate::util::FieldErrors;
use thiserror::Error;

/// Failure of a catalog operation.
#[derive(Error, Debug)]
pub enum BookError {
    /// No book with this id.
    #[error("book {0} not found")]
    NotFound(i64),

    /// Title, author or category missing from a create request.
    #[error("incomplete book data")]
    Incomplete,

    /// One or more fields failed validation.
    #[error("invalid book fields: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    Invalid(FieldErrors),

    /// Persistence or filesystem failure.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
