//! Error types for the reverse path. Introspection failures are fatal;
//! the only locally absorbed outcome is an empty metadata result set.

use tabula_core::SemanticError;

/// Errors raised while rebuilding a model from catalog metadata.
#[derive(Debug, thiserror::Error)]
pub enum ReverseError {
    /// The connection could not be opened or used.
    #[error("connection failed: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// A metadata query failed or returned something inconsistent.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A vendor type has no logical equivalent.
    #[error("unhandled sql type {ty} ({table}.{column})")]
    UnmappedType {
        /// Owning table.
        table: String,
        /// Offending column.
        column: String,
        /// The raw vendor type.
        ty: String,
    },

    /// The connection descriptor names no supported vendor.
    #[error("no metadata provider for: {0}")]
    UnknownVendor(String),

    /// The reconstructed entities violated a model invariant.
    #[error(transparent)]
    Model(#[from] SemanticError),
}

impl ReverseError {
    /// Wraps a query failure.
    #[must_use]
    pub fn query(err: sqlx::Error) -> Self {
        Self::Metadata(err.to_string())
    }
}
