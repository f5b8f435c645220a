//! Error types for registry operations.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the control-plane registry client.
///
/// The registry performs no retry: every error here is the underlying
/// database error, surfaced unchanged.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Connection pool error acquiring a control-plane handle.
    #[error("registry pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Raw PostgreSQL error from a registry query.
    #[error("registry query error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error building the registry client (e.g. bad URL).
    #[error("registry configuration error: {0}")]
    Config(String),

    /// A row failed to map onto its domain entity.
    #[error("registry row mapping error: {0}")]
    RowMapping(String),
}

impl RegistryError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn row_mapping(message: impl Into<String>) -> Self {
        Self::RowMapping(message.into())
    }

    /// True for errors caused by the underlying TCP/pool layer rather than
    /// query semantics.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_not_connection_error() {
        let err = RegistryError::config("bad url");
        assert!(!err.is_connection_error());
    }
}
