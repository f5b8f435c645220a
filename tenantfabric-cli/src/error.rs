//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Environment/configuration error (e.g. missing `MULTI_TENANT_REGISTRY_URL`).
    #[error("configuration error: {0}")]
    #[diagnostic(code(tenantfabric::config))]
    Config(String),

    /// The CLI's own argument validation failed (e.g. one of the canary
    /// flags was supplied without the other).
    #[error("invalid arguments: {0}")]
    #[diagnostic(code(tenantfabric::args))]
    InvalidArgs(String),

    /// The registry connection itself could not be established.
    #[error("registry connection error: {0}")]
    #[diagnostic(code(tenantfabric::registry))]
    Registry(String),

    /// The migration engine returned a fleet-halting error.
    #[error("migration error: {0}")]
    #[diagnostic(code(tenantfabric::migration))]
    Migrate(#[from] tenantfabric_migrate::MigrateError),
}

impl From<tenantfabric_registry::RegistryError> for CliError {
    fn from(err: tenantfabric_registry::RegistryError) -> Self {
        CliError::Registry(err.to_string())
    }
}
