//! Error types for tenant context resolution.

use thiserror::Error;

use tenantfabric_pool::ManagerError;
use tenantfabric_registry::RegistryError;

/// Errors surfaced by [`crate::context::require`] and friends.
#[derive(Error, Debug, Clone)]
pub enum ContextError {
    /// `require()` was called outside any `run_with` region.
    #[error("no tenant context bound for this task")]
    NoTenantContext,

    /// No resolution strategy matched the incoming request.
    #[error("unknown tenant for request: {0}")]
    UnknownTenant(String),

    /// A registry lookup failed while resolving.
    #[error("registry error while resolving tenant: {0}")]
    Registry(String),
}

impl From<RegistryError> for ContextError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err.to_string())
    }
}

/// Errors surfaced by [`crate::middleware::resolve_and_run`].
#[derive(Error, Debug, Clone)]
pub enum MiddlewareError {
    /// Tenant/org resolution failed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The connection manager failed to produce a handle for the resolved tenant/org.
    #[error("connection manager error: {0}")]
    Connection(#[from] ManagerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tenant_is_not_a_connection_error() {
        let err = ContextError::UnknownTenant("acme.example.com".to_string());
        assert!(matches!(err, ContextError::UnknownTenant(_)));
    }
}
