//! Error types for the migration engine.

use thiserror::Error;

use tenantfabric_registry::RegistryError;

pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The registry query itself failed.
    #[error("registry error: {0}")]
    Registry(String),

    /// The registry has no database configuration for this tenant.
    #[error("no database configuration for tenant {tenant_slug}")]
    NoDatabaseConfig { tenant_slug: String },

    /// Only one of `--canary-tenant`/`--canary-org` (or their environment
    /// equivalents) was supplied.
    #[error("canary tenant and org must be supplied together")]
    CanaryArgsMismatch,

    /// The configured canary tenant/org pair does not match any active row.
    #[error("canary tenant/org not found: {tenant_slug}/{org_slug}")]
    CanaryNotFound { tenant_slug: String, org_slug: String },

    /// The per-org live pipeline failed for `tenant_slug`/`org_slug`.
    #[error("migration failed for {tenant_slug}/{org_slug}: {source}")]
    MigrationFailure {
        tenant_slug: String,
        org_slug: String,
        source: String,
    },

    /// Any error inside the short-lived connection build used by migration
    /// (decrypt, create_sequelize, create_database).
    #[error("failed to build connection for {tenant_slug}/{org_slug}: {source}")]
    InitFailure {
        tenant_slug: String,
        org_slug: String,
        #[source]
        source: InitFailureSource,
    },

    /// Snapshot capture failed.
    #[error("schema snapshot failed: {0}")]
    Snapshot(String),
}

/// The specific collaborator that failed while building a migration-time handle.
#[derive(Debug, Error)]
pub enum InitFailureSource {
    #[error("password decryption failed: {0}")]
    Decrypt(String),
    #[error("failed to build connection pool: {0}")]
    CreateSequelize(String),
    #[error("failed to realize database handle: {0}")]
    CreateDatabase(String),
    #[error("catalog sync failed: {0}")]
    CatalogSync(String),
}

impl From<RegistryError> for MigrateError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err.to_string())
    }
}

impl From<tenantfabric_pool::PgError> for MigrateError {
    fn from(err: tenantfabric_pool::PgError) -> Self {
        Self::Snapshot(err.to_string())
    }
}

impl MigrateError {
    pub fn no_database_config(tenant_slug: impl Into<String>) -> Self {
        Self::NoDatabaseConfig {
            tenant_slug: tenant_slug.into(),
        }
    }

    pub fn canary_not_found(tenant_slug: impl Into<String>, org_slug: impl Into<String>) -> Self {
        Self::CanaryNotFound {
            tenant_slug: tenant_slug.into(),
            org_slug: org_slug.into(),
        }
    }

    /// Whether this error should halt the fleet immediately (fail-fast),
    /// versus being reported for a single skipped tenant.
    pub fn is_fleet_halting(&self) -> bool {
        !matches!(self, Self::NoDatabaseConfig { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canary_args_mismatch_display() {
        let err = MigrateError::CanaryArgsMismatch;
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn no_database_config_is_not_fleet_halting() {
        let err = MigrateError::no_database_config("acme");
        assert!(!err.is_fleet_halting());
    }

    #[test]
    fn migration_failure_is_fleet_halting() {
        let err = MigrateError::MigrationFailure {
            tenant_slug: "acme".into(),
            org_slug: "org_alpha".into(),
            source: "boom".into(),
        };
        assert!(err.is_fleet_halting());
    }
}
