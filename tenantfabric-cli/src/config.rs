//! Environment-variable configuration for the migration runner.
//!
//! All variables the core recognizes, per the external-interfaces contract;
//! this CLI only reads the subset relevant to running a migration.

use std::env;

use crate::error::{CliError, CliResult};

/// Resolved configuration for one invocation of the migration runner.
#[derive(Debug, Clone)]
pub struct Config {
    pub registry_url: String,
    pub password_encryption_key: Option<String>,
    pub skip_schema_migrations: bool,
    pub canary_tenant_slug: Option<String>,
    pub canary_org_slug: Option<String>,
}

/// Whether `SKIP_SCHEMA_MIGRATIONS` is set, checked ahead of everything
/// else so the CLI can early-exit without requiring `MULTI_TENANT_REGISTRY_URL`
/// to be configured at all.
pub fn skip_requested() -> bool {
    truthy(env::var("SKIP_SCHEMA_MIGRATIONS").ok().as_deref())
}

impl Config {
    /// Load from the process environment. `cli_canary_tenant`/`cli_canary_org`
    /// take precedence over `CANARY_TENANT_SLUG`/`CANARY_ORG_SLUG` when set.
    pub fn from_env(
        cli_canary_tenant: Option<String>,
        cli_canary_org: Option<String>,
    ) -> CliResult<Self> {
        let registry_url = env::var("MULTI_TENANT_REGISTRY_URL").map_err(|_| {
            CliError::Config("MULTI_TENANT_REGISTRY_URL is required".to_string())
        })?;

        let password_encryption_key = env::var("DB_PASSWORD_ENCRYPTION_KEY").ok();
        let skip_schema_migrations = truthy(env::var("SKIP_SCHEMA_MIGRATIONS").ok().as_deref());

        let canary_tenant_slug = cli_canary_tenant.or_else(|| env::var("CANARY_TENANT_SLUG").ok());
        let canary_org_slug = cli_canary_org.or_else(|| env::var("CANARY_ORG_SLUG").ok());

        Ok(Self {
            registry_url,
            password_encryption_key,
            skip_schema_migrations,
            canary_tenant_slug,
            canary_org_slug,
        })
    }
}

fn truthy(value: Option<&str>) -> bool {
    matches!(value.map(str::to_ascii_lowercase).as_deref(), Some("true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_recognizes_common_forms() {
        assert!(truthy(Some("true")));
        assert!(truthy(Some("TRUE")));
        assert!(truthy(Some("1")));
        assert!(!truthy(Some("false")));
        assert!(!truthy(None));
    }
}
