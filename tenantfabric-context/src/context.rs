//! Ambient tenant context: task-local propagation of the acting (tenant, org).
//!
//! Built on `tokio::task_local!`, the same mechanism the teacher's
//! zero-allocation tenant scope used, narrowed to the spec's concrete
//! `{tenant, org, schema_name, database}` record and its exact nested-shadow
//! semantics: leaving an inner `run_with` region restores the outer binding
//! exactly, and reading after every region has exited returns `None`.

use std::future::Future;
use std::sync::Arc;

use tenantfabric_pool::Database;
use tenantfabric_registry::{Org, Tenant};

use crate::error::ContextError;

/// The ambient record that flows with all work initiated inside `run_with`.
#[derive(Clone)]
pub struct Context {
    pub tenant: Tenant,
    pub org: Org,
    pub schema_name: String,
    pub database: Arc<Database>,
}

impl Context {
    /// Build a context for `(tenant, org)`, bound to an already-resolved handle.
    pub fn new(tenant: Tenant, org: Org, database: Arc<Database>) -> Self {
        let schema_name = org.schema_name.clone();
        Self {
            tenant,
            org,
            schema_name,
            database,
        }
    }
}

tokio::task_local! {
    static CONTEXT: Context;
}

/// Bind `context` for the duration of `f`.
///
/// Nested `run_with` calls shadow, not mutate: when an inner call returns,
/// `get()` observes exactly the outer binding again.
pub async fn run_with<F, T>(context: Context, f: F) -> T
where
    F: Future<Output = T>,
{
    CONTEXT.scope(context, f).await
}

/// The bound context, or `None` outside any `run_with` region.
pub fn get() -> Option<Context> {
    CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

/// The bound context, or [`ContextError::NoTenantContext`] outside any region.
pub fn require() -> Result<Context, ContextError> {
    get().ok_or(ContextError::NoTenantContext)
}

/// The bound schema name, or [`ContextError::NoTenantContext`].
pub fn require_schema_name() -> Result<String, ContextError> {
    require().map(|ctx| ctx.schema_name)
}

/// The bound database handle, or [`ContextError::NoTenantContext`].
pub fn require_database() -> Result<Arc<Database>, ContextError> {
    require().map(|ctx| ctx.database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tenantfabric_pool::{PgConfig, PgPool, PoolConfig};
    use tenantfabric_registry::{DeploymentType, OrgStatus, TenantStatus};
    use uuid::Uuid;

    async fn fake_context(schema_name: &str) -> Context {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            slug: "acme".into(),
            display_name: "Acme".into(),
            status: TenantStatus::Active,
            deployment_type: DeploymentType::Shared,
            database_provider_id: None,
            configs: serde_json::Value::Null,
            configs_updated_at: None,
            feature_flags: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            provisioned_at: None,
            primary_domain: None,
        };
        let org = Org {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            slug: schema_name.into(),
            display_name: schema_name.into(),
            schema_name: schema_name.into(),
            status: OrgStatus::Active,
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let pool = PgPool::with_schema(
            PgConfig::from_url("postgresql://localhost/test").unwrap(),
            PoolConfig::default(),
            schema_name,
        )
        .await
        .unwrap();
        Context::new(tenant, org, Arc::new(Database::new(pool)))
    }

    #[tokio::test]
    async fn get_outside_region_is_none() {
        assert!(get().is_none());
        assert!(matches!(require(), Err(ContextError::NoTenantContext)));
    }

    #[tokio::test]
    async fn nested_run_with_shadows_then_restores() {
        let outer = fake_context("org_outer").await;
        let inner = fake_context("org_inner").await;

        run_with(outer, async {
            assert_eq!(require_schema_name().unwrap(), "org_outer");

            run_with(inner, async {
                assert_eq!(require_schema_name().unwrap(), "org_inner");
            })
            .await;

            assert_eq!(require_schema_name().unwrap(), "org_outer");
        })
        .await;

        assert!(get().is_none());
    }
}
