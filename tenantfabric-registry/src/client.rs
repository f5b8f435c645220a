//! Typed, read-mostly access to the control-plane database.
//!
//! The registry client is the sole site that translates snake_case SQL rows
//! into camelCase domain entities; every other component operates on
//! [`crate::types`] values only.

use std::collections::HashMap;

use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::types::*;

mod sql {
    pub const GET_TENANT_BY_ID: &str = r#"
        SELECT t.id, t.slug, t.display_name, t.status, t.deployment_type,
               t.database_provider_id, t.configs, t.configs_updated_at,
               t.feature_flags, t.created_at, t.updated_at, t.provisioned_at,
               d.domain AS primary_domain
        FROM tenants t
        LEFT JOIN tenant_domains d
          ON d.tenant_id = t.id AND d.is_primary = true AND d.verified_at IS NOT NULL
        WHERE t.id = $1
    "#;

    pub const GET_TENANT_BY_SLUG: &str = r#"
        SELECT t.id, t.slug, t.display_name, t.status, t.deployment_type,
               t.database_provider_id, t.configs, t.configs_updated_at,
               t.feature_flags, t.created_at, t.updated_at, t.provisioned_at,
               d.domain AS primary_domain
        FROM tenants t
        LEFT JOIN tenant_domains d
          ON d.tenant_id = t.id AND d.is_primary = true AND d.verified_at IS NOT NULL
        WHERE t.slug = $1
    "#;

    pub const GET_TENANT_DATABASE_CONFIG: &str = r#"
        SELECT p.id AS provider_id, p.database_host, p.database_port, p.database_name,
               p.database_username, p.database_password_encrypted, p.database_ssl,
               p.database_pool_max
        FROM tenants t
        JOIN database_providers p ON p.id = t.database_provider_id
        WHERE t.id = $1
    "#;

    pub const GET_TENANT_BY_DOMAIN: &str = r#"
        SELECT t.id, t.slug, t.display_name, t.status, t.deployment_type,
               t.database_provider_id, t.configs, t.configs_updated_at,
               t.feature_flags, t.created_at, t.updated_at, t.provisioned_at,
               d.domain AS primary_domain,
               o.id AS org_id, o.tenant_id AS org_tenant_id, o.slug AS org_slug,
               o.display_name AS org_display_name, o.schema_name AS org_schema_name,
               o.status AS org_status, o.is_default AS org_is_default,
               o.created_at AS org_created_at, o.updated_at AS org_updated_at
        FROM tenant_domains d
        JOIN tenants t ON t.id = d.tenant_id
        JOIN orgs o ON o.tenant_id = t.id AND o.is_default = true
        WHERE lower(d.domain) = lower($1) AND d.verified_at IS NOT NULL AND t.status = 'active'
    "#;

    pub const LIST_TENANTS: &str = r#"
        SELECT t.id, t.slug, t.display_name, t.status,
               d.domain AS primary_domain
        FROM tenants t
        LEFT JOIN tenant_domains d
          ON d.tenant_id = t.id AND d.is_primary = true AND d.verified_at IS NOT NULL
        ORDER BY t.created_at ASC
    "#;

    pub const LIST_ALL_ACTIVE_TENANTS: &str = r#"
        SELECT t.id, t.slug, t.display_name, t.status, t.deployment_type,
               t.database_provider_id, t.configs, t.configs_updated_at,
               t.feature_flags, t.created_at, t.updated_at, t.provisioned_at,
               d.domain AS primary_domain
        FROM tenants t
        LEFT JOIN tenant_domains d
          ON d.tenant_id = t.id AND d.is_primary = true AND d.verified_at IS NOT NULL
        WHERE t.status = 'active'
        ORDER BY t.created_at ASC
    "#;

    pub const LIST_TENANTS_WITH_DEFAULT_ORG: &str = r#"
        SELECT t.id, t.slug, t.display_name,
               d.domain AS primary_domain,
               o.id AS default_org_id
        FROM tenants t
        LEFT JOIN tenant_domains d
          ON d.tenant_id = t.id AND d.is_primary = true AND d.verified_at IS NOT NULL
        LEFT JOIN orgs o ON o.tenant_id = t.id AND o.is_default = true
        ORDER BY t.created_at ASC
    "#;

    pub const GET_ORG_BY_ID: &str = r#"
        SELECT id, tenant_id, slug, display_name, schema_name, status, is_default,
               created_at, updated_at
        FROM orgs WHERE id = $1
    "#;

    pub const GET_ORG_BY_SLUG: &str = r#"
        SELECT id, tenant_id, slug, display_name, schema_name, status, is_default,
               created_at, updated_at
        FROM orgs WHERE tenant_id = $1 AND slug = $2
    "#;

    pub const GET_DEFAULT_ORG: &str = r#"
        SELECT id, tenant_id, slug, display_name, schema_name, status, is_default,
               created_at, updated_at
        FROM orgs WHERE tenant_id = $1 AND is_default = true
    "#;

    pub const LIST_ORGS: &str = r#"
        SELECT id, tenant_id, slug, display_name, schema_name, status, is_default,
               created_at, updated_at
        FROM orgs WHERE tenant_id = $1
        ORDER BY created_at ASC
    "#;

    pub const LIST_ALL_ACTIVE_ORGS: &str = r#"
        SELECT id, tenant_id, slug, display_name, schema_name, status, is_default,
               created_at, updated_at
        FROM orgs WHERE tenant_id = $1 AND status = 'active'
        ORDER BY created_at ASC
    "#;

    pub const GET_TENANT_ORG_BY_INSTALLATION_ID: &str = r#"
        SELECT t.id AS tenant_id, t.slug AS tenant_slug, t.display_name AS tenant_display_name,
               t.status AS tenant_status, t.deployment_type, t.database_provider_id,
               t.configs, t.configs_updated_at, t.feature_flags, t.created_at AS tenant_created_at,
               t.updated_at AS tenant_updated_at, t.provisioned_at,
               o.id AS org_id, o.tenant_id AS org_tenant_id, o.slug AS org_slug,
               o.display_name AS org_display_name, o.schema_name AS org_schema_name,
               o.status AS org_status, o.is_default AS org_is_default,
               o.created_at AS org_created_at, o.updated_at AS org_updated_at
        FROM github_installation_mappings m
        JOIN tenants t ON t.id = m.tenant_id AND t.status = 'active'
        JOIN orgs o ON o.id = m.org_id AND o.status = 'active'
        WHERE m.installation_id = $1
    "#;

    pub const DELETE_STALE_INSTALLATION_MAPPINGS: &str = r#"
        DELETE FROM github_installation_mappings
        WHERE github_account_login = $1 AND installation_id != $2
    "#;

    pub const UPSERT_INSTALLATION_MAPPING: &str = r#"
        INSERT INTO github_installation_mappings
          (installation_id, tenant_id, org_id, github_account_login, github_account_type)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (installation_id) DO UPDATE SET
          tenant_id = EXCLUDED.tenant_id,
          org_id = EXCLUDED.org_id,
          github_account_login = EXCLUDED.github_account_login,
          github_account_type = EXCLUDED.github_account_type,
          updated_at = now()
    "#;

    pub const INSERT_INSTALLATION_MAPPING_IF_ABSENT: &str = r#"
        INSERT INTO github_installation_mappings
          (installation_id, tenant_id, org_id, github_account_login, github_account_type)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (installation_id) DO NOTHING
    "#;

    pub const DELETE_INSTALLATION_MAPPING: &str = r#"
        DELETE FROM github_installation_mappings WHERE installation_id = $1
    "#;
}

fn row_to_tenant(row: &Row) -> RegistryResult<Tenant> {
    let status_str: String = row.try_get("status")?;
    let deployment_str: String = row.try_get("deployment_type")?;
    let feature_flags_json: serde_json::Value =
        row.try_get("feature_flags").unwrap_or(serde_json::Value::Null);
    let feature_flags: HashMap<String, bool> = match feature_flags_json {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_bool().map(|b| (k, b)))
            .collect(),
        _ => HashMap::new(),
    };

    Ok(Tenant {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        display_name: row.try_get("display_name")?,
        status: TenantStatus::from_str_opt(&status_str)
            .ok_or_else(|| RegistryError::row_mapping(format!("unknown tenant status {status_str}")))?,
        deployment_type: DeploymentType::from_str_opt(&deployment_str).ok_or_else(|| {
            RegistryError::row_mapping(format!("unknown deployment type {deployment_str}"))
        })?,
        database_provider_id: row.try_get("database_provider_id")?,
        configs: row.try_get("configs").unwrap_or(serde_json::Value::Null),
        configs_updated_at: row.try_get("configs_updated_at")?,
        feature_flags,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        provisioned_at: row.try_get("provisioned_at")?,
        primary_domain: row.try_get("primary_domain")?,
    })
}

fn row_to_org(row: &Row) -> RegistryResult<Org> {
    row_to_org_prefixed(row, "")
}

fn row_to_org_prefixed(row: &Row, prefix: &str) -> RegistryResult<Org> {
    let col = |name: &str| -> String { format!("{prefix}{name}") };
    let status_str: String = row.try_get(col("status").as_str())?;
    Ok(Org {
        id: row.try_get(col("id").as_str())?,
        tenant_id: row.try_get(col("tenant_id").as_str())?,
        slug: row.try_get(col("slug").as_str())?,
        display_name: row.try_get(col("display_name").as_str())?,
        schema_name: row.try_get(col("schema_name").as_str())?,
        status: OrgStatus::from_str_opt(&status_str)
            .ok_or_else(|| RegistryError::row_mapping(format!("unknown org status {status_str}")))?,
        is_default: row.try_get(col("is_default").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

/// A typed client over the control-plane registry database.
///
/// Cloning is cheap: the inner pool is reference counted.
#[derive(Clone)]
pub struct RegistryClient {
    pool: Pool,
}

impl RegistryClient {
    /// Connect using a `postgres://` URL, matching `MULTI_TENANT_REGISTRY_URL`.
    pub fn connect(database_url: &str) -> RegistryResult<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(database_url.to_string());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RegistryError::config(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn get_tenant(&self, id: Uuid) -> RegistryResult<Option<Tenant>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql::GET_TENANT_BY_ID, &[&id]).await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> RegistryResult<Option<Tenant>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql::GET_TENANT_BY_SLUG, &[&slug]).await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    pub async fn get_tenant_database_config(
        &self,
        tenant_id: Uuid,
    ) -> RegistryResult<Option<DatabaseConfig>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(sql::GET_TENANT_DATABASE_CONFIG, &[&tenant_id])
            .await?;
        let Some(row) = row else { return Ok(None) };
        let port: i32 = row.try_get("database_port")?;
        Ok(Some(DatabaseConfig {
            provider_id: row.try_get("provider_id")?,
            host: row.try_get("database_host")?,
            port: port as u16,
            database_name: row.try_get("database_name")?,
            username: row.try_get("database_username")?,
            password_encrypted: row.try_get("database_password_encrypted")?,
            ssl: row.try_get("database_ssl")?,
            pool_max: row.try_get::<_, i32>("database_pool_max")? as u32,
        }))
    }

    /// Looks up a tenant by its (lowercased) verified custom domain, paired
    /// with its default org. Property 8: case-insensitive on the input.
    pub async fn get_tenant_by_domain(&self, domain: &str) -> RegistryResult<Option<TenantByDomain>> {
        let lowered = domain.to_lowercase();
        let client = self.pool.get().await?;
        let row = client
            .query_opt(sql::GET_TENANT_BY_DOMAIN, &[&lowered])
            .await?;
        let Some(row) = row else { return Ok(None) };
        let tenant = row_to_tenant(&row)?;
        let org = row_to_org_prefixed(&row, "org_")?;
        Ok(Some(TenantByDomain {
            tenant,
            default_org: org,
        }))
    }

    pub async fn list_tenants(&self) -> RegistryResult<Vec<TenantSummary>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql::LIST_TENANTS, &[]).await?;
        rows.iter()
            .map(|row| {
                let status_str: String = row.try_get("status")?;
                Ok(TenantSummary {
                    id: row.try_get("id")?,
                    slug: row.try_get("slug")?,
                    display_name: row.try_get("display_name")?,
                    status: TenantStatus::from_str_opt(&status_str).ok_or_else(|| {
                        RegistryError::row_mapping(format!("unknown tenant status {status_str}"))
                    })?,
                    primary_domain: row.try_get("primary_domain")?,
                })
            })
            .collect()
    }

    pub async fn list_all_active_tenants(&self) -> RegistryResult<Vec<Tenant>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql::LIST_ALL_ACTIVE_TENANTS, &[]).await?;
        rows.iter().map(row_to_tenant).collect()
    }

    pub async fn list_tenants_with_default_org(&self) -> RegistryResult<Vec<TenantWithDefaultOrg>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql::LIST_TENANTS_WITH_DEFAULT_ORG, &[]).await?;
        rows.iter()
            .map(|row| {
                Ok(TenantWithDefaultOrg {
                    id: row.try_get("id")?,
                    slug: row.try_get("slug")?,
                    display_name: row.try_get("display_name")?,
                    primary_domain: row.try_get("primary_domain")?,
                    default_org_id: row.try_get("default_org_id")?,
                })
            })
            .collect()
    }

    pub async fn get_org(&self, id: Uuid) -> RegistryResult<Option<Org>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql::GET_ORG_BY_ID, &[&id]).await?;
        row.as_ref().map(row_to_org).transpose()
    }

    pub async fn get_org_by_slug(&self, tenant_id: Uuid, slug: &str) -> RegistryResult<Option<Org>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(sql::GET_ORG_BY_SLUG, &[&tenant_id, &slug])
            .await?;
        row.as_ref().map(row_to_org).transpose()
    }

    pub async fn get_default_org(&self, tenant_id: Uuid) -> RegistryResult<Option<Org>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql::GET_DEFAULT_ORG, &[&tenant_id]).await?;
        row.as_ref().map(row_to_org).transpose()
    }

    pub async fn list_orgs(&self, tenant_id: Uuid) -> RegistryResult<Vec<Org>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql::LIST_ORGS, &[&tenant_id]).await?;
        rows.iter().map(row_to_org).collect()
    }

    pub async fn list_all_active_orgs(&self, tenant_id: Uuid) -> RegistryResult<Vec<Org>> {
        let client = self.pool.get().await?;
        let rows = client.query(sql::LIST_ALL_ACTIVE_ORGS, &[&tenant_id]).await?;
        rows.iter().map(row_to_org).collect()
    }

    pub async fn get_tenant_org_by_installation_id(
        &self,
        installation_id: i64,
    ) -> RegistryResult<Option<TenantOrgPair>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(sql::GET_TENANT_ORG_BY_INSTALLATION_ID, &[&installation_id])
            .await?;
        let Some(row) = row else { return Ok(None) };
        let status_str: String = row.try_get("tenant_status")?;
        let deployment_str: String = row.try_get("deployment_type")?;
        let tenant = Tenant {
            id: row.try_get("tenant_id")?,
            slug: row.try_get("tenant_slug")?,
            display_name: row.try_get("tenant_display_name")?,
            status: TenantStatus::from_str_opt(&status_str)
                .ok_or_else(|| RegistryError::row_mapping("unknown tenant status"))?,
            deployment_type: DeploymentType::from_str_opt(&deployment_str)
                .ok_or_else(|| RegistryError::row_mapping("unknown deployment type"))?,
            database_provider_id: row.try_get("database_provider_id")?,
            configs: row.try_get("configs").unwrap_or(serde_json::Value::Null),
            configs_updated_at: row.try_get("configs_updated_at")?,
            feature_flags: HashMap::new(),
            created_at: row.try_get("tenant_created_at")?,
            updated_at: row.try_get("tenant_updated_at")?,
            provisioned_at: row.try_get("provisioned_at")?,
            primary_domain: None,
        };
        let org = row_to_org_prefixed(&row, "org_")?;
        Ok(Some(TenantOrgPair { tenant, org }))
    }

    /// Upsert: replaces the mapping on `installation_id` conflict. Stale rows
    /// for the same account login under a different installation id are
    /// deleted first, inside the same transaction.
    pub async fn create_installation_mapping(
        &self,
        params: &InstallationMappingParams,
    ) -> RegistryResult<()> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;
        txn.execute(
            sql::DELETE_STALE_INSTALLATION_MAPPINGS,
            &[&params.github_account_login, &params.installation_id],
        )
        .await?;
        txn.execute(
            sql::UPSERT_INSTALLATION_MAPPING,
            &[
                &params.installation_id,
                &params.tenant_id,
                &params.org_id,
                &params.github_account_login,
                &params.github_account_type,
            ],
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }

    /// Gap-fill only: never overwrites an existing row for `installation_id`.
    /// Returns whether a new row was actually inserted.
    pub async fn ensure_installation_mapping(
        &self,
        params: &InstallationMappingParams,
    ) -> RegistryResult<bool> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;
        txn.execute(
            sql::DELETE_STALE_INSTALLATION_MAPPINGS,
            &[&params.github_account_login, &params.installation_id],
        )
        .await?;
        let inserted = txn
            .execute(
                sql::INSERT_INSTALLATION_MAPPING_IF_ABSENT,
                &[
                    &params.installation_id,
                    &params.tenant_id,
                    &params.org_id,
                    &params.github_account_login,
                    &params.github_account_type,
                ],
            )
            .await?;
        txn.commit().await?;
        Ok(inserted > 0)
    }

    pub async fn delete_installation_mapping(&self, installation_id: i64) -> RegistryResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(sql::DELETE_INSTALLATION_MAPPING, &[&installation_id])
            .await?;
        Ok(())
    }

    /// Releases the underlying pool. The pool closes its idle connections on
    /// drop; this method exists so callers have an explicit lifecycle hook
    /// symmetric with the rest of the core's `close()` operations.
    pub async fn close(&self) -> RegistryResult<()> {
        self.pool.close();
        Ok(())
    }
}
