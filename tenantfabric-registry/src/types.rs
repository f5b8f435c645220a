//! Domain entities returned by the registry client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status of a [`Tenant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Provisioned,
    Suspended,
    Archived,
}

impl TenantStatus {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "provisioned" => Some(Self::Provisioned),
            "suspended" => Some(Self::Suspended),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Provisioned => "provisioned",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
        }
    }
}

/// Deployment model for a tenant's database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Shared,
    Dedicated,
}

impl DeploymentType {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "shared" => Some(Self::Shared),
            "dedicated" => Some(Self::Dedicated),
            _ => None,
        }
    }
}

/// A top-level customer isolation boundary.
///
/// Never carries credential fields: those live only on [`DatabaseConfig`],
/// reachable exclusively through `get_tenant_database_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub status: TenantStatus,
    pub deployment_type: DeploymentType,
    pub database_provider_id: Option<Uuid>,
    pub configs: Json,
    pub configs_updated_at: Option<DateTime<Utc>>,
    pub feature_flags: HashMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provisioned_at: Option<DateTime<Utc>>,
    /// Verified primary custom domain, derived via a join against
    /// `tenant_domains`. Never persisted on the tenant row itself.
    pub primary_domain: Option<String>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// Non-credential projection used by tenant-switcher and listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub status: TenantStatus,
    pub primary_domain: Option<String>,
}

/// Single row of `list_tenants_with_default_org`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantWithDefaultOrg {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub primary_domain: Option<String>,
    pub default_org_id: Option<Uuid>,
}

/// Physical connection credentials for one or more tenants on a shared deployment.
///
/// Distinct from [`Tenant`] on purpose: this is the only type that ever
/// carries the encrypted password, so no web-facing serializer accidentally
/// leaks it by re-using the `Tenant` projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub provider_id: Uuid,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub password_encrypted: String,
    pub ssl: bool,
    pub pool_max: u32,
}

/// Lifecycle status of an [`Org`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgStatus {
    Active,
    Suspended,
    Archived,
}

impl OrgStatus {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// A logical workspace inside a tenant. Owns exactly one PostgreSQL schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub schema_name: String,
    pub status: OrgStatus,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Org {
    pub fn is_active(&self) -> bool {
        self.status == OrgStatus::Active
    }
}

/// Custom verified domain to tenant mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDomain {
    pub domain: String,
    pub tenant_id: Uuid,
    pub is_primary: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl TenantDomain {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

/// Binds an external GitHub App installation id to a (tenant, org) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubInstallationMapping {
    pub id: Uuid,
    pub installation_id: i64,
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub github_account_login: String,
    pub github_account_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters to create or ensure a [`GithubInstallationMapping`].
#[derive(Debug, Clone)]
pub struct InstallationMappingParams {
    pub installation_id: i64,
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub github_account_login: String,
    pub github_account_type: String,
}

/// Result of `get_tenant_by_domain`: the tenant plus its default org.
#[derive(Debug, Clone)]
pub struct TenantByDomain {
    pub tenant: Tenant,
    pub default_org: Org,
}

/// Result of `get_tenant_org_by_installation_id`.
#[derive(Debug, Clone)]
pub struct TenantOrgPair {
    pub tenant: Tenant,
    pub org: Org,
}
