//! Canary-first fleet schema migration.
//!
//! Three modes share one per-org connection lifecycle (build a short-lived
//! pool through the same factories the connection manager uses, never
//! through its cache):
//!
//! - **Live** actually invokes catalog-sync and keeps the changes.
//! - **Check-only** just proves a connection can be acquired.
//! - **Dry-run** runs catalog-sync inside a transaction against a single
//!   canary and always rolls back.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tenantfabric_pool::{CreateDatabaseFn, CreateSequelizeFn, DecryptFn, PgConnection, PgPool};
use tenantfabric_registry::{Org, RegistryClient, Tenant};
use tracing::{debug, info, warn};

use crate::diff::{diff, DiffEntry};
use crate::error::{InitFailureSource, MigrateError, MigrateResult};
use crate::snapshot::capture_snapshot;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Options passed to every catalog-sync invocation.
#[derive(Debug, Clone, Copy)]
pub struct CatalogSyncOptions {
    pub force_sync: bool,
    pub skip_post_sync: bool,
}

/// Runs the application's catalog-sync step against an already-open
/// connection, handing the connection back afterward regardless of outcome
/// so the caller can capture an `after` snapshot on it.
pub type CatalogSyncFn = Arc<
    dyn Fn(PgConnection, CatalogSyncOptions) -> BoxFuture<(PgConnection, Result<(), String>)>
        + Send
        + Sync,
>;

/// A `catalog_sync` that issues no DDL and always succeeds. There is no
/// real ORM layer in this crate to sync against — callers embedding their
/// own catalog-sync routine supply a real [`CatalogSyncFn`] instead; this
/// exists so the engine and CLI are exercisable without one.
pub fn identity_catalog_sync() -> CatalogSyncFn {
    Arc::new(|conn, _opts| Box::pin(async move { (conn, Ok(())) }))
}

/// One (tenant, org) pair in fleet-processing order.
#[derive(Debug, Clone)]
pub struct FleetMember {
    pub tenant: Tenant,
    pub org: Org,
}

/// Canary override, supplied via CLI flags or environment variables. Both
/// fields must be present together or neither.
#[derive(Debug, Clone, Default)]
pub struct CanaryOverride {
    pub tenant_slug: Option<String>,
    pub org_slug: Option<String>,
}

impl CanaryOverride {
    /// Validates the pairing before any database connection is opened.
    pub fn validate(&self) -> MigrateResult<()> {
        match (&self.tenant_slug, &self.org_slug) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(MigrateError::CanaryArgsMismatch),
        }
    }
}

/// Outcome of processing one org in a live fleet run.
#[derive(Debug, Clone)]
pub struct OrgOutcome {
    pub tenant_slug: String,
    pub org_slug: String,
    pub changes_applied: bool,
    pub change_count: usize,
}

/// Summary of a live fleet migration run.
#[derive(Debug, Clone, Default)]
pub struct LiveSummary {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<OrgOutcome>,
}

/// Outcome of a check-only run against one org.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub tenant_slug: String,
    pub org_slug: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Summary of a check-only run.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn all_healthy(&self) -> bool {
        self.outcomes.iter().all(|o| o.healthy)
    }
}

/// Result of a dry-run against the canary. Not an error: per-spec the
/// operator decides what to do with a non-empty diff.
#[derive(Debug, Clone)]
pub struct DryRunReport {
    pub tenant_slug: String,
    pub org_slug: String,
    pub entries: Vec<DiffEntry>,
}

impl DryRunReport {
    pub fn has_changes(&self) -> bool {
        !self.entries.is_empty()
    }
}

struct Factories {
    registry: RegistryClient,
    decrypt: DecryptFn,
    create_sequelize: CreateSequelizeFn,
    create_database: CreateDatabaseFn,
    catalog_sync: CatalogSyncFn,
}

/// Drives live, check-only, and dry-run migration against the tenant fleet.
pub struct MigrationEngine {
    factories: Factories,
}

impl MigrationEngine {
    pub fn new(
        registry: RegistryClient,
        decrypt: DecryptFn,
        create_sequelize: CreateSequelizeFn,
        create_database: CreateDatabaseFn,
        catalog_sync: CatalogSyncFn,
    ) -> Self {
        Self {
            factories: Factories {
                registry,
                decrypt,
                create_sequelize,
                create_database,
                catalog_sync,
            },
        }
    }

    /// Every active (tenant, org) pair, in the registry's own listing order.
    pub async fn build_fleet(&self) -> MigrateResult<Vec<FleetMember>> {
        let tenants = self.factories.registry.list_all_active_tenants().await?;
        let mut fleet = Vec::new();
        for tenant in tenants {
            let orgs = self
                .factories
                .registry
                .list_all_active_orgs(tenant.id)
                .await?;
            for org in orgs {
                fleet.push(FleetMember {
                    tenant: tenant.clone(),
                    org,
                });
            }
        }
        Ok(fleet)
    }

    /// Resolves the canary member: the configured override if given, else
    /// the first member of `fleet`.
    pub fn resolve_canary(
        &self,
        fleet: &[FleetMember],
        canary: &CanaryOverride,
    ) -> MigrateResult<Option<FleetMember>> {
        canary.validate()?;

        match (&canary.tenant_slug, &canary.org_slug) {
            (Some(tenant_slug), Some(org_slug)) => {
                let member = fleet
                    .iter()
                    .find(|m| &m.tenant.slug == tenant_slug && &m.org.slug == org_slug)
                    .cloned();
                match member {
                    Some(member) => Ok(Some(member)),
                    None => Err(MigrateError::canary_not_found(tenant_slug, org_slug)),
                }
            }
            _ => Ok(fleet.first().cloned()),
        }
    }

    /// Fail-fast: the canary runs first; on success, the remaining fleet
    /// runs in its original order; halts immediately on the first failure.
    pub async fn run_live(&self, canary: &CanaryOverride) -> MigrateResult<LiveSummary> {
        let fleet = self.build_fleet().await?;
        let Some(canary_member) = self.resolve_canary(&fleet, canary)? else {
            return Ok(LiveSummary::default());
        };

        let mut summary = LiveSummary::default();

        if !self.run_one_live(&canary_member, &mut summary).await {
            return Ok(summary);
        }

        for member in fleet.iter().filter(|m| {
            m.tenant.id != canary_member.tenant.id || m.org.id != canary_member.org.id
        }) {
            if !self.run_one_live(member, &mut summary).await {
                break;
            }
        }

        Ok(summary)
    }

    /// Runs the live pipeline for one member, folding the outcome into
    /// `summary`. Returns `false` when the fleet should halt.
    async fn run_one_live(&self, member: &FleetMember, summary: &mut LiveSummary) -> bool {
        match self.migrate_one_live(member).await {
            Ok(outcome) => {
                summary.successful += 1;
                summary.results.push(outcome);
                true
            }
            Err(err) => {
                let halting = err.is_fleet_halting();
                if halting {
                    summary.failed += 1;
                } else {
                    summary.skipped += 1;
                }
                warn!(
                    tenant = %member.tenant.slug,
                    org = %member.org.slug,
                    error = %err,
                    "migration failed"
                );
                !halting
            }
        }
    }

    async fn migrate_one_live(&self, member: &FleetMember) -> MigrateResult<OrgOutcome> {
        let pool = self.build_pool(&member.tenant, &member.org).await?;

        let conn = pool.get().await.map_err(MigrateError::from)?;
        let before = capture_snapshot(&conn).await?;

        let opts = CatalogSyncOptions {
            force_sync: true,
            skip_post_sync: true,
        };
        let (conn, sync_result) = (self.factories.catalog_sync)(conn, opts).await;
        let after = capture_snapshot(&conn).await?;
        drop(conn);

        let database_result = (self.factories.create_database)(pool, true).await.map_err(|e| {
            MigrateError::InitFailure {
                tenant_slug: member.tenant.slug.clone(),
                org_slug: member.org.slug.clone(),
                source: InitFailureSource::CreateDatabase(e),
            }
        });

        if let Ok(database) = &database_result {
            self.close_and_swallow(database).await;
        }

        sync_result.map_err(|e| MigrateError::MigrationFailure {
            tenant_slug: member.tenant.slug.clone(),
            org_slug: member.org.slug.clone(),
            source: e,
        })?;

        let entries = diff(&before, &after);
        let outcome = OrgOutcome {
            tenant_slug: member.tenant.slug.clone(),
            org_slug: member.org.slug.clone(),
            changes_applied: !entries.is_empty(),
            change_count: entries.len(),
        };

        debug!(
            tenant = %member.tenant.slug, org = %member.org.slug,
            change_count = outcome.change_count, "migration complete"
        );

        Ok(outcome)
    }

    /// Connects to every active (tenant, org) and verifies the connection is
    /// usable. Issues no DDL.
    pub async fn run_check_only(&self) -> MigrateResult<CheckReport> {
        let fleet = self.build_fleet().await?;
        let mut outcomes = Vec::new();

        for member in &fleet {
            outcomes.push(self.check_one(member).await);
        }

        Ok(CheckReport { outcomes })
    }

    async fn check_one(&self, member: &FleetMember) -> CheckOutcome {
        let result: MigrateResult<()> = async {
            let pool = self.build_pool(&member.tenant, &member.org).await?;
            let conn = pool.get().await.map_err(MigrateError::from)?;
            conn.query_one("SELECT 1", &[]).await.map_err(MigrateError::from)?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => CheckOutcome {
                tenant_slug: member.tenant.slug.clone(),
                org_slug: member.org.slug.clone(),
                healthy: true,
                message: None,
            },
            Err(err) => CheckOutcome {
                tenant_slug: member.tenant.slug.clone(),
                org_slug: member.org.slug.clone(),
                healthy: false,
                message: Some(err.to_string()),
            },
        }
    }

    /// Against the canary only: open a transaction, snapshot, sync, snapshot,
    /// unconditionally roll back, and report the real delta.
    pub async fn run_dry_run(&self, canary: &CanaryOverride) -> MigrateResult<Option<DryRunReport>> {
        let fleet = self.build_fleet().await?;
        let Some(member) = self.resolve_canary(&fleet, canary)? else {
            return Ok(None);
        };

        let pool = self.build_pool(&member.tenant, &member.org).await?;
        let conn = pool.get().await.map_err(MigrateError::from)?;

        conn.batch_execute("BEGIN").await.map_err(MigrateError::from)?;
        let before = capture_snapshot(&conn).await?;

        let opts = CatalogSyncOptions {
            force_sync: true,
            skip_post_sync: true,
        };
        let (conn, sync_result) = (self.factories.catalog_sync)(conn, opts).await;

        let after = capture_snapshot(&conn).await?;
        conn.batch_execute("ROLLBACK").await.map_err(MigrateError::from)?;

        sync_result.map_err(|e| MigrateError::MigrationFailure {
            tenant_slug: member.tenant.slug.clone(),
            org_slug: member.org.slug.clone(),
            source: e,
        })?;

        let entries = diff(&before, &after);
        info!(
            tenant = %member.tenant.slug, org = %member.org.slug,
            change_count = entries.len(), "dry-run complete"
        );

        Ok(Some(DryRunReport {
            tenant_slug: member.tenant.slug,
            org_slug: member.org.slug,
            entries,
        }))
    }

    async fn build_pool(&self, tenant: &Tenant, org: &Org) -> MigrateResult<PgPool> {
        let config = self
            .factories
            .registry
            .get_tenant_database_config(tenant.id)
            .await?
            .ok_or_else(|| MigrateError::no_database_config(tenant.slug.clone()))?;

        let plaintext = (self.factories.decrypt)(&config.password_encrypted).map_err(|e| {
            MigrateError::InitFailure {
                tenant_slug: tenant.slug.clone(),
                org_slug: org.slug.clone(),
                source: InitFailureSource::Decrypt(e),
            }
        })?;

        (self.factories.create_sequelize)(config, plaintext, org.schema_name.clone())
            .await
            .map_err(|e| MigrateError::InitFailure {
                tenant_slug: tenant.slug.clone(),
                org_slug: org.slug.clone(),
                source: InitFailureSource::CreateSequelize(e),
            })
    }

    async fn close_and_swallow(&self, database: &tenantfabric_pool::Database) {
        if let Err(e) = database.close().await {
            warn!(error = %e, "error closing migration connection");
        }
    }

    /// The injected catalog-sync collaborator, for callers outside this
    /// module that drive their own pipeline (the dev auto-migrator).
    pub(crate) fn catalog_sync(&self) -> CatalogSyncFn {
        Arc::clone(&self.factories.catalog_sync)
    }

    pub(crate) async fn build_pool_for(&self, member: &FleetMember) -> MigrateResult<PgPool> {
        self.build_pool(&member.tenant, &member.org).await
    }

    pub(crate) async fn create_database_for(
        &self,
        pool: PgPool,
    ) -> Result<tenantfabric_pool::Database, String> {
        (self.factories.create_database)(pool, true).await
    }

    pub(crate) async fn close_database(&self, database: &tenantfabric_pool::Database) {
        self.close_and_swallow(database).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canary_override_requires_both_or_neither() {
        assert!(CanaryOverride::default().validate().is_ok());
        assert!(CanaryOverride {
            tenant_slug: Some("acme".into()),
            org_slug: Some("org_alpha".into()),
        }
        .validate()
        .is_ok());
        assert!(CanaryOverride {
            tenant_slug: Some("acme".into()),
            org_slug: None,
        }
        .validate()
        .is_err());
        assert!(CanaryOverride {
            tenant_slug: None,
            org_slug: Some("org_alpha".into()),
        }
        .validate()
        .is_err());
    }

    #[test]
    fn check_report_all_healthy() {
        let report = CheckReport {
            outcomes: vec![
                CheckOutcome {
                    tenant_slug: "acme".into(),
                    org_slug: "org_alpha".into(),
                    healthy: true,
                    message: None,
                },
                CheckOutcome {
                    tenant_slug: "acme".into(),
                    org_slug: "org_beta".into(),
                    healthy: false,
                    message: Some("timeout".into()),
                },
            ],
        };
        assert!(!report.all_healthy());
    }

    #[test]
    fn dry_run_report_has_changes() {
        let empty = DryRunReport {
            tenant_slug: "acme".into(),
            org_slug: "org_alpha".into(),
            entries: vec![],
        };
        assert!(!empty.has_changes());
    }

    // Fleet building, canary resolution against a live registry, and the
    // per-org live/check/dry-run pipelines all require a real PostgreSQL
    // control-plane database and are covered as integration tests, not here.
}
