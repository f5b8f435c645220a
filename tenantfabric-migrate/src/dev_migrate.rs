//! Best-effort, startup-time catalog sync across the whole fleet.
//!
//! Unlike [`crate::engine::MigrationEngine::run_live`], failures here never
//! halt the fleet and never propagate — this runs once at process startup,
//! and a broken org shouldn't take down the rest of the app.

use tracing::{error, info, warn};

use crate::engine::{CatalogSyncFn, CatalogSyncOptions, FleetMember, MigrationEngine};
use crate::error::{InitFailureSource, MigrateError, MigrateResult};

/// Whether the dev auto-migrator should run at all, per its four
/// preconditions.
#[derive(Debug, Clone, Copy)]
pub struct DevMigratePreconditions {
    pub is_development: bool,
    pub is_serverless_preview: bool,
    pub multi_tenant_enabled: bool,
    pub skip_requested: bool,
}

impl DevMigratePreconditions {
    pub fn should_run(&self) -> bool {
        self.is_development
            && !self.is_serverless_preview
            && self.multi_tenant_enabled
            && !self.skip_requested
    }
}

/// Outcome for one org during a dev auto-migrate pass.
#[derive(Debug, Clone)]
pub struct DevMigrateOutcome {
    pub tenant_slug: String,
    pub org_slug: String,
    pub succeeded: bool,
    pub message: Option<String>,
}

/// Summary of a dev auto-migrate pass.
#[derive(Debug, Clone, Default)]
pub struct DevMigrateReport {
    pub outcomes: Vec<DevMigrateOutcome>,
}

impl DevMigrateReport {
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }
}

/// Runs catalog-sync sequentially across every active (tenant, org),
/// logging failures rather than returning early. Returns `Ok(None)` if
/// `preconditions` says not to run at all.
pub async fn run_dev_auto_migrate(
    engine: &MigrationEngine,
    preconditions: DevMigratePreconditions,
) -> MigrateResult<Option<DevMigrateReport>> {
    if !preconditions.should_run() {
        info!("dev auto-migrator skipped: preconditions not met");
        return Ok(None);
    }

    let fleet = engine.build_fleet().await?;
    let mut report = DevMigrateReport::default();

    for member in &fleet {
        let outcome = run_one(engine, member).await;
        if !outcome.succeeded {
            warn!(
                tenant = %outcome.tenant_slug,
                org = %outcome.org_slug,
                message = ?outcome.message,
                "dev auto-migrate failed for org"
            );
        }
        report.outcomes.push(outcome);
    }

    if report.failure_count() > 0 {
        error!(
            failures = report.failure_count(),
            total = report.outcomes.len(),
            "dev auto-migrator finished with failures"
        );
    } else {
        info!(total = report.outcomes.len(), "dev auto-migrator finished cleanly");
    }

    Ok(Some(report))
}

async fn run_one(engine: &MigrationEngine, member: &FleetMember) -> DevMigrateOutcome {
    let result = run_one_inner(engine, member, &engine.catalog_sync()).await;

    match result {
        Ok(()) => DevMigrateOutcome {
            tenant_slug: member.tenant.slug.clone(),
            org_slug: member.org.slug.clone(),
            succeeded: true,
            message: None,
        },
        Err(err) => DevMigrateOutcome {
            tenant_slug: member.tenant.slug.clone(),
            org_slug: member.org.slug.clone(),
            succeeded: false,
            message: Some(err.to_string()),
        },
    }
}

async fn run_one_inner(
    engine: &MigrationEngine,
    member: &FleetMember,
    catalog_sync: &CatalogSyncFn,
) -> MigrateResult<()> {
    let pool = engine.build_pool_for(member).await?;
    let conn = pool.get().await.map_err(MigrateError::from)?;

    let opts = CatalogSyncOptions {
        force_sync: true,
        skip_post_sync: false,
    };
    let (conn, sync_result) = catalog_sync(conn, opts).await;
    drop(conn);

    let database_result = engine.create_database_for(pool).await;
    if let Ok(database) = &database_result {
        engine.close_database(database).await;
    }

    sync_result.map_err(|e| MigrateError::InitFailure {
        tenant_slug: member.tenant.slug.clone(),
        org_slug: member.org.slug.clone(),
        source: InitFailureSource::CatalogSync(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_only_when_all_preconditions_hold() {
        let base = DevMigratePreconditions {
            is_development: true,
            is_serverless_preview: false,
            multi_tenant_enabled: true,
            skip_requested: false,
        };
        assert!(base.should_run());

        assert!(!DevMigratePreconditions {
            is_development: false,
            ..base
        }
        .should_run());
        assert!(!DevMigratePreconditions {
            is_serverless_preview: true,
            ..base
        }
        .should_run());
        assert!(!DevMigratePreconditions {
            multi_tenant_enabled: false,
            ..base
        }
        .should_run());
        assert!(!DevMigratePreconditions {
            skip_requested: true,
            ..base
        }
        .should_run());
    }

    #[test]
    fn failure_count_counts_only_failures() {
        let report = DevMigrateReport {
            outcomes: vec![
                DevMigrateOutcome {
                    tenant_slug: "acme".into(),
                    org_slug: "org_alpha".into(),
                    succeeded: true,
                    message: None,
                },
                DevMigrateOutcome {
                    tenant_slug: "acme".into(),
                    org_slug: "org_beta".into(),
                    succeeded: false,
                    message: Some("boom".into()),
                },
            ],
        };
        assert_eq!(report.failure_count(), 1);
    }

    // A live fleet pass requires a real PostgreSQL control-plane database
    // and injected factories, and is covered as an integration test, not here.
}
