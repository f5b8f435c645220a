//! Wires the environment, the registry, and an injected catalog-sync
//! collaborator into a [`MigrationEngine`] run, and maps its outcome to an
//! exit code.

use std::sync::Arc;

use tenantfabric_migrate::{
    identity_catalog_sync, CanaryOverride, CatalogSyncFn, DryRunReport, LiveSummary,
    MigrationEngine,
};
use tenantfabric_pool::config::SslMode;
use tenantfabric_pool::{identity_create_database, CreateSequelizeFn, DecryptFn, PgConfig, PgPool};
use tenantfabric_registry::RegistryClient;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_DRY_RUN_HAS_CHANGES: i32 = 10;

/// Runs the CLI end to end, returning the process exit code.
///
/// `catalog_sync` is the one genuinely external collaborator this binary
/// cannot supply on its own — the caller's ORM schema-sync routine. A
/// caller with no real ORM layer to wire in may pass
/// [`identity_catalog_sync`], which issues no DDL.
pub async fn run(cli: Cli, catalog_sync: CatalogSyncFn) -> CliResult<i32> {
    cli.validate().map_err(CliError::InvalidArgs)?;

    if crate::config::skip_requested() {
        output::info("SKIP_SCHEMA_MIGRATIONS is set; exiting without migrating");
        return Ok(EXIT_SUCCESS);
    }

    let config = Config::from_env(cli.canary_tenant.clone(), cli.canary_org.clone())?;
    let registry = RegistryClient::connect(&config.registry_url)?;
    let decrypt = build_decrypt(config.password_encryption_key.clone());
    let create_sequelize = build_create_sequelize();

    let engine = MigrationEngine::new(
        registry,
        decrypt,
        create_sequelize,
        identity_create_database(),
        catalog_sync,
    );

    let canary = CanaryOverride {
        tenant_slug: config.canary_tenant_slug.clone(),
        org_slug: config.canary_org_slug.clone(),
    };

    if cli.check_only {
        run_check_only(&engine).await
    } else if cli.dry_run {
        run_dry_run(&engine, &canary, cli.verbose).await
    } else {
        run_live(&engine, &canary, cli.verbose).await
    }
}

/// Convenience entrypoint for a standalone binary with no ORM layer of
/// its own to sync.
pub async fn run_standalone(cli: Cli) -> CliResult<i32> {
    run(cli, identity_catalog_sync()).await
}

async fn run_live(
    engine: &MigrationEngine,
    canary: &CanaryOverride,
    verbose: bool,
) -> CliResult<i32> {
    output::header("Fleet Migration");

    let summary = engine.run_live(canary).await?;
    print_live_summary(&summary, verbose);

    if summary.failed > 0 {
        Ok(EXIT_ERROR)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

fn print_live_summary(summary: &LiveSummary, verbose: bool) {
    for result in &summary.results {
        if verbose {
            output::list_item(&format!(
                "{}/{}: {} change(s)",
                result.tenant_slug, result.org_slug, result.change_count
            ));
        }
    }

    output::newline();
    output::kv("Successful", &summary.successful.to_string());
    output::kv("Failed", &summary.failed.to_string());
    output::kv("Skipped", &summary.skipped.to_string());

    if summary.failed == 0 {
        output::success("fleet migration complete");
    } else {
        output::error("fleet migration halted after a failure");
    }
}

async fn run_check_only(engine: &MigrationEngine) -> CliResult<i32> {
    output::header("Connectivity Check");

    let report = engine.run_check_only().await?;
    for outcome in &report.outcomes {
        if outcome.healthy {
            output::list_item(&format!("{}/{}: ok", outcome.tenant_slug, outcome.org_slug));
        } else {
            output::list_item(&format!(
                "{}/{}: {}",
                outcome.tenant_slug,
                outcome.org_slug,
                outcome.message.as_deref().unwrap_or("unreachable")
            ));
        }
    }

    if report.all_healthy() {
        output::success("all connections healthy");
        Ok(EXIT_SUCCESS)
    } else {
        output::error("one or more connections unhealthy");
        Ok(EXIT_ERROR)
    }
}

async fn run_dry_run(
    engine: &MigrationEngine,
    canary: &CanaryOverride,
    verbose: bool,
) -> CliResult<i32> {
    output::header("Dry Run");

    let Some(report) = engine.run_dry_run(canary).await? else {
        output::info("no orgs in the fleet; nothing to check");
        return Ok(EXIT_SUCCESS);
    };

    print_dry_run_report(&report, verbose);

    if report.has_changes() {
        Ok(EXIT_DRY_RUN_HAS_CHANGES)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

fn print_dry_run_report(report: &DryRunReport, verbose: bool) {
    output::kv("Canary", &format!("{}/{}", report.tenant_slug, report.org_slug));

    if !report.has_changes() {
        output::success("no changes detected");
        return;
    }

    for entry in &report.entries {
        output::list_item(&tenantfabric_migrate::format_pseudo_ddl(entry));
    }
    if verbose {
        output::dim(&format!("{} diff entries total", report.entries.len()));
    }
    output::warn(&format!("{} change(s) would be applied", report.entries.len()));
}

fn build_decrypt(_encryption_key: Option<String>) -> DecryptFn {
    Arc::new(|ciphertext| Ok(ciphertext.to_string()))
}

fn build_create_sequelize() -> CreateSequelizeFn {
    Arc::new(|config, password, schema_name| {
        Box::pin(async move {
            let pg_config = PgConfig::builder()
                .host(config.host)
                .port(config.port)
                .database(config.database_name)
                .user(config.username)
                .password(password)
                .ssl_mode(if config.ssl { SslMode::Require } else { SslMode::Disable })
                .build()
                .map_err(|e| e.to_string())?;

            PgPool::with_schema(pg_config, Default::default(), schema_name)
                .await
                .map_err(|e| e.to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_external_interface_contract() {
        assert_eq!(EXIT_SUCCESS, 0);
        assert_eq!(EXIT_ERROR, 1);
        assert_eq!(EXIT_DRY_RUN_HAS_CHANGES, 10);
    }

    // Building the registry connection, running live/check-only/dry-run
    // end to end, and the decrypt/create_sequelize factories all require a
    // real PostgreSQL control-plane database and are covered as
    // integration tests, not here.
}
