//! Integration tests for the tenant fabric migration runner's CLI surface.
//!
//! These exercise argument parsing and env-var configuration errors only —
//! anything that reaches the registry or a tenant database requires a real
//! PostgreSQL control-plane database and belongs in a different suite.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn migrate_cmd() -> Command {
    Command::cargo_bin("tenantfabric-migrate-cli").unwrap()
}

#[test]
fn test_help_command() {
    migrate_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migration runner"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--check-only"))
        .stdout(predicate::str::contains("--canary-tenant"))
        .stdout(predicate::str::contains("--canary-org"));
}

#[test]
fn test_version_flag() {
    migrate_cmd().arg("--version").assert().success();
}

#[test]
fn test_missing_registry_url_fails() {
    migrate_cmd()
        .env_remove("MULTI_TENANT_REGISTRY_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MULTI_TENANT_REGISTRY_URL"));
}

#[test]
fn test_skip_schema_migrations_exits_success_without_registry_url() {
    migrate_cmd()
        .env_remove("MULTI_TENANT_REGISTRY_URL")
        .env("SKIP_SCHEMA_MIGRATIONS", "true")
        .assert()
        .success();
}

#[test]
fn test_dry_run_and_check_only_together_is_rejected() {
    migrate_cmd()
        .env("MULTI_TENANT_REGISTRY_URL", "postgresql://localhost/registry")
        .args(["--dry-run", "--check-only"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot both be set"));
}

#[test]
fn test_canary_tenant_without_org_flag_is_accepted_by_clap() {
    // clap itself doesn't enforce the pairing; the engine's validation does,
    // which requires a reachable registry and is covered separately.
    migrate_cmd()
        .args(["--canary-tenant", "acme", "--help"])
        .assert()
        .success();
}
