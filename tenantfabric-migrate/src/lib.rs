//! # tenantfabric-migrate
//!
//! Canary-first fleet schema migration for the tenant fabric, plus the
//! best-effort dev auto-migrator run at application startup.
//!
//! ## Modes
//!
//! - **Live**: migrate the canary org first; on success, migrate the rest
//!   of the fleet in listing order; halt on the first fleet-halting failure.
//! - **Check-only**: prove every org's connection is reachable without
//!   issuing any DDL.
//! - **Dry-run**: run catalog-sync against the canary inside a transaction
//!   that is always rolled back, and report the diff it would have produced.
//!
//! Catalog-sync itself — the ORM's actual schema-sync routine — is an
//! injected [`engine::CatalogSyncFn`], not owned by this crate: the engine
//! only drives connection lifecycle, snapshotting, and diffing around it.
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │ build_fleet│──▶│ resolve_canary│──▶│ per-org run│──▶│ diff/report│
//! └────────────┘   └──────────────┘   └────────────┘   └──────────┘
//! ```

pub mod ddl_log;
pub mod dev_migrate;
pub mod diff;
pub mod engine;
pub mod error;
pub mod snapshot;

pub use ddl_log::filter_ddl_lines;
pub use dev_migrate::{
    run_dev_auto_migrate, DevMigratePreconditions, DevMigrateOutcome, DevMigrateReport,
};
pub use diff::{diff, format_pseudo_ddl, normalize_default, DiffEntry, DiffKind};
pub use engine::{
    identity_catalog_sync, BoxFuture, CanaryOverride, CatalogSyncFn, CatalogSyncOptions,
    CheckOutcome, CheckReport, DryRunReport, FleetMember, LiveSummary, MigrationEngine, OrgOutcome,
};
pub use error::{InitFailureSource, MigrateError, MigrateResult};
pub use snapshot::{capture_snapshot, ColumnInfo, SchemaSnapshot};

pub mod prelude {
    pub use crate::dev_migrate::{run_dev_auto_migrate, DevMigratePreconditions, DevMigrateReport};
    pub use crate::engine::{CanaryOverride, CatalogSyncFn, CatalogSyncOptions, MigrationEngine};
    pub use crate::error::{MigrateError, MigrateResult};
}
