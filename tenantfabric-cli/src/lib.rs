//! # tenantfabric-cli
//!
//! Command-line migration runner for the tenant fabric: wraps
//! [`tenantfabric_migrate::MigrationEngine`] with environment-variable
//! configuration, argument parsing, and exit-code mapping.

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod runner;

pub use cli::Cli;
pub use config::Config;
pub use error::{CliError, CliResult};
pub use runner::{run, run_standalone, EXIT_DRY_RUN_HAS_CHANGES, EXIT_ERROR, EXIT_SUCCESS};
