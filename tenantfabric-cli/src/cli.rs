//! CLI argument definitions using clap.

use clap::Parser;

/// Tenant fabric migration runner.
#[derive(Parser, Debug)]
#[command(name = "tenantfabric-migrate")]
#[command(version)]
#[command(about = "Canary-first fleet schema migration runner", long_about = None)]
pub struct Cli {
    /// Open a transaction against the canary, run catalog-sync, capture the
    /// diff, and always roll back. Never mutates the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Connect to every active (tenant, org) and verify the connection is
    /// usable. Issues no DDL.
    #[arg(long)]
    pub check_only: bool,

    /// Print per-org progress and the DDL catalog-sync actually issued.
    #[arg(short, long)]
    pub verbose: bool,

    /// Override canary tenant selection. Must be supplied together with
    /// `--canary-org`.
    #[arg(long)]
    pub canary_tenant: Option<String>,

    /// Override canary org selection. Must be supplied together with
    /// `--canary-tenant`.
    #[arg(long)]
    pub canary_org: Option<String>,
}

impl Cli {
    /// `--dry-run` and `--check-only` are mutually exclusive modes.
    pub fn validate(&self) -> Result<(), String> {
        if self.dry_run && self.check_only {
            return Err("--dry-run and --check-only cannot both be set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dry_run_and_check_only_together_is_rejected() {
        let cli = Cli {
            dry_run: true,
            check_only: true,
            verbose: false,
            canary_tenant: None,
            canary_org: None,
        };
        assert!(cli.validate().is_err());
    }
}
