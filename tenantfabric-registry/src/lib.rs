//! # tenantfabric-registry
//!
//! Typed, read-mostly access to the control-plane database: tenants, orgs,
//! database providers, custom domains, and GitHub installation mappings.
//!
//! The client performs no retry and no caching of its own — it is the
//! bottom of the dependency graph; the connection manager and migration
//! engine both sit above it.

pub mod client;
pub mod error;
pub mod types;

pub use client::RegistryClient;
pub use error::{RegistryError, RegistryResult};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_status_round_trips() {
        for s in ["active", "provisioned", "suspended", "archived"] {
            let parsed = TenantStatus::from_str_opt(s).expect("known status");
            assert_eq!(parsed.as_str(), s);
        }
        assert!(TenantStatus::from_str_opt("bogus").is_none());
    }

    #[test]
    fn deployment_type_round_trips() {
        assert!(matches!(
            DeploymentType::from_str_opt("shared"),
            Some(DeploymentType::Shared)
        ));
        assert!(matches!(
            DeploymentType::from_str_opt("dedicated"),
            Some(DeploymentType::Dedicated)
        ));
        assert!(DeploymentType::from_str_opt("other").is_none());
    }

    #[test]
    fn tenant_summary_has_no_credential_fields() {
        // Property 9: the struct itself has no password-shaped field, so no
        // serialization path through `TenantSummary` can leak one.
        let summary = TenantSummary {
            id: uuid::Uuid::nil(),
            slug: "acme".into(),
            display_name: "Acme".into(),
            status: TenantStatus::Active,
            primary_domain: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("password_encrypted").is_none());
    }
}
