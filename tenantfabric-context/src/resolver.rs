//! Resolves an incoming request to a `(Tenant, Org)` pair.
//!
//! Resolution tries, in order: a verified custom domain, a subdomain under a
//! configured base domain, a claim inside a bearer token (via an injected
//! decoder), and finally a pair of explicit header/path hints. The first
//! strategy that matches wins; nothing further is tried.

use std::sync::Arc;

use tenantfabric_registry::{Org, RegistryClient, Tenant};
use tracing::debug;

use crate::error::ContextError;

/// Claims extracted from a bearer token by the caller-supplied decoder.
///
/// Token decoding itself (signature verification, expiry) is out of scope
/// here: the decoder is injected precisely so this crate never needs to know
/// which JWT library or claim layout is in use.
#[derive(Debug, Clone, Default)]
pub struct TokenClaims {
    pub tenant_slug: Option<String>,
    pub org_slug: Option<String>,
}

/// Decodes a bearer token into tenant/org claims. `None` means the token
/// didn't carry a usable claim (not that it is necessarily invalid).
pub type TokenDecodeFn = Arc<dyn Fn(&str) -> Option<TokenClaims> + Send + Sync>;

/// The request-shaped information the resolver needs. Transport-agnostic:
/// callers build this from whatever HTTP framework they're using.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub host: Option<String>,
    pub headers: Vec<(String, String)>,
    pub bearer_token: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Resolves `(Tenant, Org)` pairs for incoming requests.
#[derive(Clone)]
pub struct Resolver {
    registry: RegistryClient,
    base_domain: Option<String>,
    decode_token: Option<TokenDecodeFn>,
    tenant_header: String,
    org_header: String,
}

impl Resolver {
    pub fn new(registry: RegistryClient) -> Self {
        Self {
            registry,
            base_domain: None,
            decode_token: None,
            tenant_header: "X-Tenant-Slug".to_string(),
            org_header: "X-Org-Slug".to_string(),
        }
    }

    /// Enables step 2 (subdomain matching): a request for `acme.base_domain`
    /// resolves tenant slug `acme`.
    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = Some(base_domain.into());
        self
    }

    /// Enables step 3 (JWT claim matching).
    pub fn with_token_decoder(mut self, decode_token: TokenDecodeFn) -> Self {
        self.decode_token = Some(decode_token);
        self
    }

    /// Overrides the fallback header names used by step 4. Default:
    /// `X-Tenant-Slug` / `X-Org-Slug`.
    pub fn with_header_names(
        mut self,
        tenant_header: impl Into<String>,
        org_header: impl Into<String>,
    ) -> Self {
        self.tenant_header = tenant_header.into();
        self.org_header = org_header.into();
        self
    }

    /// Resolve `request` to a `(Tenant, Org)` pair, trying each strategy in
    /// order and returning on the first match.
    pub async fn resolve(&self, request: &RequestInfo) -> Result<(Tenant, Org), ContextError> {
        if let Some(pair) = self.resolve_by_custom_domain(request).await? {
            return Ok(pair);
        }
        if let Some(pair) = self.resolve_by_subdomain(request).await? {
            return Ok(pair);
        }
        if let Some(pair) = self.resolve_by_token(request).await? {
            return Ok(pair);
        }
        if let Some(pair) = self.resolve_by_headers(request).await? {
            return Ok(pair);
        }

        Err(ContextError::UnknownTenant(
            request.host.clone().unwrap_or_else(|| "<unknown>".to_string()),
        ))
    }

    async fn resolve_by_custom_domain(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<(Tenant, Org)>, ContextError> {
        let Some(host) = &request.host else {
            return Ok(None);
        };
        let Some(found) = self.registry.get_tenant_by_domain(host).await? else {
            return Ok(None);
        };
        debug!(host, tenant_id = %found.tenant.id, "resolved tenant by custom domain");
        Ok(Some((found.tenant, found.default_org)))
    }

    async fn resolve_by_subdomain(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<(Tenant, Org)>, ContextError> {
        let (Some(base_domain), Some(host)) = (&self.base_domain, &request.host) else {
            return Ok(None);
        };
        let suffix = format!(".{base_domain}");
        let host_lower = host.to_lowercase();
        let suffix_lower = suffix.to_lowercase();
        let Some(slug) = host_lower.strip_suffix(&suffix_lower) else {
            return Ok(None);
        };
        if slug.is_empty() {
            return Ok(None);
        }

        self.tenant_and_default_org_by_slug(slug).await
    }

    async fn resolve_by_token(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<(Tenant, Org)>, ContextError> {
        let (Some(decode), Some(token)) = (&self.decode_token, &request.bearer_token) else {
            return Ok(None);
        };
        let Some(claims) = decode(token) else {
            return Ok(None);
        };
        let Some(tenant_slug) = claims.tenant_slug else {
            return Ok(None);
        };

        let Some(tenant) = self.registry.get_tenant_by_slug(&tenant_slug).await? else {
            return Ok(None);
        };

        let org = match claims.org_slug {
            Some(org_slug) => self.registry.get_org_by_slug(tenant.id, &org_slug).await?,
            None => self.registry.get_default_org(tenant.id).await?,
        };
        let Some(org) = org else {
            return Ok(None);
        };

        debug!(tenant_id = %tenant.id, org_id = %org.id, "resolved tenant by token claim");
        Ok(Some((tenant, org)))
    }

    async fn resolve_by_headers(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<(Tenant, Org)>, ContextError> {
        let Some(tenant_slug) = request.header(&self.tenant_header) else {
            return Ok(None);
        };

        let Some(tenant) = self.registry.get_tenant_by_slug(tenant_slug).await? else {
            return Ok(None);
        };

        let org = match request.header(&self.org_header) {
            Some(org_slug) => self.registry.get_org_by_slug(tenant.id, org_slug).await?,
            None => self.registry.get_default_org(tenant.id).await?,
        };
        let Some(org) = org else {
            return Ok(None);
        };

        debug!(tenant_id = %tenant.id, org_id = %org.id, "resolved tenant by header fallback");
        Ok(Some((tenant, org)))
    }

    async fn tenant_and_default_org_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<(Tenant, Org)>, ContextError> {
        let Some(tenant) = self.registry.get_tenant_by_slug(slug).await? else {
            return Ok(None);
        };
        let Some(org) = self.registry.get_default_org(tenant.id).await? else {
            return Ok(None);
        };
        Ok(Some((tenant, org)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_info_header_lookup_is_case_insensitive() {
        let request = RequestInfo::new().with_header("X-Tenant-Slug", "acme");
        assert_eq!(request.header("x-tenant-slug"), Some("acme"));
        assert_eq!(request.header("X-Org-Slug"), None);
    }

    #[test]
    fn subdomain_suffix_without_slug_does_not_match() {
        // "base.example.com" itself (no subdomain label) must not resolve as
        // slug "" against base_domain "example.com".
        let host = "example.com";
        let suffix = ".example.com";
        assert!(host.to_lowercase().strip_suffix(suffix).is_none());
    }

    // Strategies that hit the registry (custom domain, subdomain, token,
    // header fallback) require a live control-plane database and are covered
    // as integration tests, not here.
}
