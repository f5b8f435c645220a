//! # tenantfabric-context
//!
//! Ambient tenant context and request resolution.
//!
//! The acting `(tenant, org)` pair flows through a task-local [`Context`],
//! bound for the lifetime of a request by [`resolve_and_run`] and readable
//! anywhere downstream via [`context::get`]/[`context::require`]. Resolution
//! tries, in order: a verified custom domain, a subdomain under a configured
//! base domain, a claim inside a bearer token, and an explicit header pair.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenantfabric_context::{Resolver, RequestInfo, resolve_and_run, context};
//!
//! let resolver = Resolver::new(registry).with_base_domain("example.com");
//! let request = RequestInfo::new().with_host("acme.example.com");
//!
//! resolve_and_run(&resolver, &manager, &request, || async {
//!     let schema = context::require_schema_name().unwrap();
//!     println!("serving schema {schema}");
//! })
//! .await?;
//! ```

pub mod context;
pub mod error;
pub mod middleware;
pub mod resolver;

pub use context::{get, require, require_database, require_schema_name, run_with, Context};
pub use error::{ContextError, MiddlewareError};
pub use middleware::resolve_and_run;
pub use resolver::{RequestInfo, Resolver, TokenClaims, TokenDecodeFn};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::{self, Context};
    pub use crate::error::{ContextError, MiddlewareError};
    pub use crate::middleware::resolve_and_run;
    pub use crate::resolver::{RequestInfo, Resolver, TokenClaims, TokenDecodeFn};
}
