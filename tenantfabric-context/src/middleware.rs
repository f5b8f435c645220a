//! Glues resolution, connection acquisition, and context propagation into the
//! single entry point request handlers call through.

use std::future::Future;
use std::sync::Arc;

use tenantfabric_pool::{ConnectionManager, GetConnectionOptions};

use crate::context::{run_with, Context};
use crate::error::MiddlewareError;
use crate::resolver::{RequestInfo, Resolver};

/// Resolve `request` to a `(tenant, org)`, acquire its connection from
/// `manager`, bind a [`Context`] for the duration of `next`, and run it.
///
/// If resolution or connection acquisition fails, `next` never runs.
pub async fn resolve_and_run<F, Fut, T>(
    resolver: &Resolver,
    manager: &ConnectionManager,
    request: &RequestInfo,
    next: F,
) -> Result<T, MiddlewareError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let (tenant, org) = resolver.resolve(request).await?;

    let database = manager
        .get_connection(&tenant, &org, GetConnectionOptions::default())
        .await?;

    let context = Context::new(tenant, org, Arc::clone(&database));
    Ok(run_with(context, next()).await)
}

#[cfg(test)]
mod tests {
    // `resolve_and_run` only composes `Resolver::resolve`, `ConnectionManager::get_connection`,
    // and `context::run_with`, each already covered where they're defined; exercising the
    // composed path end to end requires a live control-plane database and is covered as an
    // integration test, not here.
}
