//! The per-(tenant, org) application-level database handle.
//!
//! A [`Database`] is what the connection manager caches and what flows
//! through the tenant context: a schema-scoped [`PgPool`] plus whatever the
//! injected `create_database` factory attached to realize the DAO layer.
//! This crate only owns the physical-pool half; the DAO layer itself is an
//! external collaborator (see [`crate::manager::CreateDatabaseFn`]).

use tracing::debug;

use crate::error::PgResult;
use crate::pool::PgPool;

/// A realized, schema-scoped database handle.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wrap a schema-scoped pool as a handle.
    ///
    /// This is the default realization used when no richer `create_database`
    /// factory is supplied: the handle *is* the pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying schema-scoped pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The schema this handle is scoped to, if any.
    pub fn schema_name(&self) -> Option<&str> {
        self.pool.schema_name()
    }

    /// Liveness probe used by `check_all_connections_health`.
    pub async fn health_check(&self) -> PgResult<()> {
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Close the underlying pool. Idempotent.
    pub async fn close(&self) -> PgResult<()> {
        debug!(schema_name = ?self.schema_name(), "closing database handle");
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PgConfig;
    use crate::pool::PoolConfig;

    #[tokio::test]
    async fn new_handle_exposes_schema_name() {
        let config = PgConfig::from_url("postgresql://localhost/test").unwrap();
        let pool = PgPool::with_schema(config, PoolConfig::default(), "org_alpha")
            .await
            .unwrap();
        let db = Database::new(pool);
        assert_eq!(db.schema_name(), Some("org_alpha"));
    }
}
