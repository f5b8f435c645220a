//! The per-(tenant, org) connection manager.
//!
//! A bounded, concurrency-safe cache of [`Database`] handles keyed by
//! `(tenant_id, org_id)`, with LRU+TTL eviction and single-flight
//! initialization: for any key, at most one create pipeline ever runs at a
//! time, and every concurrent caller for that key receives the same handle.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tenantfabric_registry::{DatabaseConfig, Org, RegistryClient, RegistryError, Tenant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handle::Database;
use crate::pool::PgPool;

/// A boxed, `'static`, `Send` future — the shape every injected factory returns.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Decrypts an encrypted password into plaintext. Pure, synchronous, infallible
/// in the sense that the manager treats any `Err` as a terminal init failure.
pub type DecryptFn = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Builds the schema-scoped physical pool for one (tenant, org). The factory
/// itself is responsible for ensuring every physical connection it hands out
/// has run `SET search_path` for `schema_name` — see [`PgPool::with_schema`]
/// for the reference implementation used by [`default_create_sequelize`].
pub type CreateSequelizeFn =
    Arc<dyn Fn(DatabaseConfig, String, String) -> BoxFuture<Result<PgPool, String>> + Send + Sync>;

/// Realizes the DAO layer on top of a freshly built pool. `force_sync` is
/// propagated verbatim from the triggering `get_connection` call.
pub type CreateDatabaseFn =
    Arc<dyn Fn(PgPool, bool) -> BoxFuture<Result<Database, String>> + Send + Sync>;

/// The default `create_database`: the handle *is* the pool, with no further
/// DAO realization. Suitable when the caller has no richer ORM layer to
/// attach, and used by every test in this crate.
pub fn identity_create_database() -> CreateDatabaseFn {
    Arc::new(|pool, _force_sync| Box::pin(async move { Ok(Database::new(pool)) }))
}

/// Errors surfaced by the connection manager.
#[derive(Error, Debug, Clone)]
pub enum ManagerError {
    /// The registry has no database configuration for this tenant.
    #[error("no database configuration for tenant")]
    NoDatabaseConfig,

    /// The registry query itself failed.
    #[error("registry error: {0}")]
    Registry(String),

    /// The injected `decrypt` collaborator failed.
    #[error("password decryption failed: {0}")]
    Decrypt(String),

    /// The injected `create_sequelize` collaborator failed.
    #[error("failed to build connection pool: {0}")]
    CreateSequelize(String),

    /// The injected `create_database` collaborator failed.
    #[error("failed to realize database handle: {0}")]
    CreateDatabase(String),

    /// The create-pipeline task itself panicked or was cancelled.
    #[error("connection init task failed: {0}")]
    Internal(String),
}

impl From<RegistryError> for ManagerError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err.to_string())
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Options for [`ConnectionManager::get_connection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConnectionOptions {
    /// Evict any existing entry first, guaranteeing the create pipeline runs.
    pub force_sync: bool,
}

/// Tuning knobs for the manager's cache.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of cached handles. Default 100.
    pub max_connections: usize,
    /// Entries idle longer than this are eligible for `evict_expired`. Default 30 minutes.
    pub ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Outcome of a single health probe.
#[derive(Debug, Clone)]
pub struct EntryHealth {
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Aggregate result of `check_all_connections_health`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub overall: bool,
    pub per_entry: Vec<EntryHealth>,
}

type Key = (Uuid, Uuid);
type InitResult = Result<Arc<Database>, Arc<ManagerError>>;
type InitFuture = Shared<BoxFuture<InitResult>>;

struct ReadyEntry {
    database: Arc<Database>,
    last_used: Instant,
    seq: u64,
}

enum CacheEntry {
    Ready(ReadyEntry),
    Pending(InitFuture),
}

struct Inner {
    entries: HashMap<Key, CacheEntry>,
    next_seq: u64,
}

impl Inner {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Shared state captured by the spawned create-pipeline task.
struct Factories {
    registry: RegistryClient,
    decrypt: DecryptFn,
    create_sequelize: CreateSequelizeFn,
    create_database: CreateDatabaseFn,
}

/// The per-(tenant, org) connection manager.
pub struct ConnectionManager {
    inner: Arc<Mutex<Inner>>,
    config: ManagerConfig,
    factories: Arc<Factories>,
}

impl ConnectionManager {
    pub fn new(
        registry: RegistryClient,
        decrypt: DecryptFn,
        create_sequelize: CreateSequelizeFn,
        create_database: CreateDatabaseFn,
        config: ManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            })),
            config,
            factories: Arc::new(Factories {
                registry,
                decrypt,
                create_sequelize,
                create_database,
            }),
        }
    }

    /// Return the cached handle for `(tenant, org)`, creating it on first use.
    pub async fn get_connection(
        &self,
        tenant: &Tenant,
        org: &Org,
        opts: GetConnectionOptions,
    ) -> ManagerResult<Arc<Database>> {
        let key = (tenant.id, org.id);

        if opts.force_sync {
            self.evict_connection(tenant.id, org.id).await?;
        }

        loop {
            let pending = {
                let mut inner = self.inner.lock();
                match inner.entries.get_mut(&key) {
                    Some(CacheEntry::Ready(entry)) => {
                        entry.last_used = Instant::now();
                        return Ok(entry.database.clone());
                    }
                    Some(CacheEntry::Pending(shared)) => shared.clone(),
                    None => {
                        self.maybe_evict_locked(&mut inner);
                        let seq = inner.take_seq();
                        let shared = self.spawn_create_pipeline(
                            key,
                            tenant.clone(),
                            org.clone(),
                            seq,
                            opts.force_sync,
                        );
                        inner.entries.insert(key, CacheEntry::Pending(shared.clone()));
                        shared
                    }
                }
            };

            match pending.await {
                Ok(database) => return Ok(database),
                Err(err) => return Err((*err).clone()),
            }
        }
    }

    /// Remove the entry for `(tenant_id, org_id)`, awaiting any in-flight init
    /// first, then close the resulting handle.
    pub async fn evict_connection(&self, tenant_id: Uuid, org_id: Uuid) -> ManagerResult<()> {
        let key = (tenant_id, org_id);
        let entry = { self.inner.lock().entries.remove(&key) };
        let Some(entry) = entry else {
            return Ok(());
        };
        let database = match entry {
            CacheEntry::Ready(ready) => Some(ready.database),
            CacheEntry::Pending(shared) => match shared.await {
                Ok(database) => Some(database),
                Err(_) => None,
            },
        };
        if let Some(database) = database {
            Self::close_and_swallow(&database, tenant_id, org_id).await;
        }
        Ok(())
    }

    /// Close every cached handle, awaiting any in-flight inits first.
    /// Per-entry close errors are tolerated.
    pub async fn close_all(&self) {
        let entries: Vec<(Key, CacheEntry)> = {
            let mut inner = self.inner.lock();
            inner.entries.drain().collect()
        };

        let closes = entries.into_iter().map(|((tenant_id, org_id), entry)| async move {
            let database = match entry {
                CacheEntry::Ready(ready) => Some(ready.database),
                CacheEntry::Pending(shared) => shared.await.ok(),
            };
            if let Some(database) = database {
                Self::close_and_swallow(&database, tenant_id, org_id).await;
            }
        });

        futures::future::join_all(closes).await;
    }

    /// Remove entries whose `last_used` exceeds the configured TTL.
    /// In-flight (pending) entries are never touched.
    pub async fn evict_expired(&self) {
        let expired: Vec<(Key, Arc<Database>)> = {
            let mut inner = self.inner.lock();
            let ttl = self.config.ttl;
            let now = Instant::now();
            let expired_keys: Vec<Key> = inner
                .entries
                .iter()
                .filter_map(|(key, entry)| match entry {
                    CacheEntry::Ready(ready) if now.duration_since(ready.last_used) > ttl => {
                        Some(*key)
                    }
                    _ => None,
                })
                .collect();

            expired_keys
                .into_iter()
                .filter_map(|key| match inner.entries.remove(&key) {
                    Some(CacheEntry::Ready(ready)) => Some((key, ready.database)),
                    Some(other) => {
                        inner.entries.insert(key, other);
                        None
                    }
                    None => None,
                })
                .collect()
        };

        for ((tenant_id, org_id), database) in expired {
            debug!(%tenant_id, %org_id, "evicting expired connection");
            Self::close_and_swallow(&database, tenant_id, org_id).await;
        }
    }

    /// Current number of cache entries (ready or pending).
    pub fn get_cache_size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Probe every non-initializing cached handle in parallel.
    pub async fn check_all_connections_health(&self, timeout: Option<Duration>) -> HealthReport {
        let timeout = timeout.unwrap_or(Duration::from_secs(5));
        let ready: Vec<(Key, Arc<Database>)> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .filter_map(|(key, entry)| match entry {
                    CacheEntry::Ready(ready) => Some((*key, ready.database.clone())),
                    CacheEntry::Pending(_) => None,
                })
                .collect()
        };

        let probes = ready.into_iter().map(|((tenant_id, org_id), database)| async move {
            match tokio::time::timeout(timeout, database.health_check()).await {
                Ok(Ok(())) => EntryHealth {
                    tenant_id,
                    org_id,
                    healthy: true,
                    message: None,
                },
                Ok(Err(e)) => EntryHealth {
                    tenant_id,
                    org_id,
                    healthy: false,
                    message: Some(e.to_string()),
                },
                Err(_) => EntryHealth {
                    tenant_id,
                    org_id,
                    healthy: false,
                    message: Some(format!("health check exceeded {:?}", timeout)),
                },
            }
        });

        let per_entry = futures::future::join_all(probes).await;
        let overall = per_entry.iter().all(|e| e.healthy);
        HealthReport { overall, per_entry }
    }

    /// If the cache is at capacity, evict the Ready entry with the smallest
    /// `last_used`, ties broken by insertion order. Pending entries are never
    /// chosen by ordinary LRU eviction.
    fn maybe_evict_locked(&self, inner: &mut Inner) {
        if inner.entries.len() < self.config.max_connections {
            return;
        }

        let victim = inner
            .entries
            .iter()
            .filter_map(|(key, entry)| match entry {
                CacheEntry::Ready(ready) => Some((*key, ready.last_used, ready.seq)),
                CacheEntry::Pending(_) => None,
            })
            .min_by_key(|&(_, last_used, seq)| (last_used, seq))
            .map(|(key, _, _)| key);

        let Some(victim) = victim else {
            debug!("cache at capacity but no ready entry available to evict");
            return;
        };

        if let Some(CacheEntry::Ready(ready)) = inner.entries.remove(&victim) {
            let (tenant_id, org_id) = victim;
            info!(%tenant_id, %org_id, "evicting LRU connection");
            let database = ready.database;
            tokio::spawn(async move {
                Self::close_and_swallow(&database, tenant_id, org_id).await;
            });
        }
    }

    fn spawn_create_pipeline(
        &self,
        key: Key,
        tenant: Tenant,
        org: Org,
        seq: u64,
        force_sync: bool,
    ) -> InitFuture {
        let inner = self.inner.clone();
        let factories = self.factories.clone();

        let join_handle = tokio::spawn(async move {
            Self::run_create_pipeline(inner, factories, key, tenant, org, seq, force_sync).await
        });

        let fut: BoxFuture<InitResult> = Box::pin(async move {
            match join_handle.await {
                Ok(result) => result,
                Err(join_err) => Err(Arc::new(ManagerError::Internal(join_err.to_string()))),
            }
        });

        fut.shared()
    }

    async fn run_create_pipeline(
        inner: Arc<Mutex<Inner>>,
        factories: Arc<Factories>,
        key: Key,
        tenant: Tenant,
        org: Org,
        seq: u64,
        force_sync: bool,
    ) -> InitResult {
        let result = Self::create_database(&factories, &tenant, &org, force_sync).await;

        let mut locked = inner.lock();
        match &result {
            Ok(database) => {
                locked.entries.insert(
                    key,
                    CacheEntry::Ready(ReadyEntry {
                        database: database.clone(),
                        last_used: Instant::now(),
                        seq,
                    }),
                );
            }
            Err(_) => {
                locked.entries.remove(&key);
            }
        }
        drop(locked);

        result.map_err(Arc::new)
    }

    async fn create_database(
        factories: &Factories,
        tenant: &Tenant,
        org: &Org,
        force_sync: bool,
    ) -> Result<Arc<Database>, ManagerError> {
        let config = factories
            .registry
            .get_tenant_database_config(tenant.id)
            .await?
            .ok_or(ManagerError::NoDatabaseConfig)?;

        let plaintext = (factories.decrypt)(&config.password_encrypted)
            .map_err(ManagerError::Decrypt)?;

        let pool = (factories.create_sequelize)(config, plaintext, org.schema_name.clone())
            .await
            .map_err(ManagerError::CreateSequelize)?;

        let database = (factories.create_database)(pool, force_sync)
            .await
            .map_err(ManagerError::CreateDatabase)?;

        debug!(tenant_id = %tenant.id, org_id = %org.id, schema_name = %org.schema_name, "connection manager created handle");

        Ok(Arc::new(database))
    }

    async fn close_and_swallow(database: &Database, tenant_id: Uuid, org_id: Uuid) {
        if let Err(e) = database.close().await {
            warn!(%tenant_id, %org_id, error = %e, "error closing evicted connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tenantfabric_registry::{DeploymentType, TenantStatus};

    fn fake_tenant(slug: &str) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            display_name: slug.to_string(),
            status: TenantStatus::Active,
            deployment_type: DeploymentType::Shared,
            database_provider_id: None,
            configs: serde_json::Value::Null,
            configs_updated_at: None,
            feature_flags: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            provisioned_at: None,
            primary_domain: None,
        }
    }

    /// A manager whose factories never touch the network: `create_sequelize`
    /// fabricates a pool from a URL string without connecting, matching the
    /// lazy-connect semantics `deadpool_postgres::Pool::builder` already has.
    fn hermetic_manager(
        config: ManagerConfig,
        call_count: Arc<AtomicUsize>,
    ) -> ConnectionManager {
        let registry = RegistryClient::from_pool(
            deadpool_postgres::Config {
                host: Some("localhost".to_string()),
                dbname: Some("registry".to_string()),
                ..Default::default()
            }
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .unwrap(),
        );

        let decrypt: DecryptFn = Arc::new(|ciphertext| Ok(ciphertext.to_string()));

        let create_sequelize: CreateSequelizeFn = {
            let call_count = call_count.clone();
            Arc::new(move |config, _password, schema_name| {
                call_count.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    let pg_config = crate::config::PgConfig::builder()
                        .host(config.host)
                        .port(config.port)
                        .database(config.database_name)
                        .user(config.username)
                        .build()
                        .map_err(|e| e.to_string())?;
                    PgPool::with_schema(pg_config, crate::pool::PoolConfig::default(), schema_name)
                        .await
                        .map_err(|e| e.to_string())
                })
            })
        };

        ConnectionManager::new(
            registry,
            decrypt,
            create_sequelize,
            identity_create_database(),
            config,
        )
    }

    // Cache-hit, single-flight, and TTL-eviction behavior that exercises the
    // full create pipeline (get_connection -> registry -> decrypt ->
    // create_sequelize -> create_database) requires a live control-plane
    // database and are covered as integration tests, not here.

    #[tokio::test]
    async fn evict_connection_on_missing_key_is_noop() {
        let manager = hermetic_manager(ManagerConfig::default(), Arc::new(AtomicUsize::new(0)));
        assert!(manager.evict_connection(Uuid::new_v4(), Uuid::new_v4()).await.is_ok());
    }

    #[test]
    fn manager_config_defaults_match_spec() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.ttl, Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn maybe_evict_locked_prefers_smallest_last_used_then_seq() {
        let manager = hermetic_manager(
            ManagerConfig {
                max_connections: 2,
                ..ManagerConfig::default()
            },
            Arc::new(AtomicUsize::new(0)),
        );

        let tenant = fake_tenant("acme");

        // Populate two Ready entries directly to exercise eviction selection
        // without depending on the (network-bound) create pipeline.
        let pool = PgPool::with_schema(
            crate::config::PgConfig::builder()
                .host("localhost")
                .database("app")
                .build()
                .unwrap(),
            crate::pool::PoolConfig::default(),
            "org_a",
        )
        .await
        .unwrap();
        let database = Arc::new(Database::new(pool));

        let key_a = (tenant.id, Uuid::new_v4());
        let key_b = (tenant.id, Uuid::new_v4());
        {
            let mut inner = manager.inner.lock();
            inner.entries.insert(
                key_a,
                CacheEntry::Ready(ReadyEntry {
                    database: database.clone(),
                    last_used: Instant::now() - Duration::from_secs(60),
                    seq: 0,
                }),
            );
            inner.entries.insert(
                key_b,
                CacheEntry::Ready(ReadyEntry {
                    database: database.clone(),
                    last_used: Instant::now(),
                    seq: 1,
                }),
            );
            manager.maybe_evict_locked(&mut inner);
        }

        // Give the spawned close a moment to run; the eviction decision
        // itself (which key was removed) is synchronous under the lock.
        tokio::task::yield_now().await;
        let remaining: Vec<Key> = manager.inner.lock().entries.keys().copied().collect();
        assert_eq!(remaining, vec![key_b]);
    }
}
