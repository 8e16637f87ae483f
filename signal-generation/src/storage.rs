// Signal Storage Interface
// Idempotent persistence for validated records and signals, plus a TTL cache

mod postgres;
mod redis_cache;

pub use postgres::PostgresStore;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Cache key for the signals of the latest cycle
pub const SIGNALS_CACHE_KEY: &str = "latest_signals";
/// Cache key for the token metrics of the latest cycle
pub const METRICS_CACHE_KEY: &str = "latest_market_metrics";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent tables, one per record family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    SocialPosts,
    MarketMetrics,
    ForumCalls,
    Signals,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::SocialPosts, Table::MarketMetrics, Table::ForumCalls, Table::Signals];

    pub fn name(&self) -> &'static str {
        match self {
            Table::SocialPosts => "social_posts",
            Table::MarketMetrics => "market_metrics",
            Table::ForumCalls => "forum_calls",
            Table::Signals => "signals",
        }
    }
}

/// A row keyed by its natural id; writing the same key twice overwrites
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub payload: Value,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    pub fn from_serialize<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, StorageError> {
        Ok(Self::new(key, serde_json::to_value(value)?))
    }
}

/// Everything one cycle commits, written all-or-nothing
#[derive(Debug, Clone)]
pub struct CycleBatch {
    pub cycle_id: Uuid,
    tables: BTreeMap<Table, Vec<StoredRecord>>,
}

impl CycleBatch {
    pub fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            tables: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, table: Table, record: StoredRecord) {
        self.tables.entry(table).or_default().push(record);
    }

    pub fn records(&self, table: Table) -> &[StoredRecord] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tables(&self) -> impl Iterator<Item = (Table, &[StoredRecord])> {
        self.tables.iter().map(|(table, records)| (*table, records.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage collaborator of the pipeline
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert or overwrite rows by natural key
    async fn upsert(&self, table: Table, records: &[StoredRecord]) -> Result<(), StorageError>;

    /// Commit every table of a cycle atomically
    async fn persist_cycle(&self, batch: &CycleBatch) -> Result<(), StorageError>;

    /// Last write wins
    async fn cache_set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StorageError>;

    async fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError>;
}

/// In-memory storage (for testing and development)
pub struct InMemoryStore {
    tables: tokio::sync::RwLock<HashMap<Table, HashMap<String, Value>>>,
    cache: tokio::sync::RwLock<HashMap<String, (Value, Instant)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: tokio::sync::RwLock::new(HashMap::new()),
            cache: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn count(&self, table: Table) -> usize {
        let tables = self.tables.read().await;
        tables.get(&table).map_or(0, HashMap::len)
    }

    pub async fn get(&self, table: Table, key: &str) -> Option<Value> {
        let tables = self.tables.read().await;
        tables.get(&table).and_then(|rows| rows.get(key)).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn upsert(&self, table: Table, records: &[StoredRecord]) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();
        for record in records {
            rows.insert(record.key.clone(), record.payload.clone());
        }
        Ok(())
    }

    async fn persist_cycle(&self, batch: &CycleBatch) -> Result<(), StorageError> {
        // One write guard for the whole batch keeps it all-or-nothing for readers
        let mut tables = self.tables.write().await;
        for (table, records) in batch.tables() {
            let rows = tables.entry(table).or_default();
            for record in records {
                rows.insert(record.key.clone(), record.payload.clone());
            }
        }
        Ok(())
    }

    async fn cache_set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StorageError> {
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone()))
    }
}

/// PostgreSQL for rows, Redis for the cache
pub struct PersistentStore {
    database: PostgresStore,
    cache: RedisCache,
}

impl PersistentStore {
    pub async fn connect(database_url: &str, redis_url: &str) -> anyhow::Result<Self> {
        let database = PostgresStore::connect(database_url).await?;
        database.init_tables().await?;
        let cache = RedisCache::connect(redis_url).await?;
        Ok(Self { database, cache })
    }
}

#[async_trait]
impl SignalStore for PersistentStore {
    async fn upsert(&self, table: Table, records: &[StoredRecord]) -> Result<(), StorageError> {
        self.database.upsert(table, records).await
    }

    async fn persist_cycle(&self, batch: &CycleBatch) -> Result<(), StorageError> {
        self.database.persist_cycle(batch).await
    }

    async fn cache_set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StorageError> {
        if let Err(e) = self.cache.set(key, &value, ttl).await {
            warn!("Cache write for {} failed: {}", key, e);
        }
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.cache.get(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                Ok(None)
            }
        }
    }
}
