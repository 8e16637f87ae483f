use super::StorageError;
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// JSON values under plain keys with `SET .. EX` expiry
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("✅ Connected to Redis");

        Ok(Self { manager })
    }

    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StorageError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.manager.clone();
        // Redis rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, payload, seconds).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
