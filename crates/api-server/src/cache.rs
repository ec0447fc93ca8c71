//! Key/value cache with per-entry TTL.
//!
//! Only two things live here: the screener's valid-symbol list and pending
//! OAuth handshakes. Values are strings; `get_json`/`set_json` wrap serde.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String, ttl: Duration);

    async fn delete(&self, key: &str);
}

pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
            cache.delete(key).await;
            None
        }
    }
}

pub async fn set_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    match serde_json::to_string(value) {
        Ok(raw) => cache.set(key, raw, ttl).await,
        Err(e) => tracing::error!("Could not serialize cache entry {}: {}", key, e),
    }
}

/// In-process cache. Expired entries are dropped when read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.1 => {
                tracing::debug!("Cache hit for key: {}", key);
                return Some(entry.0.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Redis-backed cache (`SET EX`). Connection errors degrade to misses.
pub struct RedisCache {
    connection_manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        let connection_manager = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis cache");
        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection_manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Redis GET {} failed: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut conn = self.connection_manager.clone();
        let result: Result<(), redis::RedisError> =
            conn.set_ex(key, value, ttl.as_secs().max(1)).await;
        if let Err(e) = result {
            tracing::warn!("Redis SET {} failed: {}", key, e);
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.connection_manager.clone();
        let result: Result<(), redis::RedisError> = conn.del(key).await;
        if let Err(e) = result {
            tracing::warn!("Redis DEL {} failed: {}", key, e);
        }
    }
}
