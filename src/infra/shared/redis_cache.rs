use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::info;

use crate::cache::{CachedValue, SharedCache, SharedCacheError};

/// Redis-backed shared tier. Values are JSON documents written with plain `SET`, so
/// they never expire on their own.
#[derive(Clone)]
pub struct RedisSharedCache {
    conn: ConnectionManager,
}

impl RedisSharedCache {
    pub async fn connect(url: &str) -> Result<Self, SharedCacheError> {
        let client = Client::open(url).map_err(SharedCacheError::unavailable)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(SharedCacheError::unavailable)?;
        info!(target = "tierset::shared", "connected to redis shared cache");
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn encode(value: &CachedValue) -> Result<String, SharedCacheError> {
    serde_json::to_string(value).map_err(|err| SharedCacheError::Encoding(err.to_string()))
}

fn decode(payload: &str) -> Result<CachedValue, SharedCacheError> {
    serde_json::from_str(payload).map_err(|err| SharedCacheError::Encoding(err.to_string()))
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedValue>, SharedCacheError> {
        let payload: Option<String> = self
            .conn
            .clone()
            .get(key)
            .await
            .map_err(SharedCacheError::unavailable)?;
        payload.as_deref().map(decode).transpose()
    }

    async fn set(&self, key: &str, value: &CachedValue) -> Result<(), SharedCacheError> {
        let payload = encode(value)?;
        self.conn
            .clone()
            .set::<_, _, ()>(key, payload)
            .await
            .map_err(SharedCacheError::unavailable)
    }

    async fn has(&self, key: &str) -> Result<bool, SharedCacheError> {
        self.conn
            .clone()
            .exists(key)
            .await
            .map_err(SharedCacheError::unavailable)
    }

    async fn forget(&self, key: &str) -> Result<(), SharedCacheError> {
        self.conn
            .clone()
            .del::<_, ()>(key)
            .await
            .map_err(SharedCacheError::unavailable)
    }
}
