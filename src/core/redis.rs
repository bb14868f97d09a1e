use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

/// Lazily connected Redis handle. A handle that never connected (or was
/// disconnected) reports `Disconnected` and its key-value calls return `None`.
#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut manager) = self.manager().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// `Ok(None)` when disconnected, `Ok(Some(None))` when the key is absent.
    pub(crate) async fn get(&self, key: &str) -> Result<Option<Option<String>>, RedisError> {
        let Some(mut manager) = self.manager().await else {
            return Ok(None);
        };

        let value: Option<String> = manager.get(key).await?;
        Ok(Some(value))
    }

    /// Returns `false` when disconnected.
    pub(crate) async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, RedisError> {
        let Some(mut manager) = self.manager().await else {
            return Ok(false);
        };

        manager.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(true)
    }

    /// Returns `false` when disconnected.
    pub(crate) async fn delete(&self, key: &str) -> Result<bool, RedisError> {
        let Some(mut manager) = self.manager().await else {
            return Ok(false);
        };

        manager.del::<_, ()>(key).await?;
        Ok(true)
    }

    async fn manager(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }
}
