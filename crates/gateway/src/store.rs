//! Durable store contracts and in-memory implementations.

use crate::model::{ApiConfiguration, ExecutionStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use unrelated_openapi_tools::ToolDescriptor;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A uniqueness constraint was violated.
    #[error("store conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable tool storage keyed by (configuration id, tool name).
#[async_trait]
pub trait ToolStore: Send + Sync {
    async fn get(&self, name: &str) -> StoreResult<Option<ToolDescriptor>>;
    async fn get_for_config(&self, config_id: &str, name: &str)
    -> StoreResult<Option<ToolDescriptor>>;
    async fn delete_for_config(&self, config_id: &str, name: &str) -> StoreResult<bool>;
    /// Delete every row with this name.
    async fn delete(&self, name: &str) -> StoreResult<bool>;
    /// Fails with [`StoreError::Conflict`] if the (configuration id, name) row exists.
    async fn insert(&self, tool: &ToolDescriptor) -> StoreResult<()>;
    async fn list(&self) -> StoreResult<Vec<ToolDescriptor>>;
    async fn exists(&self, name: &str) -> StoreResult<bool>;
    async fn count(&self) -> StoreResult<usize>;
}

#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<ApiConfiguration>>;
    async fn list(&self) -> StoreResult<Vec<ApiConfiguration>>;
    async fn put(&self, config: ApiConfiguration) -> StoreResult<()>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn upsert(&self, stats: &ExecutionStats) -> StoreResult<()>;
    async fn get(&self, tool_name: &str) -> StoreResult<Option<ExecutionStats>>;
    async fn list(&self) -> StoreResult<Vec<ExecutionStats>>;
}

type ToolKey = (String, String);

/// In-process [`ToolStore`].
#[derive(Clone, Default)]
pub struct MemoryToolStore {
    rows: Arc<RwLock<HashMap<ToolKey, ToolDescriptor>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryToolStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

fn key(config_id: &str, name: &str) -> ToolKey {
    (config_id.to_string(), name.to_string())
}

#[async_trait]
impl ToolStore for MemoryToolStore {
    async fn get(&self, name: &str) -> StoreResult<Option<ToolDescriptor>> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|((_, n), _)| n == name)
            .map(|(_, t)| t.clone()))
    }

    async fn get_for_config(
        &self,
        config_id: &str,
        name: &str,
    ) -> StoreResult<Option<ToolDescriptor>> {
        Ok(self.rows.read().get(&key(config_id, name)).cloned())
    }

    async fn delete_for_config(&self, config_id: &str, name: &str) -> StoreResult<bool> {
        self.check_writable()?;
        Ok(self.rows.write().remove(&key(config_id, name)).is_some())
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|(_, n), _| n != name);
        Ok(rows.len() != before)
    }

    async fn insert(&self, tool: &ToolDescriptor) -> StoreResult<()> {
        self.check_writable()?;
        let k = key(tool.config_id(), tool.name());
        let mut rows = self.rows.write();
        if rows.contains_key(&k) {
            return Err(StoreError::Conflict(format!(
                "tool '{}' already stored for configuration '{}'",
                k.1, k.0
            )));
        }
        rows.insert(k, tool.clone());
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<ToolDescriptor>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.rows.read().keys().any(|(_, n)| n == name))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.read().len())
    }
}

/// In-process [`ConfigurationStore`].
#[derive(Clone, Default)]
pub struct MemoryConfigurationStore {
    configs: Arc<RwLock<HashMap<String, ApiConfiguration>>>,
}

impl MemoryConfigurationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_configs(configs: impl IntoIterator<Item = ApiConfiguration>) -> Self {
        let store = Self::new();
        {
            let mut map = store.configs.write();
            for c in configs {
                map.insert(c.id.clone(), c);
            }
        }
        store
    }
}

#[async_trait]
impl ConfigurationStore for MemoryConfigurationStore {
    async fn get(&self, id: &str) -> StoreResult<Option<ApiConfiguration>> {
        Ok(self.configs.read().get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ApiConfiguration>> {
        let mut out: Vec<_> = self.configs.read().values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn put(&self, config: ApiConfiguration) -> StoreResult<()> {
        self.configs.write().insert(config.id.clone(), config);
        Ok(())
    }
}

/// In-process [`StatsStore`].
#[derive(Clone, Default)]
pub struct MemoryStatsStore {
    stats: Arc<RwLock<HashMap<String, ExecutionStats>>>,
}

impl MemoryStatsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn upsert(&self, stats: &ExecutionStats) -> StoreResult<()> {
        self.stats
            .write()
            .insert(stats.tool_name.clone(), stats.clone());
        Ok(())
    }

    async fn get(&self, tool_name: &str) -> StoreResult<Option<ExecutionStats>> {
        Ok(self.stats.read().get(tool_name).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ExecutionStats>> {
        Ok(self.stats.read().values().cloned().collect())
    }
}
