//! Tool registry: an in-memory read-of-record over a durable [`ToolStore`].

use crate::error::{GatewayError, Result};
use crate::store::{StoreError, ToolStore};
use parking_lot::RwLock;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use unrelated_openapi_tools::ToolDescriptor;

/// What `import_tools` does when a tool name is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictStrategy {
    /// Keep the existing tool.
    Skip,
    /// Replace the existing tool.
    #[default]
    Overwrite,
    /// Abort the whole import before anything is written.
    #[serde(alias = "fail-fast", alias = "fail")]
    FailFast,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Tools written (new or overwritten).
    pub imported: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub names: Vec<String>,
}

#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn ToolStore>,
    tools: Arc<RwLock<HashMap<String, ToolDescriptor>>>,
    metadata_index: Arc<RwLock<HashMap<String, Map<String, Value>>>>,
}

fn persistence(e: StoreError) -> GatewayError {
    GatewayError::Persistence(e.to_string())
}

impl ToolRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn ToolStore>) -> Self {
        Self {
            store,
            tools: Arc::new(RwLock::new(HashMap::new())),
            metadata_index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Populate the in-memory layer from the durable store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store cannot be scanned.
    pub async fn warm_up(&self) -> Result<usize> {
        let rows = self.store.list().await.map_err(persistence)?;
        let count = rows.len();
        {
            let mut tools = self.tools.write();
            let mut index = self.metadata_index.write();
            for tool in rows {
                index.insert(tool.name().to_string(), tool.metadata().clone());
                tools.insert(tool.name().to_string(), tool);
            }
        }
        tracing::info!(tools = count, "Tool registry warmed up");
        Ok(count)
    }

    /// Register a tool, overwriting a previous registration by the same configuration.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ToolAlreadyExists`] if another configuration owns the name
    /// - [`GatewayError::Persistence`] if the store write fails (the cache is left untouched)
    pub async fn register(&self, tool: ToolDescriptor) -> Result<ToolDescriptor> {
        if let Some(existing) = self.lookup(tool.name()).await?
            && existing.config_id() != tool.config_id()
        {
            return Err(GatewayError::ToolAlreadyExists(format!(
                "'{}' is owned by configuration '{}'",
                tool.name(),
                existing.config_id()
            )));
        }
        self.persist(tool).await
    }

    /// Register a tool, superseding whatever currently owns the name.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store write fails.
    pub async fn update(&self, tool: ToolDescriptor) -> Result<ToolDescriptor> {
        if let Some(existing) = self.lookup(tool.name()).await?
            && existing.config_id() != tool.config_id()
        {
            self.store
                .delete_for_config(existing.config_id(), existing.name())
                .await
                .map_err(persistence)?;
        }
        self.persist(tool).await
    }

    async fn persist(&self, tool: ToolDescriptor) -> Result<ToolDescriptor> {
        let previous = self
            .store
            .get_for_config(tool.config_id(), tool.name())
            .await
            .map_err(persistence)?;
        let tool = match &previous {
            Some(prev) => tool.superseding(prev),
            None => tool,
        };

        // Delete-then-insert keyed by (config, name).
        self.store
            .delete_for_config(tool.config_id(), tool.name())
            .await
            .map_err(persistence)?;
        self.store.insert(&tool).await.map_err(persistence)?;

        self.cache_put(tool.clone());
        tracing::debug!(tool = %tool.name(), config_id = %tool.config_id(), replaced = previous.is_some(), "Registered tool");
        Ok(tool)
    }

    /// Remove a tool by name. Returns whether a stored row existed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store delete fails.
    pub async fn unregister(&self, name: &str) -> Result<bool> {
        let existed = self.store.delete(name).await.map_err(persistence)?;
        self.tools.write().remove(name);
        self.metadata_index.write().remove(name);
        if existed {
            tracing::debug!(tool = %name, "Unregistered tool");
        }
        Ok(existed)
    }

    /// # Errors
    ///
    /// - [`GatewayError::ToolNotFound`] if neither the cache nor the store has the tool
    /// - [`GatewayError::Persistence`] if the store lookup fails
    pub async fn get_tool(&self, name: &str) -> Result<ToolDescriptor> {
        self.lookup(name)
            .await?
            .ok_or_else(|| GatewayError::ToolNotFound(name.to_string()))
    }

    async fn lookup(&self, name: &str) -> Result<Option<ToolDescriptor>> {
        if let Some(tool) = self.tools.read().get(name).cloned() {
            return Ok(Some(tool));
        }
        let stored = self.store.get(name).await.map_err(persistence)?;
        if let Some(tool) = &stored {
            self.cache_put(tool.clone());
        }
        Ok(stored)
    }

    fn cache_put(&self, tool: ToolDescriptor) {
        self.metadata_index
            .write()
            .insert(tool.name().to_string(), tool.metadata().clone());
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// All cached tools, sorted by name.
    #[must_use]
    pub fn get_all_tools(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<_> = self.tools.read().values().cloned().collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Tools whose name matches `pattern` (case-insensitive regex).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] for an invalid pattern.
    pub fn find_by_name_pattern(&self, pattern: &str) -> Result<Vec<ToolDescriptor>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| GatewayError::validation(format!("invalid name pattern: {e}")))?;
        Ok(self
            .get_all_tools()
            .into_iter()
            .filter(|t| re.is_match(t.name()))
            .collect())
    }

    /// Tools whose metadata has exactly `key: value`.
    #[must_use]
    pub fn find_by_metadata(&self, key: &str, value: &Value) -> Vec<ToolDescriptor> {
        let names: Vec<String> = self
            .metadata_index
            .read()
            .iter()
            .filter(|(_, meta)| meta.get(key) == Some(value))
            .map(|(name, _)| name.clone())
            .collect();
        let tools = self.tools.read();
        let mut out: Vec<_> = names.iter().filter_map(|n| tools.get(n).cloned()).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Register a set of tools, resolving name conflicts with `strategy`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ToolAlreadyExists`] under [`ConflictStrategy::FailFast`] when any name
    ///   is taken or appears twice in `tools` (nothing is written)
    /// - [`GatewayError::Persistence`] if a store write fails (earlier writes are kept)
    pub async fn import_tools(
        &self,
        tools: Vec<ToolDescriptor>,
        strategy: ConflictStrategy,
    ) -> Result<ImportReport> {
        // A name repeated within the batch conflicts with its earlier occurrence.
        let mut existing = Vec::with_capacity(tools.len());
        {
            let mut seen = HashSet::with_capacity(tools.len());
            for tool in &tools {
                let repeated = !seen.insert(tool.name());
                existing.push(repeated || self.lookup(tool.name()).await?.is_some());
            }
        }

        if strategy == ConflictStrategy::FailFast {
            let conflicts: Vec<&str> = tools
                .iter()
                .zip(&existing)
                .filter(|(_, exists)| **exists)
                .map(|(t, _)| t.name())
                .collect();
            if !conflicts.is_empty() {
                return Err(GatewayError::ToolAlreadyExists(conflicts.join(", ")));
            }
        }

        let mut report = ImportReport::default();
        for (tool, exists) in tools.into_iter().zip(existing) {
            if exists {
                match strategy {
                    ConflictStrategy::Skip => {
                        report.skipped += 1;
                        continue;
                    }
                    ConflictStrategy::Overwrite | ConflictStrategy::FailFast => {
                        report.overwritten += 1;
                    }
                }
            }
            let tool = self.update(tool).await?;
            report.imported += 1;
            report.names.push(tool.name().to_string());
        }

        tracing::info!(
            imported = report.imported,
            overwritten = report.overwritten,
            skipped = report.skipped,
            strategy = ?strategy,
            "Imported tools"
        );
        Ok(report)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.tools.read().len()
    }

    /// Clear the in-memory layer. The durable store is not touched.
    pub fn reset(&self) {
        self.tools.write().clear();
        self.metadata_index.write().clear();
    }
}
