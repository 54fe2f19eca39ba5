use crate::model::ExecutionStats;
use crate::store::{StatsStore, StoreResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-tool counters kept in memory and written behind to a [`StatsStore`].
///
/// Writes go through a single background task so snapshots for one tool land in order.
#[derive(Clone)]
pub(crate) struct StatsRecorder {
    store: Arc<dyn StatsStore>,
    live: Arc<RwLock<HashMap<String, ExecutionStats>>>,
    writer: mpsc::UnboundedSender<ExecutionStats>,
}

impl StatsRecorder {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(store: Arc<dyn StatsStore>) -> Self {
        let (writer, mut rx) = mpsc::unbounded_channel::<ExecutionStats>();
        let sink = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some(stats) = rx.recv().await {
                if let Err(e) = sink.upsert(&stats).await {
                    tracing::warn!(tool = %stats.tool_name, error = %e, "Failed to persist execution stats");
                }
            }
        });
        Self {
            store,
            live: Arc::new(RwLock::new(HashMap::new())),
            writer,
        }
    }

    /// Seed the in-memory counters from the store.
    pub(crate) async fn load(&self) -> StoreResult<usize> {
        let rows = self.store.list().await?;
        let count = rows.len();
        let mut live = self.live.write();
        for row in rows {
            live.entry(row.tool_name.clone()).or_insert(row);
        }
        Ok(count)
    }

    pub(crate) fn record(&self, tool: &str, duration_ms: u64, error: Option<&str>) {
        let snapshot = {
            let mut live = self.live.write();
            let stats = live
                .entry(tool.to_string())
                .or_insert_with(|| ExecutionStats::new(tool));
            stats.record(duration_ms, error, Utc::now());
            stats.clone()
        };
        if self.writer.send(snapshot).is_err() {
            tracing::warn!(tool = %tool, "Stats writer stopped; execution stats not persisted");
        }
    }

    pub(crate) async fn get(&self, tool: &str) -> Option<ExecutionStats> {
        if let Some(s) = self.live.read().get(tool).cloned() {
            return Some(s);
        }
        match self.store.get(tool).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(tool = %tool, error = %e, "Failed to read execution stats");
                None
            }
        }
    }

    pub(crate) async fn all(&self) -> Vec<ExecutionStats> {
        let mut merged: HashMap<String, ExecutionStats> = match self.store.list().await {
            Ok(rows) => rows.into_iter().map(|s| (s.tool_name.clone(), s)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list execution stats");
                HashMap::new()
            }
        };
        for (name, stats) in self.live.read().iter() {
            merged.insert(name.clone(), stats.clone());
        }
        let mut out: Vec<_> = merged.into_values().collect();
        out.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStatsStore;
    use std::time::Duration;

    #[tokio::test]
    async fn records_in_memory_and_writes_behind() {
        let store = MemoryStatsStore::new();
        let recorder = StatsRecorder::new(Arc::new(store.clone()));
        recorder.record("listPets", 12, None);
        recorder.record("listPets", 8, Some("boom"));

        let live = recorder.get("listPets").await.unwrap();
        assert_eq!(live.invocations, 2);
        assert_eq!(live.errors, 1);

        let mut persisted = None;
        for _ in 0..50 {
            persisted = store.get("listPets").await.unwrap();
            if persisted.as_ref().is_some_and(|s| s.invocations == 2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(persisted.unwrap().invocations, 2);
    }

    #[tokio::test]
    async fn load_seeds_counters_from_store() {
        let store = MemoryStatsStore::new();
        let mut previous = ExecutionStats::new("getPet");
        previous.record(5, None, Utc::now());
        store.upsert(&previous).await.unwrap();

        let recorder = StatsRecorder::new(Arc::new(store));
        assert_eq!(recorder.load().await.unwrap(), 1);
        recorder.record("getPet", 5, None);
        assert_eq!(recorder.get("getPet").await.unwrap().invocations, 2);
        assert_eq!(recorder.all().await.len(), 1);
    }
}
