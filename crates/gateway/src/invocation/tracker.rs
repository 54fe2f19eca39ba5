use crate::error::{GatewayError, Result};
use crate::model::{ActiveExecution, ExecutionPhase, ExecutionStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-flight executions keyed by call id.
#[derive(Clone, Default)]
pub(crate) struct ExecutionTracker {
    inner: Arc<RwLock<HashMap<String, ActiveExecution>>>,
}

/// Removes its execution from the tracker when dropped.
pub(crate) struct ExecutionGuard {
    tracker: ExecutionTracker,
    call_id: String,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.tracker.inner.write().remove(&self.call_id);
    }
}

impl ExecutionTracker {
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if `call_id` is already in flight.
    pub(crate) fn begin(&self, call_id: &str, tool_name: &str) -> Result<ExecutionGuard> {
        let mut map = self.inner.write();
        if map.contains_key(call_id) {
            return Err(GatewayError::validation(format!(
                "call id '{call_id}' is already in flight"
            )));
        }
        map.insert(
            call_id.to_string(),
            ActiveExecution {
                call_id: call_id.to_string(),
                tool_name: tool_name.to_string(),
                started_at: Utc::now(),
                phase: ExecutionPhase::Validating,
                status: ExecutionStatus::Running,
            },
        );
        Ok(ExecutionGuard {
            tracker: self.clone(),
            call_id: call_id.to_string(),
        })
    }

    /// Move to `phase` unless the call was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Cancelled`] if the call was cancelled.
    pub(crate) fn advance(&self, call_id: &str, phase: ExecutionPhase) -> Result<()> {
        let mut map = self.inner.write();
        if let Some(entry) = map.get_mut(call_id) {
            if entry.status == ExecutionStatus::Cancelled {
                return Err(GatewayError::Cancelled(call_id.to_string()));
            }
            tracing::trace!(call_id = %call_id, phase = ?phase, "Execution phase");
            entry.phase = phase;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`GatewayError::Cancelled`] if the call was cancelled.
    pub(crate) fn checkpoint(&self, call_id: &str) -> Result<()> {
        match self.inner.read().get(call_id) {
            Some(e) if e.status == ExecutionStatus::Cancelled => {
                Err(GatewayError::Cancelled(call_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Flag a running call as cancelled. False if unknown or already finished.
    pub(crate) fn cancel(&self, call_id: &str) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(call_id) {
            Some(entry) if entry.status == ExecutionStatus::Running && !entry.phase.is_terminal() => {
                entry.status = ExecutionStatus::Cancelled;
                entry.phase = ExecutionPhase::Cancelled;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ActiveExecution> {
        let mut out: Vec<_> = self.inner.read().values().cloned().collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_entry_on_drop() {
        let tracker = ExecutionTracker::default();
        {
            let _guard = tracker.begin("c1", "listPets").unwrap();
            assert_eq!(tracker.snapshot().len(), 1);
            assert!(tracker.begin("c1", "listPets").is_err());
        }
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn cancel_flips_status_and_blocks_further_phases() {
        let tracker = ExecutionTracker::default();
        let _guard = tracker.begin("c1", "listPets").unwrap();
        tracker.advance("c1", ExecutionPhase::ResolvingTool).unwrap();

        assert!(tracker.cancel("c1"));
        assert!(!tracker.cancel("c1"));
        assert!(!tracker.cancel("unknown"));

        let snap = tracker.snapshot();
        assert_eq!(snap[0].phase, ExecutionPhase::Cancelled);
        assert_eq!(snap[0].status, ExecutionStatus::Cancelled);
        assert!(matches!(
            tracker.advance("c1", ExecutionPhase::Executing),
            Err(GatewayError::Cancelled(_))
        ));
        assert!(tracker.checkpoint("c1").is_err());
    }

    #[test]
    fn completed_calls_cannot_be_cancelled() {
        let tracker = ExecutionTracker::default();
        let _guard = tracker.begin("c1", "t").unwrap();
        tracker.advance("c1", ExecutionPhase::Completed).unwrap();
        assert!(!tracker.cancel("c1"));
    }
}
