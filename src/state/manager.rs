//! Process-wide store of active pipeline states.

use crate::events::{Event, EventLevel, EventSink, NoOpEventSink};
use crate::state::PipelineState;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Creates, tracks, and snapshots pipeline states by id.
///
/// When a persistence path is configured, every mutation writes a JSON
/// snapshot of all summaries. Persistence is best-effort and informational:
/// failures are logged and emitted as events but never raised, and
/// snapshots are never read back to resume a run.
pub struct StateManager {
    states: DashMap<Uuid, PipelineState>,
    persistence_path: Option<PathBuf>,
    sink: Arc<dyn EventSink>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Creates a manager without persistence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            persistence_path: None,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Enables best-effort JSON snapshots at the given path.
    #[must_use]
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Creates and tracks a new pipeline state, returning its id.
    pub fn create(&self, state: PipelineState) -> Uuid {
        let id = state.pipeline_id;
        self.states.insert(id, state);
        self.persist_all();
        id
    }

    /// Returns a clone of a tracked state.
    #[must_use]
    pub fn get(&self, pipeline_id: &Uuid) -> Option<PipelineState> {
        self.states.get(pipeline_id).map(|s| s.clone())
    }

    /// Applies a mutation to a tracked state.
    ///
    /// Returns false when the id is unknown.
    pub fn update<F>(&self, pipeline_id: &Uuid, mutate: F) -> bool
    where
        F: FnOnce(&mut PipelineState),
    {
        let updated = match self.states.get_mut(pipeline_id) {
            Some(mut state) => {
                mutate(&mut state);
                true
            }
            None => false,
        };
        if updated {
            self.persist_all();
        }
        updated
    }

    /// Stops tracking a state, returning it.
    pub fn remove(&self, pipeline_id: &Uuid) -> Option<PipelineState> {
        let removed = self.states.remove(pipeline_id).map(|(_, s)| s);
        if removed.is_some() {
            self.persist_all();
        }
        removed
    }

    /// Returns the number of tracked states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no states are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns summaries of every tracked state.
    #[must_use]
    pub fn summaries(&self) -> Vec<Value> {
        self.states.iter().map(|s| s.summary()).collect()
    }

    fn persist_all(&self) {
        let Some(path) = &self.persistence_path else {
            return;
        };

        let snapshot = json!({ "pipelines": self.summaries() });
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| e.to_string())
            .and_then(|body| std::fs::write(path, body).map_err(|e| e.to_string()));

        if let Err(reason) = result {
            warn!(path = %path.display(), %reason, "State snapshot failed");
            self.sink.try_emit(
                Event::new(EventLevel::Warning, "state", "state.persist_failed")
                    .with_data(json!({"path": path.display().to_string(), "reason": reason})),
            );
        }
    }
}
