use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use dealscout_common::{Run, RunResult, RunState};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Run store error: {0}")]
    Store(String),

    #[error("Run task failed: {0}")]
    TaskFailed(String),
}

/// Run bookkeeping. Injected so the controller holds no global state.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: Run) -> Result<(), RunError>;

    async fn set_state(&self, run_id: &str, state: RunState) -> Result<(), RunError>;

    async fn get(&self, run_id: &str) -> Option<Run>;

    async fn save_result(&self, run_id: &str, result: RunResult) -> Result<(), RunError>;

    /// Stored result; `None` until the run reaches a terminal state.
    async fn result(&self, run_id: &str) -> Option<RunResult>;
}

struct Entry {
    run: Run,
    result: Option<RunResult>,
}

/// Process-lifetime in-memory store. Nothing is evicted.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, Entry>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: Run) -> Result<(), RunError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(RunError::Store(format!("duplicate run id {}", run.id)));
        }
        runs.insert(run.id.clone(), Entry { run, result: None });
        Ok(())
    }

    async fn set_state(&self, run_id: &str, state: RunState) -> Result<(), RunError> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        entry.run.state = state;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Option<Run> {
        self.runs.read().await.get(run_id).map(|e| e.run.clone())
    }

    async fn save_result(&self, run_id: &str, result: RunResult) -> Result<(), RunError> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        entry.result = Some(result);
        Ok(())
    }

    async fn result(&self, run_id: &str) -> Option<RunResult> {
        let runs = self.runs.read().await;
        let entry = runs.get(run_id)?;
        if !entry.run.state.is_terminal() {
            return None;
        }
        entry.result.clone()
    }
}
