use super::{Credentials, SecretStore};
use crate::error::WarehouseError;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process secret store for tests and dry runs.
///
/// Clones share state, so a caller can hand one clone to the pipeline and
/// inspect the other afterwards.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, Credentials>,
    /// Scripted health answers, consumed front to back; healthy once drained.
    health_script: VecDeque<bool>,
    fail_reads: bool,
    fail_writes: bool,
    health_checks: u32,
    reads: u32,
    writes: u32,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(path: &str, credentials: Credentials) -> Self {
        let store = Self::new();
        store.state().documents.insert(path.to_string(), credentials);
        store
    }

    /// Answer the next health checks with `answers`, then report healthy.
    pub fn script_health(&self, answers: impl IntoIterator<Item = bool>) {
        self.state().health_script.extend(answers);
    }

    pub fn fail_reads(&self) {
        self.state().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    pub fn document(&self, path: &str) -> Option<Credentials> {
        self.state().documents.get(path).cloned()
    }

    pub fn health_checks(&self) -> u32 {
        self.state().health_checks
    }

    pub fn reads(&self) -> u32 {
        self.state().reads
    }

    pub fn writes(&self) -> u32 {
        self.state().writes
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicked test thread leaves the data itself intact.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SecretStore for MemorySecretStore {
    async fn is_healthy(&self) -> Result<bool, WarehouseError> {
        let mut state = self.state();
        state.health_checks += 1;
        Ok(state.health_script.pop_front().unwrap_or(true))
    }

    async fn read_credentials(&self, path: &str) -> Result<Option<Credentials>, WarehouseError> {
        let mut state = self.state();
        state.reads += 1;
        if state.fail_reads {
            return Err(WarehouseError::SecretRead {
                path: path.to_string(),
                status: StatusCode::FORBIDDEN,
            });
        }
        Ok(state.documents.get(path).cloned())
    }

    async fn write_credentials(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state();
        state.writes += 1;
        if state.fail_writes {
            return Err(WarehouseError::SecretWrite {
                path: path.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        state
            .documents
            .insert(path.to_string(), credentials.clone());
        Ok(())
    }
}
