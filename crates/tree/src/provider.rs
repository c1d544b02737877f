//! Task discovery collaborator

use crate::record::{Scope, TaskRecord, normalize_relative_path};
use crate::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Source of task records
#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// List discovered tasks, optionally limited to one source type.
    ///
    /// Implementations poll `cancel` while scanning and return whatever they
    /// collected so far once it fires.
    async fn list_tasks(
        &self,
        source_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskRecord>>;

    /// Every known project scope, including projects without tasks
    async fn list_scopes(&self) -> Result<Vec<Scope>> {
        Ok(Vec::new())
    }

    /// Path used for container and task identity
    fn resolve_relative_path(&self, record: &TaskRecord) -> String {
        normalize_relative_path(&record.relative_path)
    }
}

/// Provider backed by an in-memory record list
#[derive(Debug, Default)]
pub struct StaticProvider {
    records: RwLock<Vec<TaskRecord>>,
    scopes: RwLock<Vec<Scope>>,
}

impl StaticProvider {
    /// Create a provider serving `records`
    #[must_use]
    pub fn new(records: Vec<TaskRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            scopes: RwLock::default(),
        }
    }

    /// Also report these scopes as known projects
    #[must_use]
    pub fn with_scopes(self, scopes: Vec<Scope>) -> Self {
        Self {
            records: self.records,
            scopes: RwLock::new(scopes),
        }
    }

    /// Replace the served records
    pub async fn replace(&self, records: Vec<TaskRecord>) {
        *self.records.write().await = records;
    }

    /// Add one record
    pub async fn push(&self, record: TaskRecord) {
        self.records.write().await.push(record);
    }

    /// Remove every record matching the predicate
    pub async fn remove_where(&self, predicate: impl Fn(&TaskRecord) -> bool + Send) {
        self.records.write().await.retain(|r| !predicate(r));
    }
}

#[async_trait]
impl TaskProvider for StaticProvider {
    async fn list_tasks(
        &self,
        source_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskRecord>> {
        let records = self.records.read().await;
        let mut out = Vec::with_capacity(records.len());
        for record in records.iter() {
            if cancel.is_cancelled() {
                debug!(collected = out.len(), "Task listing cancelled");
                break;
            }
            if source_type.is_none_or(|t| t == record.source_type) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>> {
        Ok(self.scopes.read().await.clone())
    }
}
