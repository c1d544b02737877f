//! The task tree facade
//!
//! [`TaskTree`] owns a [`TreeBuilder`] and the special folder controllers
//! behind one async mutex, fetches records from the provider, and publishes
//! the composed root list: virtual folders first, then project folders.

use crate::builder::{BuildKind, TreeBuilder};
use crate::config::TreeConfig;
use crate::events::{TreeEvent, TreeEventReceiver, TreeEvents};
use crate::identity;
use crate::node::{ProjectFolder, SpecialFolderKind, TaskNode, TreeStats};
use crate::provider::TaskProvider;
use crate::record::{ResolvedRecord, TaskRecord};
use crate::refresh::{RefreshCoordinator, RefreshRequest};
use crate::sort;
use crate::special::SpecialFolder;
use crate::storage::{self, Storage, StorageScope};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Workspace storage key of the last refresh summary
pub const LAST_REFRESH_KEY: &str = "lastRefresh";

/// Default time allowed for one provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Summary persisted after every completed refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRefresh {
    /// `full` or the rebuilt source type
    pub kind: String,
    /// Tasks in the tree afterwards
    pub task_count: usize,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Result of a refresh that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The tree was rebuilt
    Completed,
    /// Cancelled while collecting records; the tree can be refreshed again
    Cancelled,
}

struct TreeState {
    config: TreeConfig,
    builder: TreeBuilder,
    special: Vec<SpecialFolder>,
    roots: Vec<Arc<ProjectFolder>>,
}

impl TreeState {
    /// Resolve a (possibly folder-local) id to a task id present in the tree
    fn known_task_id<'a>(&self, id: &'a str) -> Result<&'a str> {
        let task_id = identity::unwrap_special_task_id(id).unwrap_or(id);
        if self.builder.find_task(task_id).is_some() {
            Ok(task_id)
        } else {
            Err(Error::unknown_task(task_id))
        }
    }

    fn special_mut(&mut self, kind: SpecialFolderKind) -> Result<&mut SpecialFolder> {
        self.special
            .iter_mut()
            .find(|folder| folder.kind() == kind)
            .ok_or_else(|| Error::precondition(format!("no controller for '{kind}'")))
    }

    /// Rebuild the virtual folders and recompose the root list
    async fn compose_roots(&mut self) {
        let Self {
            config,
            builder,
            special,
            roots,
        } = self;
        let Some(projects) = builder.tree() else {
            roots.clear();
            return;
        };
        let mut composed = Vec::with_capacity(projects.len() + special.len());
        for folder in special.iter_mut() {
            if let Some(rendered) = folder.build(builder.task_map()).await {
                composed.push(rendered);
            }
        }
        composed.extend(projects.iter().cloned());
        sort::sort_folders(&mut composed, config.sort_project_folders_alpha);
        *roots = composed;
    }
}

/// A task tree shared by any number of consumers
pub struct TaskTree {
    provider: Arc<dyn TaskProvider>,
    storage: Arc<dyn Storage>,
    coordinator: Arc<RefreshCoordinator>,
    events: TreeEvents,
    provider_timeout: Duration,
    state: Mutex<TreeState>,
}

impl std::fmt::Debug for TaskTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTree")
            .field("coordinator", &self.coordinator)
            .field("provider_timeout", &self.provider_timeout)
            .finish_non_exhaustive()
    }
}

impl TaskTree {
    /// Create a tree and load the special folder stores.
    ///
    /// No records are fetched until the first [`refresh`](Self::refresh).
    pub async fn open(
        provider: Arc<dyn TaskProvider>,
        storage: Arc<dyn Storage>,
        coordinator: Arc<RefreshCoordinator>,
        config: TreeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut special = Vec::with_capacity(SpecialFolderKind::ALL.len());
        for kind in SpecialFolderKind::ALL {
            let mut folder = SpecialFolder::new(
                kind,
                config.special_folders.for_kind(kind),
                Arc::clone(&storage),
            );
            folder.load().await;
            special.push(folder);
        }
        Ok(Self {
            provider,
            storage,
            coordinator,
            events: TreeEvents::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            state: Mutex::new(TreeState {
                config,
                builder: TreeBuilder::new(),
                special,
                roots: Vec::new(),
            }),
        })
    }

    /// Limit the time allowed for each provider call
    #[must_use]
    pub const fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// The coordinator serializing refreshes of this tree
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Subscribe to change notifications
    #[must_use]
    pub fn subscribe(&self) -> TreeEventReceiver {
        self.events.subscribe()
    }

    /// Rebuild the tree.
    ///
    /// Waits for any in-flight refresh first. Provider failures are logged
    /// and treated as "no tasks".
    ///
    /// # Errors
    ///
    /// Fails only on precondition violations and invalid configuration.
    #[instrument(skip(self, cancel))]
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome> {
        let _guard = self.coordinator.begin().await;
        let mut state = self.state.lock().await;

        let plan = RefreshCoordinator::plan(&request, state.builder.tree().is_some());
        let records = self.fetch_records(&plan.kind, cancel).await;
        if cancel.is_cancelled() {
            info!(kind = %plan.kind, "Refresh cancelled");
            return Ok(RefreshOutcome::Cancelled);
        }
        // Only discard the previous tree once its replacement is in hand
        if plan.invalidate {
            state.builder.invalidate();
            self.events.emit(TreeEvent::Invalidated);
        }
        let scopes = match self.provider.list_scopes().await {
            Ok(scopes) => scopes,
            Err(e) => {
                warn!(error = %e, "Failed to list project scopes");
                Vec::new()
            }
        };
        let resolved: Vec<ResolvedRecord> = records
            .into_iter()
            .map(|record| {
                let path = self.provider.resolve_relative_path(&record);
                ResolvedRecord::with_path(Arc::new(record), path)
            })
            .collect();

        let config = state.config.clone();
        state.builder.build(&resolved, &scopes, &plan.kind, &config)?;
        state.compose_roots().await;

        let task_count = state.builder.task_map().len();
        drop(state);
        self.record_refresh(&plan.kind, task_count).await;
        self.events.emit(TreeEvent::refreshed(&plan.kind, task_count));
        info!(kind = %plan.kind, tasks = task_count, "Task tree refreshed");
        Ok(RefreshOutcome::Completed)
    }

    async fn fetch_records(&self, kind: &BuildKind, cancel: &CancellationToken) -> Vec<TaskRecord> {
        let listing = self.provider.list_tasks(kind.source_type(), cancel);
        match tokio::time::timeout(self.provider_timeout, listing).await {
            Ok(Ok(records)) => {
                debug!(count = records.len(), "Fetched task records");
                records
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Task provider failed, using an empty task list");
                Vec::new()
            }
            Err(_) => {
                let e = Error::Timeout {
                    millis: u64::try_from(self.provider_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!(error = %e, "Task provider timed out, using an empty task list");
                Vec::new()
            }
        }
    }

    async fn record_refresh(&self, kind: &BuildKind, task_count: usize) {
        let summary = LastRefresh {
            kind: kind.to_string(),
            task_count,
            timestamp: Utc::now().timestamp_millis(),
        };
        if let Err(e) = storage::save(
            self.storage.as_ref(),
            StorageScope::Workspace,
            LAST_REFRESH_KEY,
            &summary,
        )
        .await
        {
            warn!(error = %e, "Failed to record refresh summary");
        }
    }

    /// Summary of the last completed refresh, from any session
    pub async fn last_refresh(&self) -> Option<LastRefresh> {
        storage::load_or_default::<Option<LastRefresh>>(
            self.storage.as_ref(),
            StorageScope::Workspace,
            LAST_REFRESH_KEY,
        )
        .await
    }

    /// The current root list; empty before the first refresh
    pub async fn roots(&self) -> Vec<Arc<ProjectFolder>> {
        self.state.lock().await.roots.clone()
    }

    /// Node counts of the current root list
    pub async fn stats(&self) -> TreeStats {
        TreeStats::collect(&self.state.lock().await.roots)
    }

    /// The active configuration
    pub async fn config(&self) -> TreeConfig {
        self.state.lock().await.config.clone()
    }

    /// Look up a task by id; folder-local ids resolve to their task
    pub async fn task(&self, id: &str) -> Option<Arc<TaskNode>> {
        let task_id = identity::unwrap_special_task_id(id).unwrap_or(id);
        self.state.lock().await.builder.find_task(task_id).cloned()
    }

    /// Replace the configuration; the next refresh is a full rebuild
    pub async fn update_config(&self, config: TreeConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state.lock().await;
        for folder in &mut state.special {
            folder.set_settings(config.special_folders.for_kind(folder.kind()));
        }
        state.config = config;
        state.builder.invalidate();
        state.roots.clear();
        drop(state);
        debug!("Configuration replaced, tree invalidated");
        self.events.emit(TreeEvent::Invalidated);
        Ok(())
    }

    /// Add a task to a virtual folder
    pub async fn save_task(&self, kind: SpecialFolderKind, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let task_id = identity::unwrap_special_task_id(id).unwrap_or(id);
        let task = state
            .builder
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| Error::unknown_task(task_id))?;
        state.special_mut(kind)?.save_task(&task).await?;
        self.finish_special_change(state, kind).await;
        Ok(())
    }

    /// Remove a task from a virtual folder. Returns whether it was present.
    pub async fn remove_task(&self, kind: SpecialFolderKind, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let task_id = identity::unwrap_special_task_id(id).unwrap_or(id);
        let removed = state.special_mut(kind)?.remove_task(task_id).await?;
        if removed {
            self.finish_special_change(state, kind).await;
        }
        Ok(removed)
    }

    /// Pin or unpin a task inside a virtual folder
    pub async fn set_pinned(&self, kind: SpecialFolderKind, id: &str, pinned: bool) -> Result<bool> {
        let mut state = self.state.lock().await;
        let task_id = state.known_task_id(id)?;
        let changed = state.special_mut(kind)?.set_pinned(task_id, pinned).await?;
        if changed {
            self.finish_special_change(state, kind).await;
        }
        Ok(changed)
    }

    /// Set or clear the label of a task inside a virtual folder
    pub async fn rename(&self, kind: SpecialFolderKind, id: &str, label: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        let task_id = state.known_task_id(id)?;
        state.special_mut(kind)?.rename(task_id, label).await?;
        self.finish_special_change(state, kind).await;
        Ok(())
    }

    /// Empty a virtual folder
    pub async fn clear(&self, kind: SpecialFolderKind) -> Result<()> {
        let mut state = self.state.lock().await;
        state.special_mut(kind)?.clear().await?;
        self.finish_special_change(state, kind).await;
        Ok(())
    }

    async fn finish_special_change(
        &self,
        mut state: tokio::sync::MutexGuard<'_, TreeState>,
        kind: SpecialFolderKind,
    ) {
        state.compose_roots().await;
        drop(state);
        self.events.emit(TreeEvent::FolderChanged {
            folder_id: identity::special_folder_id(kind),
        });
    }

    /// Announce a status change of one task.
    ///
    /// Every virtual folder showing the task gets a folder event, followed by
    /// one task event for the project tree node.
    pub async fn notify_task_changed(&self, id: &str) {
        let task_id = identity::unwrap_special_task_id(id).unwrap_or(id);
        let affected: Vec<SpecialFolderKind> = self
            .state
            .lock()
            .await
            .special
            .iter()
            .filter(|folder| folder.has_task(task_id))
            .map(SpecialFolder::kind)
            .collect();
        for kind in affected {
            self.events.emit(TreeEvent::FolderChanged {
                folder_id: identity::special_folder_id(kind),
            });
        }
        self.events.emit(TreeEvent::TaskChanged {
            task_id: task_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::record::Scope;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    struct BrokenProvider;

    #[async_trait]
    impl TaskProvider for BrokenProvider {
        async fn list_tasks(
            &self,
            _source_type: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<TaskRecord>> {
            Err(Error::provider("scan failed"))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl TaskProvider for SlowProvider {
        async fn list_tasks(
            &self,
            _source_type: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<TaskRecord>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    async fn open(provider: Arc<dyn TaskProvider>) -> TaskTree {
        TaskTree::open(
            provider,
            Arc::new(MemoryStorage::new()),
            Arc::new(RefreshCoordinator::new()),
            TreeConfig::default(),
        )
        .await
        .unwrap()
    }

    fn records() -> Vec<TaskRecord> {
        vec![
            TaskRecord::new("npm", "build", Scope::project("web")),
            TaskRecord::new("npm", "lint", Scope::project("web")),
        ]
    }

    #[tokio::test]
    async fn test_roots_empty_before_refresh() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        assert!(tree.roots().await.is_empty());
        assert!(tree.last_refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_builds_and_records_summary() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        let mut rx = tree.subscribe();
        let outcome = tree
            .refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Completed);

        let roots = tree.roots().await;
        // Enabled virtual folders lead, even when empty
        let labels: Vec<&str> = roots.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Last Tasks", "Favorites", "User Tasks", "web"]);
        assert_eq!(tree.stats().await.tasks, 2);

        let summary = tree.last_refresh().await.unwrap();
        assert_eq!(summary.kind, "full");
        assert_eq!(summary.task_count, 2);
        assert!(rx.drain().iter().any(TreeEvent::is_whole_tree));
        assert!(!tree.coordinator().is_busy());
    }

    #[tokio::test]
    async fn test_provider_failure_yields_empty_tree() {
        let tree = open(Arc::new(BrokenProvider)).await;
        let outcome = tree
            .refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Completed);
        assert_eq!(tree.stats().await.tasks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_yields_empty_tree() {
        let tree = open(Arc::new(SlowProvider))
            .await
            .with_provider_timeout(Duration::from_secs(1));
        let outcome = tree
            .refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Completed);
        assert_eq!(tree.stats().await.folders, 0);
    }

    #[tokio::test]
    async fn test_cancelled_refresh() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = tree.refresh(RefreshRequest::All, &cancel).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Cancelled);
        assert!(!tree.coordinator().is_busy());

        let outcome = tree
            .refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_config_change_keeps_previous_tree() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        tree.refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        let before = tree.roots().await;
        let task_id = tree.state.lock().await.builder.task_map().keys().next().cloned().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = tree
            .refresh(RefreshRequest::ConfigChanged, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Cancelled);

        let after = tree.roots().await;
        assert_eq!(before.len(), after.len());
        assert_eq!(tree.stats().await.tasks, 2);
        assert!(tree.task(&task_id).await.is_some());
        tree.save_task(SpecialFolderKind::Favorites, &task_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_unknown_task_fails() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        tree.refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        let err = tree
            .save_task(SpecialFolderKind::Favorites, "task:missing")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTask { .. }));
    }

    #[tokio::test]
    async fn test_pin_and_rename_require_known_task() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        tree.refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        let pin = tree
            .set_pinned(SpecialFolderKind::Favorites, "Favorites::task:missing", true)
            .await;
        assert!(matches!(pin, Err(Error::UnknownTask { id }) if id == "task:missing"));
        let rename = tree
            .rename(SpecialFolderKind::Favorites, "task:missing", Some("x"))
            .await;
        assert!(matches!(rename, Err(Error::UnknownTask { .. })));
    }

    #[tokio::test]
    async fn test_notify_task_changed_targets_showing_folders() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        tree.refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        let task_id = tree.state.lock().await.builder.task_map().keys().next().cloned().unwrap();
        tree.save_task(SpecialFolderKind::Favorites, &task_id)
            .await
            .unwrap();

        let mut rx = tree.subscribe();
        tree.notify_task_changed(&task_id).await;
        assert_eq!(
            rx.drain(),
            vec![
                TreeEvent::FolderChanged {
                    folder_id: identity::special_folder_id(SpecialFolderKind::Favorites)
                },
                TreeEvent::TaskChanged { task_id }
            ]
        );
    }

    #[tokio::test]
    async fn test_update_config_invalidates() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        tree.refresh(RefreshRequest::All, &CancellationToken::new())
            .await
            .unwrap();
        let mut config = TreeConfig::default();
        config.special_folders.last_tasks.enabled = false;
        tree.update_config(config).await.unwrap();
        assert!(tree.roots().await.is_empty());

        tree.refresh(RefreshRequest::SourceType("npm".into()), &CancellationToken::new())
            .await
            .unwrap();
        let roots = tree.roots().await;
        assert!(roots.iter().all(|f| f.label != "Last Tasks"));
        assert_eq!(tree.last_refresh().await.unwrap().kind, "full");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let tree = open(Arc::new(StaticProvider::new(records()))).await;
        let config = TreeConfig {
            exclude_tasks: vec!["(".to_string()],
            ..TreeConfig::default()
        };
        assert!(tree.update_config(config).await.is_err());
    }
}
