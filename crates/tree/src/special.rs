//! Virtual folders backed by persisted task lists
//!
//! A [`SpecialFolder`] keeps two bounded stores of `(task id, timestamp)`
//! entries: one in global storage for user-scope tasks and one in workspace
//! storage for project tasks. Building the folder merges both stores newest
//! first, drops entries whose task no longer exists, and wraps each live
//! task in a folder-local clone with id `"<folder label>::<task id>"`.

use crate::config::SpecialFolderSettings;
use crate::identity;
use crate::node::{FolderKind, ProjectFolder, SpecialFolderKind, TaskNode, TreeItem};
use crate::sort;
use crate::storage::{self, Storage, StorageScope};
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One persisted reference to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEntry {
    /// Referenced task id
    pub task_id: String,
    /// Milliseconds since the Unix epoch when the entry was saved
    pub timestamp: i64,
}

/// Controller for one virtual folder
pub struct SpecialFolder {
    kind: SpecialFolderKind,
    settings: SpecialFolderSettings,
    storage: Arc<dyn Storage>,
    store: Vec<StoreEntry>,
    store_ws: Vec<StoreEntry>,
    pinned: BTreeSet<String>,
    renames: BTreeMap<String, String>,
    rendered: Option<Arc<ProjectFolder>>,
    last_timestamp: i64,
}

impl std::fmt::Debug for SpecialFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialFolder")
            .field("kind", &self.kind)
            .field("settings", &self.settings)
            .field("store", &self.store)
            .field("store_ws", &self.store_ws)
            .field("pinned", &self.pinned)
            .field("renames", &self.renames)
            .finish_non_exhaustive()
    }
}

impl SpecialFolder {
    /// Create an empty controller; call [`load`](Self::load) to read the stores
    #[must_use]
    pub fn new(
        kind: SpecialFolderKind,
        settings: SpecialFolderSettings,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            kind,
            settings,
            storage,
            store: Vec::new(),
            store_ws: Vec::new(),
            pinned: BTreeSet::new(),
            renames: BTreeMap::new(),
            rendered: None,
            last_timestamp: 0,
        }
    }

    /// Folder kind
    #[must_use]
    pub const fn kind(&self) -> SpecialFolderKind {
        self.kind
    }

    /// Current settings
    #[must_use]
    pub const fn settings(&self) -> SpecialFolderSettings {
        self.settings
    }

    /// Replace the settings; takes effect on the next build
    pub fn set_settings(&mut self, settings: SpecialFolderSettings) {
        self.settings = settings;
    }

    /// The folder produced by the last build, if enabled
    #[must_use]
    pub fn rendered(&self) -> Option<&Arc<ProjectFolder>> {
        self.rendered.as_ref()
    }

    /// Pinned task ids
    #[must_use]
    pub const fn pinned(&self) -> &BTreeSet<String> {
        &self.pinned
    }

    /// User labels by task id
    #[must_use]
    pub const fn renames(&self) -> &BTreeMap<String, String> {
        &self.renames
    }

    fn key(&self) -> &'static str {
        self.kind.store_key()
    }

    fn pinned_key(&self) -> String {
        format!("{}.pinned", self.key())
    }

    fn renames_key(&self) -> String {
        format!("{}.renames", self.key())
    }

    /// Read all persisted state; unreadable values load as empty
    pub async fn load(&mut self) {
        let storage = self.storage.as_ref();
        self.store = storage::load_or_default(storage, StorageScope::Global, self.key()).await;
        self.store_ws =
            storage::load_or_default(storage, StorageScope::Workspace, self.key()).await;
        self.pinned =
            storage::load_or_default(storage, StorageScope::Workspace, &self.pinned_key()).await;
        self.renames =
            storage::load_or_default(storage, StorageScope::Workspace, &self.renames_key()).await;
        self.last_timestamp = self
            .store
            .iter()
            .chain(&self.store_ws)
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(0);
        debug!(
            folder = self.kind.label(),
            global = self.store.len(),
            workspace = self.store_ws.len(),
            "Loaded special folder stores"
        );
    }

    /// Write every store back to storage
    async fn flush(&self) -> Result<()> {
        let storage = self.storage.as_ref();
        storage::save(storage, StorageScope::Global, self.key(), &self.store).await?;
        storage::save(storage, StorageScope::Workspace, self.key(), &self.store_ws).await?;
        storage::save(storage, StorageScope::Workspace, &self.pinned_key(), &self.pinned).await?;
        storage::save(storage, StorageScope::Workspace, &self.renames_key(), &self.renames)
            .await
    }

    /// Drop entries, pins and renames whose task is gone. Returns whether
    /// anything was removed.
    pub fn clean_stores(&mut self, task_map: &HashMap<String, Arc<TaskNode>>) -> bool {
        let before =
            self.store.len() + self.store_ws.len() + self.pinned.len() + self.renames.len();
        self.store.retain(|e| task_map.contains_key(&e.task_id));
        self.store_ws.retain(|e| task_map.contains_key(&e.task_id));
        self.pinned.retain(|id| task_map.contains_key(id));
        self.renames.retain(|id, _| task_map.contains_key(id));
        let after =
            self.store.len() + self.store_ws.len() + self.pinned.len() + self.renames.len();
        if after < before {
            debug!(
                folder = self.kind.label(),
                removed = before - after,
                "Pruned stale special folder entries"
            );
        }
        after < before
    }

    /// Both stores merged newest first, unique by task id, capped at
    /// `max_items`
    #[must_use]
    pub fn combined_store(&self) -> Vec<StoreEntry> {
        let mut merged: Vec<StoreEntry> =
            self.store.iter().chain(&self.store_ws).cloned().collect();
        merged.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        let mut seen = HashSet::new();
        merged.retain(|e| seen.insert(e.task_id.clone()));
        merged.truncate(self.settings.max_items);
        merged
    }

    /// Prune stale entries, then rebuild the folder from the current task map.
    ///
    /// Returns `None` when the folder is disabled. Children equal to the
    /// previous build keep their `Arc`.
    pub async fn build(
        &mut self,
        task_map: &HashMap<String, Arc<TaskNode>>,
    ) -> Option<Arc<ProjectFolder>> {
        if self.clean_stores(task_map)
            && let Err(e) = self.flush().await
        {
            warn!(folder = self.kind.label(), error = %e, "Failed to persist pruned stores");
        }
        if !self.settings.enabled {
            self.rendered = None;
            return None;
        }

        let folder_id = identity::special_folder_id(self.kind);
        let previous: HashMap<&str, &Arc<TaskNode>> = self
            .rendered
            .iter()
            .flat_map(|folder| folder.children.iter())
            .filter_map(TreeItem::as_task)
            .map(|task| (task.id.as_str(), task))
            .collect();

        let mut children: Vec<TreeItem> = self
            .combined_store()
            .iter()
            .filter_map(|entry| task_map.get(&entry.task_id))
            .map(|task| {
                let clone = TaskNode {
                    id: identity::special_task_id(self.kind.label(), &task.task_id),
                    task_id: task.task_id.clone(),
                    label: self.label_for(task),
                    group_level: 0,
                    container_id: folder_id.clone(),
                    record: Arc::clone(&task.record),
                };
                let node = match previous.get(clone.id.as_str()) {
                    Some(prev) if ***prev == clone => Arc::clone(prev),
                    _ => Arc::new(clone),
                };
                TreeItem::Task(node)
            })
            .collect();

        let pinned: HashSet<String> = self.pinned.iter().cloned().collect();
        if self.kind.sorts_alphabetically() {
            sort::sort_tasks(&mut children, &pinned);
        } else {
            sort::pinned_first(&mut children, &pinned);
        }

        let folder = ProjectFolder {
            id: folder_id,
            label: self.kind.label().to_string(),
            kind: FolderKind::Special(self.kind),
            children,
        };
        let folder = match &self.rendered {
            Some(prev) if **prev == folder => Arc::clone(prev),
            _ => Arc::new(folder),
        };
        self.rendered = Some(Arc::clone(&folder));
        Some(folder)
    }

    fn label_for(&self, task: &TaskNode) -> String {
        self.renames.get(&task.task_id).cloned().unwrap_or_else(|| {
            format!(
                "{} ({} - {})",
                task.record.name,
                task.scope().label(),
                task.source_type()
            )
        })
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    /// Add a task, or move it to the front if already present.
    ///
    /// User-scope tasks go to the global store, project tasks to the
    /// workspace store. The oldest entry of that store is evicted when it
    /// is full.
    pub async fn save_task(&mut self, task: &TaskNode) -> Result<()> {
        let task_id = task.task_id.clone();
        self.store.retain(|e| e.task_id != task_id);
        self.store_ws.retain(|e| e.task_id != task_id);

        let timestamp = self.next_timestamp();
        let max_items = self.settings.max_items.max(1);
        let target = if task.scope().is_user() {
            &mut self.store
        } else {
            &mut self.store_ws
        };
        while target.len() >= max_items {
            let Some(oldest) = target
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(i, _)| i)
            else {
                break;
            };
            let evicted = target.remove(oldest);
            debug!(task = %evicted.task_id, "Evicted oldest special folder entry");
        }
        target.push(StoreEntry { task_id, timestamp });
        self.flush().await
    }

    /// Remove a task. Returns whether it was present.
    pub async fn remove_task(&mut self, task_id: &str) -> Result<bool> {
        let before = self.store.len() + self.store_ws.len();
        self.store.retain(|e| e.task_id != task_id);
        self.store_ws.retain(|e| e.task_id != task_id);
        let removed = self.store.len() + self.store_ws.len() < before;
        self.pinned.remove(task_id);
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    /// Whether the last build shows this task
    #[must_use]
    pub fn has_task(&self, task_id: &str) -> bool {
        let id = identity::special_task_id(self.kind.label(), task_id);
        self.rendered
            .as_ref()
            .is_some_and(|folder| folder.children.iter().any(|child| child.id() == id))
    }

    /// Whether either store references this task
    #[must_use]
    pub fn contains(&self, task_id: &str) -> bool {
        self.store
            .iter()
            .chain(&self.store_ws)
            .any(|e| e.task_id == task_id)
    }

    /// Pin or unpin a task. Returns whether the pinned set changed.
    pub async fn set_pinned(&mut self, task_id: &str, pinned: bool) -> Result<bool> {
        let changed = if pinned {
            self.pinned.insert(task_id.to_string())
        } else {
            self.pinned.remove(task_id)
        };
        if changed {
            self.flush().await?;
        }
        Ok(changed)
    }

    /// Set or clear (`None` or blank) the user label of a task
    pub async fn rename(&mut self, task_id: &str, label: Option<&str>) -> Result<()> {
        match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(label) => {
                self.renames.insert(task_id.to_string(), label.to_string());
            }
            None => {
                self.renames.remove(task_id);
            }
        }
        self.flush().await
    }

    /// Empty both stores and the pinned set
    pub async fn clear(&mut self) -> Result<()> {
        self.store.clear();
        self.store_ws.clear();
        self.pinned.clear();
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Scope, TaskRecord};
    use crate::storage::MemoryStorage;

    fn task(name: &str, scope: Scope) -> Arc<TaskNode> {
        let id = identity::task_id(&scope, "", "ant", "ant", name);
        Arc::new(TaskNode {
            id: id.clone(),
            task_id: id,
            label: name.to_string(),
            group_level: 0,
            container_id: "container:ant".to_string(),
            record: Arc::new(TaskRecord::new("ant", name, scope)),
        })
    }

    fn task_map(tasks: &[Arc<TaskNode>]) -> HashMap<String, Arc<TaskNode>> {
        tasks.iter().map(|t| (t.id.clone(), Arc::clone(t))).collect()
    }

    fn settings(max_items: usize) -> SpecialFolderSettings {
        SpecialFolderSettings {
            enabled: true,
            max_items,
        }
    }

    fn folder(kind: SpecialFolderKind, max_items: usize) -> (SpecialFolder, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let folder = SpecialFolder::new(kind, settings(max_items), storage.clone());
        (folder, storage)
    }

    fn child_labels(folder: &ProjectFolder) -> Vec<&str> {
        folder.children.iter().map(TreeItem::label).collect()
    }

    #[tokio::test]
    async fn test_saved_task_renders_with_project_and_type() {
        let (mut last, _) = folder(SpecialFolderKind::LastUsed, 10);
        let test_a = task("testA", Scope::project("P1"));
        last.save_task(&test_a).await.unwrap();

        let rendered = last.build(&task_map(&[test_a.clone()])).await.unwrap();
        assert_eq!(rendered.label, "Last Tasks");
        assert_eq!(child_labels(&rendered), vec!["testA (P1 - ant)"]);
        let clone = rendered.children[0].as_task().unwrap();
        assert_eq!(clone.id, format!("Last Tasks::{}", test_a.id));
        assert!(clone.is_special_clone());
        assert!(last.has_task(&test_a.id));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let (mut last, _) = folder(SpecialFolderKind::LastUsed, 2);
        let tasks: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| task(n, Scope::project("P1")))
            .collect();
        for t in &tasks {
            last.save_task(t).await.unwrap();
        }
        let ids: Vec<String> = last.combined_store().into_iter().map(|e| e.task_id).collect();
        assert_eq!(ids, vec![tasks[2].id.clone(), tasks[1].id.clone()]);
        assert!(!last.contains(&tasks[0].id));
    }

    #[tokio::test]
    async fn test_combined_store_is_capped_and_unique() {
        let (mut favorites, _) = folder(SpecialFolderKind::Favorites, 2);
        favorites.store = vec![
            StoreEntry {
                task_id: "task:a".into(),
                timestamp: 5,
            },
            StoreEntry {
                task_id: "task:b".into(),
                timestamp: 1,
            },
        ];
        favorites.store_ws = vec![
            StoreEntry {
                task_id: "task:a".into(),
                timestamp: 3,
            },
            StoreEntry {
                task_id: "task:c".into(),
                timestamp: 4,
            },
        ];
        let combined = favorites.combined_store();
        let ids: Vec<&str> = combined.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["task:a", "task:c"]);
    }

    #[tokio::test]
    async fn test_stale_entries_are_pruned_and_persisted() {
        let (mut favorites, storage) = folder(SpecialFolderKind::Favorites, 10);
        let live = task("live", Scope::project("P1"));
        let gone = task("gone", Scope::project("P1"));
        favorites.save_task(&live).await.unwrap();
        favorites.save_task(&gone).await.unwrap();

        let rendered = favorites.build(&task_map(&[live.clone()])).await.unwrap();
        assert_eq!(rendered.children.len(), 1);
        assert!(!favorites.contains(&gone.id));

        let persisted: Vec<StoreEntry> = storage::load_or_default(
            storage.as_ref(),
            StorageScope::Workspace,
            "favorites",
        )
        .await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].task_id, live.id);
    }

    #[tokio::test]
    async fn test_user_scope_goes_to_global_store() {
        let (mut user, storage) = folder(SpecialFolderKind::User, 10);
        user.save_task(&task("backup", Scope::User)).await.unwrap();
        user.save_task(&task("build", Scope::project("P1")))
            .await
            .unwrap();

        let global: Vec<StoreEntry> =
            storage::load_or_default(storage.as_ref(), StorageScope::Global, "userTasks").await;
        let workspace: Vec<StoreEntry> =
            storage::load_or_default(storage.as_ref(), StorageScope::Workspace, "userTasks")
                .await;
        assert_eq!(global.len(), 1);
        assert_eq!(workspace.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_restores_state() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let build = task("build", Scope::project("P1"));
        {
            let mut favorites =
                SpecialFolder::new(SpecialFolderKind::Favorites, settings(10), storage.clone());
            favorites.save_task(&build).await.unwrap();
            favorites.set_pinned(&build.id, true).await.unwrap();
            favorites.rename(&build.id, Some("Build it")).await.unwrap();
        }
        let mut favorites =
            SpecialFolder::new(SpecialFolderKind::Favorites, settings(10), storage.clone());
        favorites.load().await;
        assert!(favorites.contains(&build.id));
        assert!(favorites.pinned().contains(&build.id));

        let rendered = favorites.build(&task_map(&[build.clone()])).await.unwrap();
        assert_eq!(child_labels(&rendered), vec!["Build it"]);
    }

    #[tokio::test]
    async fn test_saving_again_moves_to_front_with_monotonic_time() {
        let (mut last, _) = folder(SpecialFolderKind::LastUsed, 10);
        let a = task("a", Scope::project("P1"));
        let b = task("b", Scope::project("P1"));
        last.save_task(&a).await.unwrap();
        last.save_task(&b).await.unwrap();
        last.save_task(&a).await.unwrap();

        let combined = last.combined_store();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].task_id, a.id);
        assert!(combined[0].timestamp > combined[1].timestamp);

        let rendered = last.build(&task_map(&[a, b])).await.unwrap();
        assert_eq!(child_labels(&rendered), vec!["a (P1 - ant)", "b (P1 - ant)"]);
    }

    #[tokio::test]
    async fn test_pinned_first_in_favorites() {
        let (mut favorites, _) = folder(SpecialFolderKind::Favorites, 10);
        let a = task("a", Scope::project("P1"));
        let z = task("z", Scope::project("P1"));
        favorites.save_task(&a).await.unwrap();
        favorites.save_task(&z).await.unwrap();
        favorites.set_pinned(&z.id, true).await.unwrap();

        let rendered = favorites.build(&task_map(&[a, z])).await.unwrap();
        assert_eq!(child_labels(&rendered), vec!["z (P1 - ant)", "a (P1 - ant)"]);
    }

    #[tokio::test]
    async fn test_rebuild_reuses_nodes() {
        let (mut favorites, _) = folder(SpecialFolderKind::Favorites, 10);
        let a = task("a", Scope::project("P1"));
        favorites.save_task(&a).await.unwrap();
        let map = task_map(&[a]);
        let first = favorites.build(&map).await.unwrap();
        let second = favorites.build(&map).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_disabled_folder_is_not_rendered() {
        let (mut favorites, _) = folder(SpecialFolderKind::Favorites, 10);
        let a = task("a", Scope::project("P1"));
        favorites.save_task(&a).await.unwrap();
        favorites.set_settings(SpecialFolderSettings {
            enabled: false,
            max_items: 10,
        });
        assert!(favorites.build(&task_map(&[a.clone()])).await.is_none());
        assert!(!favorites.has_task(&a.id));
        assert!(favorites.contains(&a.id));
    }

    #[tokio::test]
    async fn test_disabled_folder_still_prunes_stale_entries() {
        let (mut favorites, storage) = folder(SpecialFolderKind::Favorites, 10);
        let gone = task("gone", Scope::project("P1"));
        favorites.save_task(&gone).await.unwrap();
        favorites.set_settings(SpecialFolderSettings {
            enabled: false,
            max_items: 10,
        });

        assert!(favorites.build(&HashMap::new()).await.is_none());
        assert!(!favorites.contains(&gone.id));
        let persisted: Vec<StoreEntry> = storage::load_or_default(
            storage.as_ref(),
            StorageScope::Workspace,
            "favorites",
        )
        .await;
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (mut favorites, _) = folder(SpecialFolderKind::Favorites, 10);
        let a = task("a", Scope::project("P1"));
        let b = task("b", Scope::User);
        favorites.save_task(&a).await.unwrap();
        favorites.save_task(&b).await.unwrap();

        assert!(favorites.remove_task(&a.id).await.unwrap());
        assert!(!favorites.remove_task(&a.id).await.unwrap());
        favorites.clear().await.unwrap();
        assert!(favorites.combined_store().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_storage_loads_empty() {
        let mut favorites = SpecialFolder::new(
            SpecialFolderKind::Favorites,
            settings(10),
            Arc::new(MemoryStorage::failing()),
        );
        favorites.load().await;
        assert!(favorites.combined_store().is_empty());
        let a = task("a", Scope::project("P1"));
        assert!(favorites.save_task(&a).await.is_err());
    }
}
