//! Tree node types
//!
//! Ownership is strictly downward: a [`ProjectFolder`] owns its children, a
//! [`Container`] owns its children. Upward links (`folder_id`,
//! `container_id`) are plain ids resolved through the builder's maps.
//!
//! Nodes are immutable once built and shared through `Arc`. A rebuild that
//! produces an equal node hands back the previous `Arc`, so consumers can use
//! [`Arc::ptr_eq`] to detect nodes that did not change.

use crate::record::{Scope, TaskRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The virtual folders that can be overlaid on the root list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialFolderKind {
    /// Recently executed tasks
    LastUsed,
    /// User favorites
    Favorites,
    /// User-level task list
    User,
}

impl SpecialFolderKind {
    /// All kinds in root-list precedence order
    pub const ALL: [Self; 3] = [Self::LastUsed, Self::Favorites, Self::User];

    /// Folder label shown in the tree
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LastUsed => "Last Tasks",
            Self::Favorites => "Favorites",
            Self::User => "User Tasks",
        }
    }

    /// Key under which the folder's entries are persisted
    #[must_use]
    pub const fn store_key(self) -> &'static str {
        match self {
            Self::LastUsed => "lastTasks",
            Self::Favorites => "favorites",
            Self::User => "userTasks",
        }
    }

    /// Position among the virtual folders at the top of the root list
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::LastUsed => 0,
            Self::Favorites => 1,
            Self::User => 2,
        }
    }

    /// Whether rendered entries are ordered by label rather than recency
    #[must_use]
    pub const fn sorts_alphabetically(self) -> bool {
        !matches!(self, Self::LastUsed)
    }
}

impl std::fmt::Display for SpecialFolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SpecialFolderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "last" | "lasttasks" | "last-tasks" | "recent" => Ok(Self::LastUsed),
            "favorites" | "favorite" | "fav" => Ok(Self::Favorites),
            "user" | "usertasks" | "user-tasks" => Ok(Self::User),
            other => Err(format!("unknown special folder '{other}'")),
        }
    }
}

/// What a root-level folder represents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderKind {
    /// A project (or the synthetic user scope)
    Project(Scope),
    /// A virtual folder backed by a persisted store
    Special(SpecialFolderKind),
}

/// A root-level folder
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFolder {
    /// Deterministic id
    pub id: String,
    /// Display label
    pub label: String,
    /// Project or virtual folder
    pub kind: FolderKind,
    /// Containers (project folders) or task clones (virtual folders)
    pub children: Vec<TreeItem>,
}

impl ProjectFolder {
    /// Whether this is a virtual folder
    #[must_use]
    pub const fn is_special(&self) -> bool {
        matches!(self.kind, FolderKind::Special(_))
    }

    /// The scope of a project folder
    #[must_use]
    pub const fn scope(&self) -> Option<&Scope> {
        match &self.kind {
            FolderKind::Project(scope) => Some(scope),
            FolderKind::Special(_) => None,
        }
    }

    /// The kind of a virtual folder
    #[must_use]
    pub const fn special_kind(&self) -> Option<SpecialFolderKind> {
        match self.kind {
            FolderKind::Special(kind) => Some(kind),
            FolderKind::Project(_) => None,
        }
    }
}

/// A task-type container or a synthesized sub-group
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Deterministic id
    pub id: String,
    /// Display label
    pub label: String,
    /// Provider type of every task below this container
    pub source_type: String,
    /// Synthesized by the grouping engine
    pub is_group: bool,
    /// Number of label segments consumed by grouping (0 for leaf containers)
    pub group_level: usize,
    /// Resolved relative path of the definition file
    pub relative_path: String,
    /// Id of the owning project folder
    pub folder_id: String,
    /// Owning scope
    pub scope: Scope,
    /// Installing action attached to a leaf container
    pub install_record: Option<Arc<TaskRecord>>,
    /// Sub-groups first, then tasks
    pub children: Vec<TreeItem>,
}

impl Container {
    /// Direct task children
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<TaskNode>> {
        self.children.iter().filter_map(TreeItem::as_task)
    }

    /// Direct container children
    pub fn containers(&self) -> impl Iterator<Item = &Arc<Container>> {
        self.children.iter().filter_map(TreeItem::as_container)
    }

    /// Every task below this container, depth first
    #[must_use]
    pub fn descendant_tasks(&self) -> Vec<Arc<TaskNode>> {
        let mut out = Vec::new();
        collect_tasks(&self.children, &mut out);
        out
    }
}

fn collect_tasks(items: &[TreeItem], out: &mut Vec<Arc<TaskNode>>) {
    for item in items {
        match item {
            TreeItem::Task(task) => out.push(Arc::clone(task)),
            TreeItem::Container(container) => collect_tasks(&container.children, out),
        }
    }
}

/// A single task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    /// Node id: the task id, or a folder-local id inside a virtual folder
    pub id: String,
    /// Id of the underlying task (equal to `id` outside virtual folders)
    pub task_id: String,
    /// Display label
    pub label: String,
    /// Grouping depth this task sits at
    pub group_level: usize,
    /// Id of the owning container
    pub container_id: String,
    /// The record this node was built from
    pub record: Arc<TaskRecord>,
}

impl TaskNode {
    /// Provider type of the task
    #[must_use]
    pub fn source_type(&self) -> &str {
        &self.record.source_type
    }

    /// Scope of the task
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.record.scope
    }

    /// Whether this node is a clone living in a virtual folder
    #[must_use]
    pub fn is_special_clone(&self) -> bool {
        self.id != self.task_id
    }
}

/// A child of a folder or container
#[derive(Debug, Clone, PartialEq)]
pub enum TreeItem {
    /// A container or sub-group
    Container(Arc<Container>),
    /// A task
    Task(Arc<TaskNode>),
}

impl TreeItem {
    /// Node id
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Container(c) => &c.id,
            Self::Task(t) => &t.id,
        }
    }

    /// Display label
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Container(c) => &c.label,
            Self::Task(t) => &t.label,
        }
    }

    /// Whether this is a container
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    /// The task, if this is one
    #[must_use]
    pub const fn as_task(&self) -> Option<&Arc<TaskNode>> {
        match self {
            Self::Task(t) => Some(t),
            Self::Container(_) => None,
        }
    }

    /// The container, if this is one
    #[must_use]
    pub const fn as_container(&self) -> Option<&Arc<Container>> {
        match self {
            Self::Container(c) => Some(c),
            Self::Task(_) => None,
        }
    }

    /// Children of a container; empty for tasks
    #[must_use]
    pub fn children(&self) -> &[TreeItem] {
        match self {
            Self::Container(c) => &c.children,
            Self::Task(_) => &[],
        }
    }

    /// Whether both items point at the very same node allocation
    #[must_use]
    pub fn same_node(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Container(a), Self::Container(b)) => Arc::ptr_eq(a, b),
            (Self::Task(a), Self::Task(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Node counts over a root list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Project folders
    pub folders: usize,
    /// Virtual folders
    pub special_folders: usize,
    /// Leaf containers
    pub containers: usize,
    /// Group containers
    pub groups: usize,
    /// Task nodes in project folders
    pub tasks: usize,
    /// Containers carrying an installing action
    pub install_actions: usize,
}

impl TreeStats {
    /// Count the nodes of a root list
    #[must_use]
    pub fn collect(roots: &[Arc<ProjectFolder>]) -> Self {
        let mut stats = Self::default();
        for folder in roots {
            if folder.is_special() {
                stats.special_folders += 1;
                continue;
            }
            stats.folders += 1;
            stats.count_items(&folder.children);
        }
        stats
    }

    fn count_items(&mut self, items: &[TreeItem]) {
        for item in items {
            match item {
                TreeItem::Task(_) => self.tasks += 1,
                TreeItem::Container(c) => {
                    if c.is_group {
                        self.groups += 1;
                    } else {
                        self.containers += 1;
                    }
                    if c.install_record.is_some() {
                        self.install_actions += 1;
                    }
                    self.count_items(&c.children);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, label: &str) -> Arc<TaskNode> {
        Arc::new(TaskNode {
            id: id.to_string(),
            task_id: id.to_string(),
            label: label.to_string(),
            group_level: 0,
            container_id: "container:x".to_string(),
            record: Arc::new(TaskRecord::new("npm", label, Scope::project("web"))),
        })
    }

    fn container(id: &str, is_group: bool, children: Vec<TreeItem>) -> Arc<Container> {
        Arc::new(Container {
            id: id.to_string(),
            label: id.to_string(),
            source_type: "npm".to_string(),
            is_group,
            group_level: usize::from(is_group),
            relative_path: String::new(),
            folder_id: "folder:web".to_string(),
            scope: Scope::project("web"),
            install_record: None,
            children,
        })
    }

    #[test]
    fn test_special_folder_kind_parsing() {
        assert_eq!(
            "last".parse::<SpecialFolderKind>(),
            Ok(SpecialFolderKind::LastUsed)
        );
        assert_eq!(
            "Favorites".parse::<SpecialFolderKind>(),
            Ok(SpecialFolderKind::Favorites)
        );
        assert!("pinned".parse::<SpecialFolderKind>().is_err());
    }

    #[test]
    fn test_descendant_tasks_walks_groups() {
        let group = container(
            "build",
            true,
            vec![TreeItem::Task(task("t1", "dev")), TreeItem::Task(task("t2", "prod"))],
        );
        let leaf = container(
            "npm",
            false,
            vec![TreeItem::Container(group), TreeItem::Task(task("t3", "lint"))],
        );
        let ids: Vec<String> = leaf.descendant_tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(leaf.tasks().count(), 1);
        assert_eq!(leaf.containers().count(), 1);
    }

    #[test]
    fn test_same_node_uses_pointer_identity() {
        let a = task("t1", "build");
        let item = TreeItem::Task(Arc::clone(&a));
        let copy = TreeItem::Task(Arc::new((*a).clone()));
        assert_eq!(item, copy);
        assert!(item.same_node(&TreeItem::Task(a)));
        assert!(!item.same_node(&copy));
    }

    #[test]
    fn test_tree_stats() {
        let group = container("build", true, vec![TreeItem::Task(task("t1", "dev"))]);
        let leaf = container(
            "npm",
            false,
            vec![TreeItem::Container(group), TreeItem::Task(task("t2", "lint"))],
        );
        let folder = Arc::new(ProjectFolder {
            id: "folder:web".to_string(),
            label: "web".to_string(),
            kind: FolderKind::Project(Scope::project("web")),
            children: vec![TreeItem::Container(leaf)],
        });
        let special = Arc::new(ProjectFolder {
            id: "special:favorites".to_string(),
            label: "Favorites".to_string(),
            kind: FolderKind::Special(SpecialFolderKind::Favorites),
            children: Vec::new(),
        });
        let stats = TreeStats::collect(&[special, folder]);
        assert_eq!(stats.folders, 1);
        assert_eq!(stats.special_folders, 1);
        assert_eq!(stats.containers, 1);
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.tasks, 2);
    }
}
