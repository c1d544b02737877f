//! Tree builder
//!
//! Places resolved task records into project folders and leaf containers,
//! runs the grouping engine, sorts the result and interns it into shared
//! nodes. The builder keeps three id maps from the previous pass: whenever
//! a node comes out equal to the one already stored under its id, the
//! stored `Arc` is handed back so consumers keep pointer identity.
//!
//! A [`BuildKind::SourceType`] build only replaces the containers and tasks
//! of that type; every other container keeps its `Arc`.

use crate::config::{TaskFilter, TreeConfig};
use crate::grouping::{self, DraftContainer, DraftItem, DraftTask, GroupingOptions};
use crate::identity;
use crate::node::{Container, FolderKind, ProjectFolder, TaskNode, TreeItem};
use crate::record::{ResolvedRecord, Scope};
use crate::sort;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What a build pass covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildKind {
    /// Every source type, from scratch
    Full,
    /// Only the named source type
    SourceType(String),
}

impl BuildKind {
    /// The source type a partial build is limited to
    #[must_use]
    pub fn source_type(&self) -> Option<&str> {
        match self {
            Self::Full => None,
            Self::SourceType(source_type) => Some(source_type),
        }
    }

    fn covers(&self, source_type: &str) -> bool {
        self.source_type().is_none_or(|t| t == source_type)
    }
}

impl std::fmt::Display for BuildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::SourceType(source_type) => write!(f, "{source_type}"),
        }
    }
}

/// Leaf containers collected for one scope before grouping
struct FolderDraft {
    scope: Scope,
    containers: Vec<DraftContainer>,
}

/// Stateful tree builder
#[derive(Debug, Default)]
pub struct TreeBuilder {
    task_map: HashMap<String, Arc<TaskNode>>,
    container_map: HashMap<String, Arc<Container>>,
    folder_map: HashMap<String, Arc<ProjectFolder>>,
    root_folders: Option<Vec<Arc<ProjectFolder>>>,
}

impl TreeBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build or patch the tree from resolved records.
    ///
    /// `scopes` lists every known project; each gets a folder even without
    /// tasks. A partial build requested before any full build is promoted
    /// to a full build over the supplied records.
    ///
    /// # Errors
    ///
    /// Returns a precondition error for records whose scope cannot be
    /// resolved, and a configuration error for invalid exclude patterns.
    #[instrument(name = "build_tree", skip_all, fields(kind = %kind, records = records.len()))]
    pub fn build(
        &mut self,
        records: &[ResolvedRecord],
        scopes: &[Scope],
        kind: &BuildKind,
        config: &TreeConfig,
    ) -> Result<Vec<Arc<ProjectFolder>>> {
        let kind = if kind.source_type().is_some() && self.root_folders.is_none() {
            debug!("No previous tree, promoting partial build to full");
            BuildKind::Full
        } else {
            kind.clone()
        };
        let filter = config.task_filter()?;
        let options = GroupingOptions::from(config);
        let drafts = collect_drafts(records, scopes, &kind, &filter)?;

        let (mut task_map, mut container_map) = match kind.source_type() {
            None => (HashMap::new(), HashMap::new()),
            Some(source_type) => (
                retain_other_types(&self.task_map, source_type, |t| t.source_type()),
                retain_other_types(&self.container_map, source_type, |c| &c.source_type),
            ),
        };

        // Existing folders keep their position and their untouched containers
        let mut folders: Vec<(Scope, Vec<TreeItem>)> = Vec::new();
        if let (Some(source_type), Some(roots)) = (kind.source_type(), &self.root_folders) {
            for folder in roots {
                if let Some(scope) = folder.scope() {
                    let kept = folder
                        .children
                        .iter()
                        .filter(|item| match item {
                            TreeItem::Container(c) => c.source_type != source_type,
                            TreeItem::Task(t) => t.source_type() != source_type,
                        })
                        .cloned()
                        .collect();
                    folders.push((scope.clone(), kept));
                }
            }
        }

        for draft in drafts {
            let grouped = grouping::group_folder(draft.containers, &options)?;
            let index = match folders.iter().position(|(scope, _)| *scope == draft.scope) {
                Some(index) => index,
                None => {
                    folders.push((draft.scope, Vec::new()));
                    folders.len() - 1
                }
            };
            for mut container in grouped {
                container.sort_recursive();
                let node = self.intern_container(container, &mut task_map, &mut container_map);
                folders[index].1.push(TreeItem::Container(node));
            }
        }

        let mut folder_map = HashMap::new();
        let mut roots = Vec::with_capacity(folders.len());
        for (scope, mut children) in folders {
            if children.is_empty() && !scopes.contains(&scope) {
                continue;
            }
            sort::sort_containers(&mut children);
            let folder = ProjectFolder {
                id: identity::folder_id(&scope),
                label: scope.label().to_string(),
                kind: FolderKind::Project(scope.clone()),
                children,
            };
            let folder = reuse_or_new(self.folder_map.get(&scope.key()), folder);
            folder_map.insert(scope.key(), Arc::clone(&folder));
            roots.push(folder);
        }
        sort::sort_folders(&mut roots, config.sort_project_folders_alpha);

        debug!(
            folders = roots.len(),
            containers = container_map.len(),
            tasks = task_map.len(),
            "Tree built"
        );
        self.task_map = task_map;
        self.container_map = container_map;
        self.folder_map = folder_map;
        self.root_folders = Some(roots.clone());
        Ok(roots)
    }

    fn intern_container(
        &self,
        draft: DraftContainer,
        tasks: &mut HashMap<String, Arc<TaskNode>>,
        containers: &mut HashMap<String, Arc<Container>>,
    ) -> Arc<Container> {
        let children = draft
            .children
            .into_iter()
            .map(|child| match child {
                DraftItem::Task(task) => TreeItem::Task(self.intern_task(task, tasks)),
                DraftItem::Container(group) => {
                    TreeItem::Container(self.intern_container(group, tasks, containers))
                }
            })
            .collect();
        let node = Container {
            id: draft.id,
            label: draft.label,
            source_type: draft.source_type,
            is_group: draft.is_group,
            group_level: draft.group_level,
            relative_path: draft.relative_path,
            folder_id: draft.folder_id,
            scope: draft.scope,
            install_record: draft.install_record,
            children,
        };
        let node = reuse_or_new(self.container_map.get(&node.id), node);
        containers.insert(node.id.clone(), Arc::clone(&node));
        node
    }

    fn intern_task(
        &self,
        draft: DraftTask,
        tasks: &mut HashMap<String, Arc<TaskNode>>,
    ) -> Arc<TaskNode> {
        let node = TaskNode {
            id: draft.id.clone(),
            task_id: draft.id,
            label: draft.label,
            group_level: draft.group_level,
            container_id: draft.container_id,
            record: draft.record,
        };
        let node = reuse_or_new(self.task_map.get(&node.id), node);
        tasks.insert(node.id.clone(), Arc::clone(&node));
        node
    }

    /// Drop all state; the next build is a full build
    pub fn invalidate(&mut self) {
        self.task_map.clear();
        self.container_map.clear();
        self.folder_map.clear();
        self.root_folders = None;
    }

    /// Every task node by id
    #[must_use]
    pub const fn task_map(&self) -> &HashMap<String, Arc<TaskNode>> {
        &self.task_map
    }

    /// Root project folders of the last build, `None` before the first one
    #[must_use]
    pub fn tree(&self) -> Option<&[Arc<ProjectFolder>]> {
        self.root_folders.as_deref()
    }

    /// Look up a task node
    #[must_use]
    pub fn find_task(&self, id: &str) -> Option<&Arc<TaskNode>> {
        self.task_map.get(id)
    }

    /// Look up a container or group
    #[must_use]
    pub fn find_container(&self, id: &str) -> Option<&Arc<Container>> {
        self.container_map.get(id)
    }

    /// Look up the folder of a scope
    #[must_use]
    pub fn find_folder(&self, scope: &Scope) -> Option<&Arc<ProjectFolder>> {
        self.folder_map.get(&scope.key())
    }
}

fn reuse_or_new<T: PartialEq>(previous: Option<&Arc<T>>, node: T) -> Arc<T> {
    match previous {
        Some(previous) if **previous == node => Arc::clone(previous),
        _ => Arc::new(node),
    }
}

fn retain_other_types<T>(
    map: &HashMap<String, Arc<T>>,
    source_type: &str,
    type_of: impl Fn(&T) -> &str,
) -> HashMap<String, Arc<T>> {
    map.iter()
        .filter(|(_, node)| type_of(node) != source_type)
        .map(|(id, node)| (id.clone(), Arc::clone(node)))
        .collect()
}

fn container_label(source_type: &str, resolved_path: &str) -> String {
    if resolved_path.is_empty() {
        source_type.to_string()
    } else {
        format!("{source_type} ({resolved_path})")
    }
}

/// Place records into per-scope leaf containers, in discovery order
fn collect_drafts(
    records: &[ResolvedRecord],
    scopes: &[Scope],
    kind: &BuildKind,
    filter: &TaskFilter,
) -> Result<Vec<FolderDraft>> {
    let mut folders: Vec<FolderDraft> = Vec::new();
    let mut folder_index: HashMap<Scope, usize> = HashMap::new();
    let mut container_index: HashMap<String, (usize, usize)> = HashMap::new();
    let mut seen_tasks: HashSet<String> = HashSet::new();

    for scope in scopes {
        if !scope.is_resolved() {
            return Err(Error::precondition(format!(
                "cannot create a folder for unresolved scope '{scope}'"
            )));
        }
        folder_index.entry(scope.clone()).or_insert_with(|| {
            folders.push(FolderDraft {
                scope: scope.clone(),
                containers: Vec::new(),
            });
            folders.len() - 1
        });
    }

    for resolved in records {
        let record = &resolved.record;
        if !kind.covers(&record.source_type) {
            continue;
        }
        if !record.scope.is_resolved() {
            return Err(Error::precondition(format!(
                "task '{}' ({}) has an unresolved scope",
                record.name, record.source_type
            )));
        }
        if !record.is_install && filter.is_excluded(&record.name) {
            debug!(task = %record.name, "Task excluded by configuration");
            continue;
        }

        let folder = *folder_index.entry(record.scope.clone()).or_insert_with(|| {
            folders.push(FolderDraft {
                scope: record.scope.clone(),
                containers: Vec::new(),
            });
            folders.len() - 1
        });

        let container_id = identity::container_id(
            &record.scope,
            &record.source_type,
            &resolved.resolved_path,
            0,
            None,
        );
        let (folder, slot) = *container_index
            .entry(container_id.clone())
            .or_insert_with(|| {
                let containers = &mut folders[folder].containers;
                containers.push(DraftContainer {
                    id: container_id.clone(),
                    label: container_label(&record.source_type, &resolved.resolved_path),
                    source_type: record.source_type.clone(),
                    is_group: false,
                    group_level: 0,
                    relative_path: resolved.resolved_path.clone(),
                    folder_id: identity::folder_id(&record.scope),
                    scope: record.scope.clone(),
                    install_record: None,
                    children: Vec::new(),
                });
                (folder, containers.len() - 1)
            });
        let container = &mut folders[folder].containers[slot];

        if record.is_install {
            if container.install_record.is_none() {
                container.install_record = Some(Arc::clone(record));
            }
            continue;
        }

        let task_id = identity::task_id(
            &record.scope,
            &resolved.resolved_path,
            &record.source_type,
            record.declared_type(),
            &record.name,
        );
        if !seen_tasks.insert(task_id.clone()) {
            debug!(task = %record.name, "Skipping duplicate task record");
            continue;
        }
        container.children.push(DraftItem::Task(DraftTask {
            id: task_id,
            label: record.name.clone(),
            group_level: 0,
            container_id,
            record: Arc::clone(record),
        }));
    }

    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TaskRecord;

    fn record(source_type: &str, name: &str, project: &str) -> ResolvedRecord {
        ResolvedRecord::new(TaskRecord::new(source_type, name, Scope::project(project)))
    }

    fn flat() -> TreeConfig {
        TreeConfig {
            group_max_depth: 0,
            ..TreeConfig::default()
        }
    }

    fn labels(items: &[TreeItem]) -> Vec<&str> {
        items.iter().map(TreeItem::label).collect()
    }

    fn container<'a>(folder: &'a ProjectFolder, label: &str) -> &'a Arc<Container> {
        folder
            .children
            .iter()
            .filter_map(TreeItem::as_container)
            .find(|c| c.label == label)
            .unwrap()
    }

    #[test]
    fn test_tree_is_none_before_first_build() {
        let builder = TreeBuilder::new();
        assert!(builder.tree().is_none());
        assert!(builder.task_map().is_empty());
    }

    #[test]
    fn test_single_project_single_type() {
        let mut builder = TreeBuilder::new();
        let records = vec![record("ant", "testB", "P1"), record("ant", "testA", "P1")];
        let roots = builder.build(&records, &[], &BuildKind::Full, &flat()).unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].label, "P1");
        let ant = container(&roots[0], "ant");
        assert_eq!(labels(&ant.children), vec!["testA", "testB"]);
        assert_eq!(builder.task_map().len(), 2);
        assert!(builder.find_container(&ant.id).is_some());
    }

    #[test]
    fn test_rebuild_reuses_every_node() {
        let mut builder = TreeBuilder::new();
        let records = vec![
            record("npm", "build-dev", "web"),
            record("npm", "build-prod", "web"),
            record("make", "all", "api"),
        ];
        let config = TreeConfig::default();
        let first = builder.build(&records, &[], &BuildKind::Full, &config).unwrap();
        let second = builder.build(&records, &[], &BuildKind::Full, &config).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_partial_build_keeps_other_types() {
        let mut builder = TreeBuilder::new();
        let config = TreeConfig::default();
        let records = vec![
            record("npm", "build", "web"),
            record("make", "all", "web"),
            record("make", "clean", "web"),
        ];
        let roots = builder.build(&records, &[], &BuildKind::Full, &config).unwrap();
        let make_before = Arc::clone(container(&roots[0], "make"));
        let all_before = Arc::clone(make_before.tasks().next().unwrap());

        let npm_only = vec![record("npm", "build", "web"), record("npm", "test", "web")];
        let roots = builder
            .build(&npm_only, &[], &BuildKind::SourceType("npm".into()), &config)
            .unwrap();

        let make_after = container(&roots[0], "make");
        assert!(Arc::ptr_eq(&make_before, make_after));
        assert!(Arc::ptr_eq(&all_before, builder.find_task(&all_before.id).unwrap()));
        assert_eq!(labels(&container(&roots[0], "npm").children), vec!["build", "test"]);
        assert_eq!(builder.task_map().len(), 4);
    }

    #[test]
    fn test_partial_build_removes_vanished_tasks() {
        let mut builder = TreeBuilder::new();
        let config = flat();
        let records = vec![record("npm", "build", "web"), record("npm", "lint", "web")];
        builder.build(&records, &[], &BuildKind::Full, &config).unwrap();
        let lint_id = builder
            .task_map()
            .values()
            .find(|t| t.label == "lint")
            .map(|t| t.id.clone())
            .unwrap();

        let records = vec![record("npm", "build", "web")];
        builder
            .build(&records, &[], &BuildKind::SourceType("npm".into()), &config)
            .unwrap();
        assert!(builder.find_task(&lint_id).is_none());
    }

    #[test]
    fn test_partial_build_without_tree_is_full() {
        let mut builder = TreeBuilder::new();
        let records = vec![record("npm", "build", "web"), record("make", "all", "web")];
        let roots = builder
            .build(&records, &[], &BuildKind::SourceType("npm".into()), &flat())
            .unwrap();
        assert_eq!(roots[0].children.len(), 2);
    }

    #[test]
    fn test_install_record_attaches_to_container() {
        let mut builder = TreeBuilder::new();
        let install = ResolvedRecord::new(
            TaskRecord::new("npm", "install", Scope::project("web")).as_install(),
        );
        let records = vec![install, record("npm", "build", "web")];
        let roots = builder.build(&records, &[], &BuildKind::Full, &flat()).unwrap();
        let npm = container(&roots[0], "npm");
        assert_eq!(labels(&npm.children), vec!["build"]);
        assert_eq!(npm.install_record.as_ref().unwrap().name, "install");
        assert_eq!(builder.task_map().len(), 1);
    }

    #[test]
    fn test_install_only_container_exists() {
        let mut builder = TreeBuilder::new();
        let install = ResolvedRecord::new(
            TaskRecord::new("npm", "install", Scope::project("web")).as_install(),
        );
        let roots = builder.build(&[install], &[], &BuildKind::Full, &flat()).unwrap();
        let npm = container(&roots[0], "npm");
        assert!(npm.children.is_empty());
        assert!(npm.install_record.is_some());
    }

    #[test]
    fn test_definition_paths_split_containers() {
        let mut builder = TreeBuilder::new();
        let nested = ResolvedRecord::new(
            TaskRecord::new("npm", "build", Scope::project("web")).with_relative_path("./packages/ui"),
        );
        let records = vec![record("npm", "build", "web"), nested];
        let roots = builder.build(&records, &[], &BuildKind::Full, &flat()).unwrap();
        assert_eq!(labels(&roots[0].children), vec!["npm", "npm (packages/ui)"]);
        assert_eq!(builder.task_map().len(), 2);
    }

    #[test]
    fn test_known_scopes_get_empty_folders() {
        let mut builder = TreeBuilder::new();
        let scopes = vec![Scope::project("empty"), Scope::project("web")];
        let records = vec![record("npm", "build", "web")];
        let roots = builder.build(&records, &scopes, &BuildKind::Full, &flat()).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].label, "empty");
        assert!(roots[0].children.is_empty());
    }

    #[test]
    fn test_user_scope_folder() {
        let mut builder = TreeBuilder::new();
        let records = vec![ResolvedRecord::new(TaskRecord::new(
            "shell",
            "backup",
            Scope::User,
        ))];
        let roots = builder.build(&records, &[], &BuildKind::Full, &flat()).unwrap();
        assert_eq!(roots[0].label, "User");
        assert!(builder.find_folder(&Scope::User).is_some());
    }

    #[test]
    fn test_excluded_tasks_are_dropped() {
        let mut builder = TreeBuilder::new();
        let config = TreeConfig {
            exclude_tasks: vec!["^pre".to_string()],
            ..flat()
        };
        let records = vec![record("npm", "prebuild", "web"), record("npm", "build", "web")];
        let roots = builder.build(&records, &[], &BuildKind::Full, &config).unwrap();
        assert_eq!(labels(&container(&roots[0], "npm").children), vec!["build"]);
    }

    #[test]
    fn test_unresolved_scope_is_precondition_error() {
        let mut builder = TreeBuilder::new();
        let records = vec![record("npm", "build", " ")];
        let err = builder
            .build(&records, &[], &BuildKind::Full, &flat())
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(builder.tree().is_none());
    }

    #[test]
    fn test_discovery_order_folders() {
        let mut builder = TreeBuilder::new();
        let config = TreeConfig {
            sort_project_folders_alpha: false,
            ..flat()
        };
        let records = vec![record("npm", "a", "web"), record("npm", "b", "api")];
        let roots = builder.build(&records, &[], &BuildKind::Full, &config).unwrap();
        let order: Vec<&str> = roots.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(order, vec!["web", "api"]);
    }

    #[test]
    fn test_invalidate_clears_state() {
        let mut builder = TreeBuilder::new();
        builder
            .build(&[record("npm", "build", "web")], &[], &BuildKind::Full, &flat())
            .unwrap();
        builder.invalidate();
        assert!(builder.tree().is_none());
        assert!(builder.task_map().is_empty());
        assert!(builder.find_folder(&Scope::project("web")).is_none());
    }

    #[test]
    fn test_duplicate_records_collapse() {
        let mut builder = TreeBuilder::new();
        let records = vec![record("npm", "build", "web"), record("npm", "build", "web")];
        let roots = builder.build(&records, &[], &BuildKind::Full, &flat()).unwrap();
        assert_eq!(container(&roots[0], "npm").children.len(), 1);
    }
}
