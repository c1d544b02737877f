//! Label-based grouping of tasks into nested sub-containers
//!
//! Task labels are split on a configured separator. Adjacent (sorted) tasks
//! whose first `d + 1` parts match are moved into a group container labelled
//! with part `d`, and the group is split again at `d + 1` until the maximum
//! depth is reached. A group needs at least two members; a lone task stays
//! where it is with its label intact.
//!
//! The functions here take and return owned [`DraftContainer`] values and
//! never touch the builder's maps, so the algorithm can be exercised on its
//! own.

use crate::config::TreeConfig;
use crate::identity;
use crate::record::{Scope, TaskRecord};
use crate::sort::{self, SortKey};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::trace;

/// Source types whose labels may end in `" - <config file>"`
const CONFIG_SUFFIX_SOURCE_TYPES: &[&str] = &["tsc"];

/// Marker between a task name and its configuration file
const CONFIG_SUFFIX_MARKER: &str = " - ";

/// Grouping parameters taken from [`TreeConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingOptions {
    /// Label segment separator
    pub separator: String,
    /// Maximum nesting depth, 0 disables grouping
    pub max_depth: usize,
    /// Remove the shared prefix from labels inside groups
    pub strip_labels: bool,
}

impl GroupingOptions {
    /// Whether grouping does anything at all
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.max_depth > 0 && !self.separator.is_empty()
    }
}

impl From<&TreeConfig> for GroupingOptions {
    fn from(config: &TreeConfig) -> Self {
        Self {
            separator: config.group_separator.clone(),
            max_depth: config.group_max_depth,
            strip_labels: config.group_strip_task_label,
        }
    }
}

/// Working copy of a task while a tree is being built
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTask {
    /// Task id
    pub id: String,
    /// Current label
    pub label: String,
    /// Group depth
    pub group_level: usize,
    /// Owning container id
    pub container_id: String,
    /// Source record
    pub record: Arc<TaskRecord>,
}

/// Working copy of a container while a tree is being built
#[derive(Debug, Clone, PartialEq)]
pub struct DraftContainer {
    /// Container id
    pub id: String,
    /// Display label
    pub label: String,
    /// Provider type
    pub source_type: String,
    /// Synthesized by grouping
    pub is_group: bool,
    /// Group depth
    pub group_level: usize,
    /// Resolved relative path
    pub relative_path: String,
    /// Owning folder id
    pub folder_id: String,
    /// Owning scope
    pub scope: Scope,
    /// Installing action
    pub install_record: Option<Arc<TaskRecord>>,
    /// Children
    pub children: Vec<DraftItem>,
}

/// Child of a draft container
#[derive(Debug, Clone, PartialEq)]
pub enum DraftItem {
    /// Sub-group
    Container(DraftContainer),
    /// Task
    Task(DraftTask),
}

impl SortKey for DraftItem {
    fn sort_label(&self) -> &str {
        match self {
            Self::Container(c) => &c.label,
            Self::Task(t) => &t.label,
        }
    }

    fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    fn sort_id(&self) -> &str {
        match self {
            Self::Container(c) => &c.id,
            Self::Task(t) => &t.id,
        }
    }
}

impl DraftContainer {
    /// Sort children recursively with the standard container rules
    pub fn sort_recursive(&mut self) {
        for child in &mut self.children {
            if let DraftItem::Container(c) = child {
                c.sort_recursive();
            }
        }
        sort::sort_containers(&mut self.children);
    }
}

/// Split a label into grouping segments.
///
/// For source types that name tasks `"<task> - <config file>"`, the
/// `" - <config file>"` tail stays attached to the last segment instead of
/// producing segments of its own.
#[must_use]
pub fn split_label(label: &str, separator: &str, source_type: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![label.to_string()];
    }
    if CONFIG_SUFFIX_SOURCE_TYPES.contains(&source_type)
        && let Some((head, file)) = label.rsplit_once(CONFIG_SUFFIX_MARKER)
        && !head.is_empty()
        && !file.is_empty()
    {
        let mut parts: Vec<String> = head.split(separator).map(str::to_string).collect();
        if let Some(last) = parts.last_mut() {
            last.push_str(CONFIG_SUFFIX_MARKER);
            last.push_str(file);
        }
        return parts;
    }
    label.split(separator).map(str::to_string).collect()
}

/// Group the tasks of one leaf container.
///
/// # Errors
///
/// Returns a precondition error when the container is already a group or
/// already holds sub-containers; regrouping grouped output is a logic defect.
pub fn group_container(
    container: DraftContainer,
    options: &GroupingOptions,
) -> Result<DraftContainer> {
    if !options.enabled() {
        return Ok(container);
    }
    if container.is_group {
        return Err(Error::precondition(format!(
            "container '{}' is a group and cannot be regrouped",
            container.id
        )));
    }
    if container
        .children
        .iter()
        .any(|child| matches!(child, DraftItem::Container(_)))
    {
        return Err(Error::precondition(format!(
            "container '{}' already holds sub-groups",
            container.id
        )));
    }

    let mut grouped = split_level(container, 0, options);
    if options.strip_labels {
        strip_labels(&mut grouped.children, options);
    }
    prune_absorbed(&mut grouped.children);
    Ok(grouped)
}

/// Group every leaf container of one project folder.
pub fn group_folder(
    containers: Vec<DraftContainer>,
    options: &GroupingOptions,
) -> Result<Vec<DraftContainer>> {
    containers
        .into_iter()
        .map(|container| group_container(container, options))
        .collect()
}

/// Parts `0..=depth` of a task label, if the label continues past them.
/// Empty parts never name a group.
fn group_key(task: &DraftTask, depth: usize, options: &GroupingOptions) -> Option<Vec<String>> {
    let parts = split_label(&task.record.name, &options.separator, &task.record.source_type);
    if parts.len() <= depth + 1 {
        return None;
    }
    let key = &parts[..=depth];
    if key.iter().any(String::is_empty) {
        return None;
    }
    Some(key.to_vec())
}

fn split_level(mut parent: DraftContainer, depth: usize, options: &GroupingOptions) -> DraftContainer {
    let mut children = std::mem::take(&mut parent.children);
    sort::sort_containers(&mut children);

    let mut out = Vec::with_capacity(children.len());
    let mut run: Vec<DraftTask> = Vec::new();
    let mut run_key: Option<Vec<String>> = None;

    for child in children {
        match child {
            DraftItem::Container(c) => {
                flush_run(&parent, &mut out, &mut run, run_key.take(), depth, options);
                out.push(DraftItem::Container(c));
            }
            DraftItem::Task(task) => {
                let key = group_key(&task, depth, options);
                if key.is_some() && key == run_key {
                    run.push(task);
                } else {
                    flush_run(&parent, &mut out, &mut run, run_key.take(), depth, options);
                    run_key = key;
                    run.push(task);
                }
            }
        }
    }
    flush_run(&parent, &mut out, &mut run, run_key, depth, options);

    parent.children = out;
    parent
}

fn flush_run(
    parent: &DraftContainer,
    out: &mut Vec<DraftItem>,
    run: &mut Vec<DraftTask>,
    key: Option<Vec<String>>,
    depth: usize,
    options: &GroupingOptions,
) {
    let tasks = std::mem::take(run);
    let Some(key) = key.filter(|_| tasks.len() >= 2) else {
        out.extend(tasks.into_iter().map(DraftItem::Task));
        return;
    };

    let level = depth + 1;
    let group_key = key.join(&options.separator);
    let id = identity::container_id(
        &parent.scope,
        &parent.source_type,
        &parent.relative_path,
        level,
        Some(&group_key),
    );
    trace!(group = %group_key, level, members = tasks.len(), "Creating task group");

    let children = tasks
        .into_iter()
        .map(|mut task| {
            task.group_level = level;
            task.container_id.clone_from(&id);
            DraftItem::Task(task)
        })
        .collect();

    let group = DraftContainer {
        id,
        label: key[depth].clone(),
        source_type: parent.source_type.clone(),
        is_group: true,
        group_level: level,
        relative_path: parent.relative_path.clone(),
        folder_id: parent.folder_id.clone(),
        scope: parent.scope.clone(),
        install_record: None,
        children,
    };

    let group = if level < options.max_depth {
        split_level(group, level, options)
    } else {
        group
    };
    out.push(DraftItem::Container(group));
}

fn strip_labels(items: &mut [DraftItem], options: &GroupingOptions) {
    for item in items {
        match item {
            DraftItem::Container(c) => strip_labels(&mut c.children, options),
            DraftItem::Task(task) if task.group_level > 0 => {
                let parts =
                    split_label(&task.record.name, &options.separator, &task.record.source_type);
                if parts.len() > task.group_level {
                    task.label = parts[task.group_level..].join(&options.separator);
                }
            }
            DraftItem::Task(_) => {}
        }
    }
}

/// Drop group containers left without children
fn prune_absorbed(items: &mut Vec<DraftItem>) {
    for item in items.iter_mut() {
        if let DraftItem::Container(c) = item {
            prune_absorbed(&mut c.children);
        }
    }
    items.retain(|item| match item {
        DraftItem::Container(c) => !(c.is_group && c.children.is_empty()),
        DraftItem::Task(_) => true,
    });
}
