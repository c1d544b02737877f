//! Tree rendering
//!
//! The root list is first converted to a serializable [`TreeView`], which
//! [`TreeFormatter`] implementations turn into text.

use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use taskdeck_tree::{ProjectFolder, TreeItem, TreeStats};
use tracing::warn;

/// Placeholder shown for folders without tasks
pub const NO_TASKS: &str = "No tasks found";

/// Serializable snapshot of a root list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    /// Root folders in display order
    pub folders: Vec<FolderView>,
    /// Node counts
    pub stats: StatsView,
}

/// One root folder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    /// Folder id
    pub id: String,
    /// Display label
    pub label: String,
    /// Whether this is a virtual folder
    pub special: bool,
    /// Child nodes
    pub children: Vec<NodeView>,
}

/// Kind of a rendered node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Task-type container
    Container,
    /// Synthesized group
    Group,
    /// Task
    Task,
}

/// One container, group or task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    /// Node id
    pub id: String,
    /// Display label
    pub label: String,
    /// Node kind
    pub kind: NodeKind,
    /// Provider type
    pub source_type: String,
    /// Name of the installing action attached to a container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    /// Child nodes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
}

/// Node counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    /// Project folders
    pub folders: usize,
    /// Virtual folders
    pub special_folders: usize,
    /// Leaf containers
    pub containers: usize,
    /// Group containers
    pub groups: usize,
    /// Tasks in project folders
    pub tasks: usize,
}

impl From<TreeStats> for StatsView {
    fn from(stats: TreeStats) -> Self {
        Self {
            folders: stats.folders,
            special_folders: stats.special_folders,
            containers: stats.containers,
            groups: stats.groups,
            tasks: stats.tasks,
        }
    }
}

impl TreeView {
    /// Snapshot a root list
    #[must_use]
    pub fn from_roots(roots: &[Arc<ProjectFolder>]) -> Self {
        Self {
            folders: roots.iter().map(|f| FolderView::from_folder(f)).collect(),
            stats: TreeStats::collect(roots).into(),
        }
    }
}

impl FolderView {
    /// Snapshot one folder
    #[must_use]
    pub fn from_folder(folder: &ProjectFolder) -> Self {
        Self {
            id: folder.id.clone(),
            label: folder.label.clone(),
            special: folder.is_special(),
            children: folder.children.iter().map(NodeView::from_item).collect(),
        }
    }
}

impl NodeView {
    fn from_item(item: &TreeItem) -> Self {
        match item {
            TreeItem::Container(c) => Self {
                id: c.id.clone(),
                label: c.label.clone(),
                kind: if c.is_group {
                    NodeKind::Group
                } else {
                    NodeKind::Container
                },
                source_type: c.source_type.clone(),
                install: c.install_record.as_ref().map(|r| r.name.clone()),
                children: c.children.iter().map(Self::from_item).collect(),
            },
            TreeItem::Task(t) => Self {
                id: t.id.clone(),
                label: t.label.clone(),
                kind: NodeKind::Task,
                source_type: t.source_type().to_string(),
                install: None,
                children: Vec::new(),
            },
        }
    }
}

/// Trait for formatting a tree snapshot
pub trait TreeFormatter {
    /// Render the snapshot
    fn format(&self, view: &TreeView) -> String;

    /// Formatter name
    fn name(&self) -> &'static str;
}

// ============================================================================
// TextFormatter - Box-drawing Output
// ============================================================================

/// Plain text tree (no colors, suitable for piping)
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter {
    /// Print node ids next to labels
    pub show_ids: bool,
    /// Append the node count footer
    pub show_stats: bool,
}

impl TextFormatter {
    fn label(&self, label: &str, id: &str) -> String {
        if self.show_ids {
            format!("{label}  [{id}]")
        } else {
            label.to_string()
        }
    }

    fn write_nodes(&self, nodes: &[NodeView], output: &mut String, prefix: &str) {
        let count = nodes.len();
        for (i, node) in nodes.iter().enumerate() {
            let is_last = i == count - 1;
            let marker = if is_last { "└─ " } else { "├─ " };
            let _ = write!(output, "{prefix}{marker}{}", self.label(&node.label, &node.id));
            if let Some(install) = &node.install {
                let _ = write!(output, " (install: {install})");
            }
            output.push('\n');

            let child_prefix = if is_last { "   " } else { "│  " };
            self.write_nodes(&node.children, output, &format!("{prefix}{child_prefix}"));
        }
    }
}

impl TreeFormatter for TextFormatter {
    fn format(&self, view: &TreeView) -> String {
        let mut output = String::new();

        for folder in &view.folders {
            let _ = writeln!(output, "{}", self.label(&folder.label, &folder.id));
            if folder.children.is_empty() {
                let _ = writeln!(output, "└─ {NO_TASKS}");
            } else {
                self.write_nodes(&folder.children, &mut output, "");
            }
        }

        if output.is_empty() {
            output = format!("{NO_TASKS}\n");
        }

        if self.show_stats {
            let stats = view.stats;
            let _ = writeln!(
                output,
                "\n{} folders, {} containers, {} groups, {} tasks",
                stats.folders, stats.containers, stats.groups, stats.tasks
            );
        }

        output
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

// ============================================================================
// JsonFormatter - Structured Output
// ============================================================================

/// Pretty-printed JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl TreeFormatter for JsonFormatter {
    fn format(&self, view: &TreeView) -> String {
        match serde_json::to_string_pretty(view) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize tree view");
                String::from("{}")
            }
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
