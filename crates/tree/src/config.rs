//! Configuration for tree construction
//!
//! Loaded from a `taskdeck.toml` file or built in code. Every field has a
//! default so a partial file is always valid.

use crate::node::SpecialFolderKind;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tree construction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// Text separating label segments for grouping
    #[serde(default = "default_group_separator")]
    pub group_separator: String,

    /// Maximum number of nested group levels (0 disables grouping)
    #[serde(default = "default_group_max_depth")]
    pub group_max_depth: usize,

    /// Strip the group prefix from task labels inside a group
    #[serde(default = "default_true")]
    pub group_strip_task_label: bool,

    /// Sort project folders alphabetically instead of discovery order
    #[serde(default = "default_true")]
    pub sort_project_folders_alpha: bool,

    /// Regular expressions; tasks whose name matches any are left out
    #[serde(default)]
    pub exclude_tasks: Vec<String>,

    /// Virtual folder settings
    #[serde(default)]
    pub special_folders: SpecialFoldersConfig,
}

fn default_group_separator() -> String {
    "-".to_string()
}

const fn default_group_max_depth() -> usize {
    1
}

const fn default_true() -> bool {
    true
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            group_separator: default_group_separator(),
            group_max_depth: default_group_max_depth(),
            group_strip_task_label: true,
            sort_project_folders_alpha: true,
            exclude_tasks: Vec::new(),
            special_folders: SpecialFoldersConfig::default(),
        }
    }
}

impl TreeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::configuration(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "read configuration"))?;
        Self::from_toml_str(&text)
    }

    /// Check invariants not expressible through serde
    pub fn validate(&self) -> Result<()> {
        if self.group_max_depth > 0 && self.group_separator.is_empty() {
            return Err(Error::configuration(
                "groupSeparator must not be empty when grouping is enabled",
            ));
        }
        self.task_filter().map(|_| ())
    }

    /// Whether the grouping engine should run at all
    #[must_use]
    pub fn grouping_enabled(&self) -> bool {
        self.group_max_depth > 0 && !self.group_separator.is_empty()
    }

    /// Compile the exclusion patterns
    pub fn task_filter(&self) -> Result<TaskFilter> {
        let patterns = self
            .exclude_tasks
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::configuration(format!("Invalid exclude pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TaskFilter { patterns })
    }
}

/// Compiled task name exclusions
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    patterns: Vec<Regex>,
}

impl TaskFilter {
    /// Whether a task with this name is excluded from the tree
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }
}

/// Settings for one virtual folder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpecialFolderSettings {
    /// Show the folder in the root list
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of tasks kept and shown
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

const fn default_max_items() -> usize {
    10
}

/// Settings for every virtual folder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpecialFoldersConfig {
    /// Recently run tasks
    #[serde(default = "default_last_tasks")]
    pub last_tasks: SpecialFolderSettings,
    /// User favorites
    #[serde(default = "default_favorites")]
    pub favorites: SpecialFolderSettings,
    /// User-level task list
    #[serde(default = "default_user_tasks")]
    pub user_tasks: SpecialFolderSettings,
}

const fn default_last_tasks() -> SpecialFolderSettings {
    SpecialFolderSettings {
        enabled: true,
        max_items: 10,
    }
}

const fn default_favorites() -> SpecialFolderSettings {
    SpecialFolderSettings {
        enabled: true,
        max_items: 50,
    }
}

const fn default_user_tasks() -> SpecialFolderSettings {
    SpecialFolderSettings {
        enabled: true,
        max_items: 50,
    }
}

impl Default for SpecialFoldersConfig {
    fn default() -> Self {
        Self {
            last_tasks: default_last_tasks(),
            favorites: default_favorites(),
            user_tasks: default_user_tasks(),
        }
    }
}

impl SpecialFoldersConfig {
    /// Settings for a given folder kind
    #[must_use]
    pub const fn for_kind(&self, kind: SpecialFolderKind) -> SpecialFolderSettings {
        match kind {
            SpecialFolderKind::LastUsed => self.last_tasks,
            SpecialFolderKind::Favorites => self.favorites,
            SpecialFolderKind::User => self.user_tasks,
        }
    }

    /// Mutable settings for a given folder kind
    pub fn for_kind_mut(&mut self, kind: SpecialFolderKind) -> &mut SpecialFolderSettings {
        match kind {
            SpecialFolderKind::LastUsed => &mut self.last_tasks,
            SpecialFolderKind::Favorites => &mut self.favorites,
            SpecialFolderKind::User => &mut self.user_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TreeConfig::from_toml_str("").unwrap();
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.group_separator, "-");
        assert_eq!(config.group_max_depth, 1);
        assert!(config.grouping_enabled());
        assert_eq!(config.special_folders.last_tasks.max_items, 10);
    }

    #[test]
    fn test_partial_document() {
        let config = TreeConfig::from_toml_str(
            r#"
groupSeparator = ":"
groupMaxDepth = 3
excludeTasks = ["^internal"]

[specialFolders.lastTasks]
enabled = false
maxItems = 5
"#,
        )
        .unwrap();
        assert_eq!(config.group_separator, ":");
        assert_eq!(config.group_max_depth, 3);
        assert!(!config.special_folders.last_tasks.enabled);
        assert_eq!(config.special_folders.last_tasks.max_items, 5);
        assert_eq!(config.special_folders.favorites.max_items, 50);

        let config = TreeConfig::from_toml_str(
            r#"
[specialFolders.userTasks]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(config.special_folders.user_tasks.max_items, 10);

        let filter = config.task_filter().unwrap();
        assert!(filter.is_excluded("internal-sync"));
        assert!(!filter.is_excluded("build"));
    }

    #[test]
    fn test_depth_zero_disables_grouping() {
        let config = TreeConfig {
            group_max_depth: 0,
            ..TreeConfig::default()
        };
        assert!(!config.grouping_enabled());
    }

    #[test]
    fn test_empty_separator_rejected() {
        let result = TreeConfig::from_toml_str(r#"groupSeparator = """#);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_invalid_exclude_pattern_rejected() {
        let result = TreeConfig::from_toml_str(r#"excludeTasks = ["(unclosed"]"#);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = TreeConfig::load(&dir.path().join("taskdeck.toml"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_for_kind_mut_updates_settings() {
        let mut folders = SpecialFoldersConfig::default();
        folders.for_kind_mut(SpecialFolderKind::Favorites).enabled = false;
        assert!(!folders.for_kind(SpecialFolderKind::Favorites).enabled);
        assert!(folders.for_kind(SpecialFolderKind::User).enabled);
    }
}
