//! Provider-agnostic task records
//!
//! A [`TaskRecord`] is what a task provider reports for one discovered task.
//! The engine never mutates a record; it only places it in the tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label used for the synthetic folder holding user-level tasks
pub const USER_SCOPE_LABEL: &str = "User";

/// Metadata key a provider can use to declare a task definition type
/// that differs from its source type.
pub const DECLARED_TYPE_KEY: &str = "type";

/// The context a task belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// A real project folder, identified by its name
    Project(String),
    /// Tasks not tied to any project
    User,
}

impl Scope {
    /// Create a project scope
    pub fn project(name: impl Into<String>) -> Self {
        Self::Project(name.into())
    }

    /// Stable key used for folder lookup and identity hashing
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Project(name) => format!("project:{name}"),
            Self::User => "user".to_string(),
        }
    }

    /// Display label of the folder representing this scope
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Project(name) => name,
            Self::User => USER_SCOPE_LABEL,
        }
    }

    /// Whether this is the user scope
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    /// A project scope with a blank name cannot be placed in the tree
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Project(name) => !name.trim().is_empty(),
            Self::User => true,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One task as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Provider type (`npm`, `make`, `ant`, ...)
    pub source_type: String,
    /// Declared task name
    pub name: String,
    /// Owning project or the user scope
    pub scope: Scope,
    /// Path of the definition file's directory, relative to the project root
    #[serde(default)]
    pub relative_path: String,
    /// Path of the file declaring the task, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_path: Option<String>,
    /// Opaque provider data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_metadata: BTreeMap<String, serde_json::Value>,
    /// Package-manager bootstrap action (e.g. `npm install`). These are
    /// reachable from their container, never shown as a task node.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_install: bool,
}

impl TaskRecord {
    /// Create a record at the project root with no metadata
    pub fn new(source_type: impl Into<String>, name: impl Into<String>, scope: Scope) -> Self {
        Self {
            source_type: source_type.into(),
            name: name.into(),
            scope,
            relative_path: String::new(),
            definition_path: None,
            provider_metadata: BTreeMap::new(),
            is_install: false,
        }
    }

    /// Set the relative path of the definition file's directory
    #[must_use]
    pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
        self.relative_path = path.into();
        self
    }

    /// Attach a provider metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.provider_metadata.insert(key.into(), value);
        self
    }

    /// Mark this record as an installing task
    #[must_use]
    pub const fn as_install(mut self) -> Self {
        self.is_install = true;
        self
    }

    /// The task definition type, falling back to the source type
    #[must_use]
    pub fn declared_type(&self) -> &str {
        self.provider_metadata
            .get(DECLARED_TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&self.source_type)
    }
}

/// A record paired with the path its provider resolved for it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    /// The shared record
    pub record: Arc<TaskRecord>,
    /// Normalized relative path used for container and task identity
    pub resolved_path: String,
}

impl ResolvedRecord {
    /// Resolve a record with the default path normalization
    #[must_use]
    pub fn new(record: TaskRecord) -> Self {
        let resolved_path = normalize_relative_path(&record.relative_path);
        Self {
            record: Arc::new(record),
            resolved_path,
        }
    }

    /// Pair a record with a provider-resolved path
    pub fn with_path(record: Arc<TaskRecord>, resolved_path: impl Into<String>) -> Self {
        Self {
            record,
            resolved_path: normalize_relative_path(&resolved_path.into()),
        }
    }
}

/// Normalize a relative path: forward slashes, no leading `./`, no
/// surrounding slashes, `.` becomes empty.
#[must_use]
pub fn normalize_relative_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let parts: Vec<&str> = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    parts.join("/")
}
