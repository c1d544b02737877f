//! Task manifest loading
//!
//! A manifest is the JSON document the binary reads its task records from:
//!
//! ```json
//! {
//!   "projects": ["web", "api"],
//!   "tasks": [
//!     { "sourceType": "npm", "name": "build-dev", "scope": { "project": "web" } },
//!     { "sourceType": "shell", "name": "backup", "scope": "user" }
//!   ]
//! }
//! ```
//!
//! `projects` lists known projects so that projects without tasks still get
//! an (empty) folder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use taskdeck_tree::{Error, Result, Scope, StaticProvider, TaskRecord};
use tracing::debug;

/// File name looked up in the workspace root when no manifest is given
pub const DEFAULT_MANIFEST_FILE: &str = "taskdeck.json";

/// File name looked up in the workspace root when no configuration is given
pub const DEFAULT_CONFIG_FILE: &str = "taskdeck.toml";

/// Parsed task manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Known project names
    #[serde(default)]
    pub projects: Vec<String>,
    /// Task records
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl Manifest {
    /// Parse a manifest from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::serialization(format!("Invalid task manifest: {e}")))
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "read manifest"))?;
        let manifest = Self::from_json_str(&text)?;
        debug!(
            path = %path.display(),
            tasks = manifest.tasks.len(),
            projects = manifest.projects.len(),
            "Loaded task manifest"
        );
        Ok(manifest)
    }

    /// Scopes of the declared projects, deduplicated in declaration order
    #[must_use]
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = Vec::with_capacity(self.projects.len());
        for name in &self.projects {
            let scope = Scope::project(name.as_str());
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }

    /// A provider serving this manifest's records and projects
    #[must_use]
    pub fn into_provider(self) -> StaticProvider {
        let scopes = self.scopes();
        StaticProvider::new(self.tasks).with_scopes(scopes)
    }
}

/// Manifest path: the explicit one or the default file in the workspace
#[must_use]
pub fn manifest_path(workspace: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| workspace.join(DEFAULT_MANIFEST_FILE), Path::to_path_buf)
}

/// Configuration path: the explicit one, or the default file when it exists
#[must_use]
pub fn config_path(workspace: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let candidate = workspace.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json_str(
            r#"{
                "projects": ["web"],
                "tasks": [
                    { "sourceType": "npm", "name": "build", "scope": { "project": "web" } },
                    { "sourceType": "shell", "name": "backup", "scope": "user", "isInstall": false }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.tasks.len(), 2);
        assert_eq!(manifest.tasks[0].scope, Scope::project("web"));
        assert_eq!(manifest.tasks[1].scope, Scope::User);
        assert_eq!(manifest.tasks[0].relative_path, "");
    }

    #[test]
    fn test_empty_document_is_empty_manifest() {
        assert_eq!(Manifest::from_json_str("{}").unwrap(), Manifest::default());
    }

    #[test]
    fn test_invalid_manifest_is_serialization_error() {
        let err = Manifest::from_json_str(r#"{ "tasks": 3 }"#).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_scopes_are_deduplicated() {
        let manifest = Manifest {
            projects: vec!["web".into(), "api".into(), "web".into()],
            tasks: Vec::new(),
        };
        assert_eq!(
            manifest.scopes(),
            vec![Scope::project("web"), Scope::project("api")]
        );
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = Manifest::load(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_default_paths() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            manifest_path(temp.path(), None),
            temp.path().join("taskdeck.json")
        );
        assert!(config_path(temp.path(), None).is_none());

        std::fs::write(temp.path().join("taskdeck.toml"), "groupMaxDepth = 2\n").unwrap();
        assert_eq!(
            config_path(temp.path(), None),
            Some(temp.path().join("taskdeck.toml"))
        );

        let explicit = Path::new("/etc/taskdeck.toml");
        assert_eq!(
            config_path(temp.path(), Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }
}
