//! Deterministic node identifiers
//!
//! Ids are SHA-256 digests over NUL-separated key parts, so two different
//! key tuples cannot collide by concatenation (`"ab" + "c"` vs `"a" + "bc"`).
//! Task ids never include group information: the same task keeps its id no
//! matter how deeply it ends up nested.

use crate::node::SpecialFolderKind;
use crate::record::Scope;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in an id (32 hex characters)
const ID_BYTES: usize = 16;

/// Separator between a virtual folder label and the wrapped task id
pub const SPECIAL_ID_SEPARATOR: &str = "::";

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..ID_BYTES])
}

/// Id of the project folder for a scope
#[must_use]
pub fn folder_id(scope: &Scope) -> String {
    format!("folder:{}", hash_parts(&[&scope.key()]))
}

/// Id of a container node.
///
/// Leaf containers use level 0 and no group key. Group containers pass the
/// shared label prefix as `group_key` so sibling groups at the same level
/// never collide.
#[must_use]
pub fn container_id(
    scope: &Scope,
    source_type: &str,
    resolved_path: &str,
    group_level: usize,
    group_key: Option<&str>,
) -> String {
    let level = group_level.to_string();
    let key = group_key.map(|k| format!("g:{k}"));
    format!(
        "container:{}",
        hash_parts(&[
            &scope.key(),
            source_type,
            resolved_path,
            &level,
            key.as_deref().unwrap_or(""),
        ])
    )
}

/// Id of a task node
#[must_use]
pub fn task_id(
    scope: &Scope,
    resolved_path: &str,
    source_type: &str,
    declared_type: &str,
    name: &str,
) -> String {
    format!(
        "task:{}",
        hash_parts(&[&scope.key(), resolved_path, source_type, declared_type, name])
    )
}

/// Id of a virtual folder
#[must_use]
pub fn special_folder_id(kind: SpecialFolderKind) -> String {
    format!("special:{}", kind.store_key())
}

/// Folder-local id of a task shown inside a virtual folder
#[must_use]
pub fn special_task_id(folder_label: &str, task_id: &str) -> String {
    format!("{folder_label}{SPECIAL_ID_SEPARATOR}{task_id}")
}

/// Recover the underlying task id from a folder-local id
#[must_use]
pub fn unwrap_special_task_id(id: &str) -> Option<&str> {
    id.split_once(SPECIAL_ID_SEPARATOR).map(|(_, task)| task)
}
