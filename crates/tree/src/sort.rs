//! Ordering rules for folders, containers and tasks
//!
//! In priority order:
//! 1. virtual folders first, in their fixed precedence (root list only)
//! 2. containers before tasks within one parent
//! 3. pinned tasks first where a pinned set applies
//! 4. case-sensitive label order, ties broken by id
//!
//! All sorts are stable and in place.

use crate::node::{ProjectFolder, TreeItem};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Anything the sorter can order
pub trait SortKey {
    /// Label compared alphabetically
    fn sort_label(&self) -> &str;
    /// Containers sort before tasks
    fn is_container(&self) -> bool;
    /// Id looked up in a pinned set and used as the final tie breaker
    fn sort_id(&self) -> &str;
}

impl SortKey for TreeItem {
    fn sort_label(&self) -> &str {
        self.label()
    }

    fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    fn sort_id(&self) -> &str {
        match self {
            Self::Task(task) => &task.task_id,
            Self::Container(container) => &container.id,
        }
    }
}

/// Compare two siblings, optionally putting pinned tasks first
pub fn compare<T: SortKey>(a: &T, b: &T, pinned: Option<&HashSet<String>>) -> Ordering {
    match (a.is_container(), b.is_container()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    if let Some(pinned) = pinned
        && !a.is_container()
    {
        let pin_a = pinned.contains(a.sort_id());
        let pin_b = pinned.contains(b.sort_id());
        if pin_a != pin_b {
            return pin_b.cmp(&pin_a);
        }
    }
    a.sort_label()
        .cmp(b.sort_label())
        .then_with(|| a.sort_id().cmp(b.sort_id()))
}

/// Containers first, then alphabetic
pub fn sort_containers<T: SortKey>(list: &mut [T]) {
    list.sort_by(|a, b| compare(a, b, None));
}

/// Containers first, pinned tasks next, then alphabetic
pub fn sort_tasks<T: SortKey>(list: &mut [T], pinned: &HashSet<String>) {
    list.sort_by(|a, b| compare(a, b, Some(pinned)));
}

/// Move pinned tasks to the front, keeping the existing order otherwise
pub fn pinned_first<T: SortKey>(list: &mut [T], pinned: &HashSet<String>) {
    list.sort_by_key(|item| !pinned.contains(item.sort_id()));
}

fn folder_rank(folder: &ProjectFolder) -> u8 {
    folder
        .special_kind()
        .map_or(u8::MAX, crate::node::SpecialFolderKind::precedence)
}

/// Order the root folder list: virtual folders by precedence, then project
/// folders alphabetically or in discovery order.
pub fn sort_folders(folders: &mut [Arc<ProjectFolder>], alphabetic: bool) {
    folders.sort_by(|a, b| {
        folder_rank(a).cmp(&folder_rank(b)).then_with(|| {
            if alphabetic && !a.is_special() {
                a.label.cmp(&b.label)
            } else {
                Ordering::Equal
            }
        })
    });
}
