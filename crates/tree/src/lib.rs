//! Task tree construction and grouping for taskdeck.
//!
//! This crate turns a flat list of task records reported by any number of
//! providers into a navigable hierarchy:
//!
//! ```text
//! project folder
//! └── task-type container (npm, make, ant, ...)
//!     └── group container (label prefix, nested up to a configured depth)
//!         └── task
//! ```
//!
//! Virtual folders (recently used tasks, favorites, user tasks) backed by
//! persisted stores are overlaid on top of the project folders.
//!
//! # Key Types
//!
//! - [`TaskTree`]: facade fetching records, rebuilding and publishing roots
//! - [`TreeBuilder`]: places records, groups and sorts them, keeps node identity
//! - [`SpecialFolder`]: one virtual folder and its persisted stores
//! - [`RefreshCoordinator`]: serializes rebuilds shared by several consumers
//! - [`TaskProvider`] and [`Storage`]: the collaborators the engine consumes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskdeck_tree::{
//!     MemoryStorage, RefreshCoordinator, RefreshRequest, Scope, StaticProvider, TaskRecord,
//!     TaskTree, TreeConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let provider = StaticProvider::new(vec![
//!     TaskRecord::new("npm", "build-dev", Scope::project("web")),
//!     TaskRecord::new("npm", "build-prod", Scope::project("web")),
//! ]);
//! let tree = TaskTree::open(
//!     Arc::new(provider),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(RefreshCoordinator::new()),
//!     TreeConfig::default(),
//! )
//! .await?;
//! tree.refresh(RefreshRequest::All, &CancellationToken::new()).await?;
//! let roots = tree.roots().await;
//! ```

mod error;

pub mod builder;
pub mod config;
pub mod events;
pub mod grouping;
pub mod identity;
pub mod node;
pub mod provider;
pub mod record;
pub mod refresh;
pub mod sort;
pub mod special;
pub mod storage;
pub mod tree;

pub use builder::{BuildKind, TreeBuilder};
pub use config::{SpecialFolderSettings, SpecialFoldersConfig, TaskFilter, TreeConfig};
pub use error::{Error, Result};
pub use events::{TreeEvent, TreeEventReceiver, TreeEvents};
pub use grouping::GroupingOptions;
pub use node::{
    Container, FolderKind, ProjectFolder, SpecialFolderKind, TaskNode, TreeItem, TreeStats,
};
pub use provider::{StaticProvider, TaskProvider};
pub use record::{ResolvedRecord, Scope, TaskRecord};
pub use refresh::{RefreshCoordinator, RefreshGuard, RefreshPlan, RefreshRequest};
pub use special::{SpecialFolder, StoreEntry};
pub use storage::{JsonFileStorage, MemoryStorage, Storage, StorageScope};
pub use tree::{LastRefresh, RefreshOutcome, TaskTree};
