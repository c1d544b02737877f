//! taskdeck command-line front end
//!
//! Loads task records from a JSON manifest, builds the task tree with
//! `taskdeck-tree` and renders it, or edits the virtual folders
//! (recently used tasks, favorites, user tasks).

pub mod cli;
pub mod commands;
pub mod format;
pub mod manifest;
pub mod tracing;
