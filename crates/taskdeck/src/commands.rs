//! Command execution
//!
//! Every command opens the workspace tree, runs a full refresh and then acts
//! on the fresh roots. Commands return their rendered output; printing is
//! left to the binary.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskdeck_tree::{
    JsonFileStorage, LastRefresh, RefreshCoordinator, RefreshOutcome, RefreshRequest,
    SpecialFolderKind, TaskTree, TreeConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::cli::{Cli, CliError, Commands, OkEnvelope, OutputFormat};
use crate::format::{FolderView, JsonFormatter, StatsView, TextFormatter, TreeFormatter, TreeView};
use crate::manifest::{self, Manifest};

/// Result of a command: the text to print on stdout
pub type CommandResult = Result<String, CliError>;

/// Run the parsed command line
pub async fn execute(cli: &Cli, cancel: &CancellationToken) -> CommandResult {
    let span = info_span!(
        "command",
        command = command_name(&cli.command),
        correlation_id = %crate::tracing::correlation_id(),
    );
    run(cli, cancel).instrument(span).await
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> CommandResult {
    let tree = open_tree(cli).await?;
    let previous = tree.last_refresh().await;
    refresh(&tree, RefreshRequest::All, cancel).await?;

    match &cli.command {
        Commands::Tree {
            format,
            ids,
            source_type,
        } => {
            if let Some(source_type) = source_type {
                refresh(&tree, RefreshRequest::SourceType(source_type.clone()), cancel).await?;
            }
            let view = TreeView::from_roots(&tree.roots().await);
            if cli.json {
                return to_json(&OkEnvelope::new(view));
            }
            Ok(match format {
                OutputFormat::Text => TextFormatter {
                    show_ids: *ids,
                    show_stats: true,
                }
                .format(&view),
                OutputFormat::Json => JsonFormatter.format(&view),
            })
        }
        Commands::Status => status(&tree, previous, cli.json).await,
        Commands::Save { folder, task_id } => {
            tree.save_task(*folder, task_id).await?;
            let message = format!("Saved {} to {folder}", task_name(&tree, task_id).await);
            folder_output(&tree, *folder, message, true, cli.json).await
        }
        Commands::Remove { folder, task_id } => {
            let name = task_name(&tree, task_id).await;
            let removed = tree.remove_task(*folder, task_id).await?;
            let message = if removed {
                format!("Removed {name} from {folder}")
            } else {
                format!("{name} is not in {folder}")
            };
            folder_output(&tree, *folder, message, removed, cli.json).await
        }
        Commands::Pin { folder, task_id } | Commands::Unpin { folder, task_id } => {
            let pin = matches!(cli.command, Commands::Pin { .. });
            let changed = tree.set_pinned(*folder, task_id, pin).await?;
            let name = task_name(&tree, task_id).await;
            let message = match (pin, changed) {
                (true, true) => format!("Pinned {name} in {folder}"),
                (false, true) => format!("Unpinned {name} in {folder}"),
                (_, false) => format!("{name} is unchanged in {folder}"),
            };
            folder_output(&tree, *folder, message, changed, cli.json).await
        }
        Commands::Rename {
            folder,
            task_id,
            label,
        } => {
            tree.rename(*folder, task_id, label.as_deref()).await?;
            let name = task_name(&tree, task_id).await;
            let message = match label {
                Some(label) => format!("Renamed {name} to '{label}' in {folder}"),
                None => format!("Restored the label of {name} in {folder}"),
            };
            folder_output(&tree, *folder, message, true, cli.json).await
        }
        Commands::Clear { folder } => {
            tree.clear(*folder).await?;
            folder_output(&tree, *folder, format!("Cleared {folder}"), true, cli.json).await
        }
    }
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Tree { .. } => "tree",
        Commands::Status => "status",
        Commands::Save { .. } => "save",
        Commands::Remove { .. } => "remove",
        Commands::Pin { .. } => "pin",
        Commands::Unpin { .. } => "unpin",
        Commands::Rename { .. } => "rename",
        Commands::Clear { .. } => "clear",
    }
}

/// Open the tree for the workspace named on the command line
pub async fn open_tree(cli: &Cli) -> Result<TaskTree, CliError> {
    let manifest_path = manifest::manifest_path(&cli.workspace, cli.manifest.as_deref());
    if !manifest_path.is_file() {
        return Err(CliError::config_with_help(
            format!("Task manifest not found: {}", manifest_path.display()),
            format!(
                "Create {} in the workspace root or pass --manifest",
                manifest::DEFAULT_MANIFEST_FILE
            ),
        ));
    }
    let provider = Manifest::load(&manifest_path)?.into_provider();

    let config = match manifest::config_path(&cli.workspace, cli.config.as_deref()) {
        Some(path) => {
            debug!(path = %path.display(), "Loading tree configuration");
            TreeConfig::load(&path)?
        }
        None => TreeConfig::default(),
    };

    let storage = JsonFileStorage::new(
        global_state_path(cli.state_dir.as_deref())?,
        JsonFileStorage::default_workspace_path(&cli.workspace),
    );

    Ok(TaskTree::open(
        Arc::new(provider),
        Arc::new(storage),
        Arc::new(RefreshCoordinator::new()),
        config,
    )
    .await?)
}

fn global_state_path(state_dir: Option<&Path>) -> Result<PathBuf, CliError> {
    match state_dir {
        Some(dir) => Ok(dir.join("global.json")),
        None => Ok(JsonFileStorage::default_global_path()?),
    }
}

async fn refresh(
    tree: &TaskTree,
    request: RefreshRequest,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    match tree.refresh(request, cancel).await? {
        RefreshOutcome::Completed => Ok(()),
        RefreshOutcome::Cancelled => Err(CliError::other("Refresh cancelled")),
    }
}

async fn task_name(tree: &TaskTree, id: &str) -> String {
    tree.task(id)
        .await
        .map_or_else(|| id.to_string(), |task| task.record.name.clone())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FolderChange {
    message: String,
    changed: bool,
    folder: Option<FolderView>,
}

async fn folder_output(
    tree: &TaskTree,
    kind: SpecialFolderKind,
    message: String,
    changed: bool,
    json: bool,
) -> CommandResult {
    let roots = tree.roots().await;
    let folder = roots
        .iter()
        .find(|f| f.special_kind() == Some(kind))
        .map(|f| FolderView::from_folder(f));

    if json {
        return to_json(&OkEnvelope::new(FolderChange {
            message,
            changed,
            folder,
        }));
    }

    let mut output = format!("{message}\n");
    if let Some(folder) = folder {
        let view = TreeView {
            folders: vec![folder],
            stats: StatsView::from(taskdeck_tree::TreeStats::default()),
        };
        output.push('\n');
        output.push_str(&TextFormatter::default().format(&view));
    }
    Ok(output)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    stats: StatsView,
    previous_refresh: Option<LastRefresh>,
}

async fn status(tree: &TaskTree, previous: Option<LastRefresh>, json: bool) -> CommandResult {
    let stats = StatsView::from(tree.stats().await);
    if json {
        return to_json(&OkEnvelope::new(StatusReport {
            stats,
            previous_refresh: previous,
        }));
    }

    let mut output = format!(
        "Folders:         {}\nVirtual folders: {}\nContainers:      {}\nGroups:          {}\nTasks:           {}\n",
        stats.folders, stats.special_folders, stats.containers, stats.groups, stats.tasks
    );
    match previous {
        Some(last) => {
            let when = chrono::DateTime::from_timestamp_millis(last.timestamp)
                .map_or_else(|| last.timestamp.to_string(), |t| t.to_rfc3339());
            output.push_str(&format!(
                "Previous refresh: {} ({} tasks) at {when}\n",
                last.kind, last.task_count
            ));
        }
        None => output.push_str("Previous refresh: never\n"),
    }
    Ok(output)
}

fn to_json<T: Serialize>(value: &T) -> CommandResult {
    serde_json::to_string(value)
        .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))
}
