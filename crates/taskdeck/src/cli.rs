//! Command-line definitions, error mapping and output envelopes

use clap::{Parser, Subcommand, ValueEnum};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use taskdeck_tree::SpecialFolderKind;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Success exit code
pub const EXIT_OK: i32 = 0;
/// CLI, manifest or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Tree, storage or provider failure exit code
pub const EXIT_RUNTIME: i32 = 3;
/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI, manifest or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(taskdeck::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Failure while building or persisting the tree (exit code 3)
    #[error("Task tree error: {message}")]
    #[diagnostic(code(taskdeck::cli::runtime))]
    Runtime {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(taskdeck::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new runtime error
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new runtime error with help text
    #[must_use]
    pub fn runtime_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Add help text to an existing error, returning a new error with the help text set.
    #[must_use]
    pub fn with_help(self, help_text: impl Into<String>) -> Self {
        let help = Some(help_text.into());
        match self {
            Self::Config { message, .. } => Self::Config { message, help },
            Self::Runtime { message, .. } => Self::Runtime { message, help },
            Self::Other { message, .. } => Self::Other { message, help },
        }
    }

    /// Short machine-readable category used in JSON error envelopes
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Runtime { .. } => "runtime",
            Self::Other { .. } => "other",
        }
    }
}

/// Convert `taskdeck_tree::Error` to appropriate `CliError` variant.
///
/// - Bad configuration, bad manifests and unknown task ids -> Config (exit code 2)
/// - Storage, provider and I/O failures -> Runtime (exit code 3)
/// - Broken engine invariants -> Other (exit code 3)
impl From<taskdeck_tree::Error> for CliError {
    fn from(err: taskdeck_tree::Error) -> Self {
        use taskdeck_tree::Error;
        match err {
            Error::Configuration { message } => Self::config(message),
            Error::Serialization { message } => Self::config_with_help(
                message,
                "Check that the manifest and state files contain valid JSON",
            ),
            Error::UnknownTask { id } => Self::config_with_help(
                format!("Unknown task id '{id}'"),
                "Task ids are listed by `taskdeck tree --ids`",
            ),
            Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::runtime_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            Error::Provider { .. } | Error::Storage { .. } | Error::Timeout { .. } => {
                Self::runtime(err.to_string())
            }
            Error::Precondition { .. } => Self::other(err.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Runtime { .. } | CliError::Other { .. } => EXIT_RUNTIME,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(ErrorBody {
            code: err.code(),
            message: err.to_string(),
        });
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Error payload of an [`ErrorEnvelope`]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Error category
    pub code: &'static str,
    /// Rendered message
    pub message: String,
}

/// Output format for the tree listing
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Box-drawing tree
    #[default]
    Text,
    /// Structured JSON
    Json,
}

/// Browse and curate the task tree of a workspace.
#[derive(Parser, Debug)]
#[command(name = "taskdeck")]
#[command(about = "Browse and curate the task tree of a workspace")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root holding the manifest and workspace state.
    #[arg(long, short = 'w', global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Task manifest (defaults to `<workspace>/taskdeck.json`).
    #[arg(long, short = 'm', global = true)]
    pub manifest: Option<PathBuf>,

    /// Tree configuration file (defaults to `<workspace>/taskdeck.toml` when present).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the global (user level) state file.
    #[arg(long, global = true, env = "TASKDECK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Emit JSON envelope regardless of format.
    #[arg(long, global = true, help = "Emit JSON envelope regardless of format")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the task tree.
    Tree {
        /// Output format.
        #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Show node ids next to labels.
        #[arg(long)]
        ids: bool,
        /// Refresh only this task type after the initial full refresh.
        #[arg(long)]
        source_type: Option<String>,
    },
    /// Show node counts and the last refresh summary.
    Status,
    /// Add a task to a virtual folder.
    Save {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
        /// Task id as shown by `tree --ids`.
        task_id: String,
    },
    /// Remove a task from a virtual folder.
    Remove {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
        /// Task id as shown by `tree --ids`.
        task_id: String,
    },
    /// Pin a task to the top of a virtual folder.
    Pin {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
        /// Task id as shown by `tree --ids`.
        task_id: String,
    },
    /// Unpin a task in a virtual folder.
    Unpin {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
        /// Task id as shown by `tree --ids`.
        task_id: String,
    },
    /// Set (or reset, when no label is given) the label of a saved task.
    Rename {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
        /// Task id as shown by `tree --ids`.
        task_id: String,
        /// New label; omit to restore the default one.
        label: Option<String>,
    },
    /// Empty a virtual folder.
    Clear {
        /// Virtual folder (`last`, `favorites`, `user`).
        folder: SpecialFolderKind,
    },
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
