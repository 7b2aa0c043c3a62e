//! CLI argument structs for all commands.
//!
//! Each command has its own argument struct with clap derive attributes
//! for parsing and validation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use super::validators::{validate_agent, validate_backend, validate_depth, validate_node_id};
use crate::domain::{DEFAULT_PRIORITY, TaskLabel};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Storage backend for the task board (jsonl or memory)
    #[arg(short, long, value_parser = validate_backend)]
    pub backend: Option<String>,

    /// Hop limit for reachability queries
    #[arg(long, value_parser = validate_depth)]
    pub max_depth: Option<usize>,

    /// Suppress output messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// Graph sources shared by every analysis command.
///
/// At least one source is needed; they are merged into one graph.
#[derive(Args, Debug, Clone, Default)]
pub struct GraphInput {
    /// JSONL file with one `{"from": .., "to": ..}` edge per line
    #[arg(short, long, value_name = "FILE")]
    pub edges: Option<PathBuf>,

    /// JSON file mapping each source file to the files it imports
    #[arg(short, long, value_name = "FILE")]
    pub imports: Option<PathBuf>,

    /// `package.json`-style manifest (repeatable)
    #[arg(short, long = "manifest", value_name = "FILE")]
    pub manifests: Vec<PathBuf>,

    /// Ignore manifest dependencies on packages outside the given manifests
    #[arg(long)]
    pub internal_only: bool,
}

impl GraphInput {
    /// Whether no source was given.
    pub fn is_empty(&self) -> bool {
        self.edges.is_none() && self.imports.is_none() && self.manifests.is_empty()
    }
}

/// Arguments for the `cycles` command
#[derive(Parser, Debug, Clone)]
pub struct CyclesArgs {
    /// Graph sources
    #[command(flatten)]
    pub input: GraphInput,

    /// Include fix suggestions for each cycle
    #[arg(long)]
    pub fixes: bool,
}

/// Arguments for the `blast` and `impact` commands
#[derive(Parser, Debug, Clone)]
pub struct ReachArgs {
    /// Node to analyze
    #[arg(value_parser = validate_node_id)]
    pub node: String,

    /// Graph sources
    #[command(flatten)]
    pub input: GraphInput,

    /// Hop limit (defaults to the workspace setting)
    #[arg(short = 'd', long, value_parser = validate_depth)]
    pub max_depth: Option<usize>,
}

/// Arguments for the `path` command
#[derive(Parser, Debug, Clone)]
pub struct PathArgs {
    /// Start node
    #[arg(value_parser = validate_node_id)]
    pub from: String,

    /// End node
    #[arg(value_parser = validate_node_id)]
    pub to: String,

    /// Graph sources
    #[command(flatten)]
    pub input: GraphInput,

    /// Hop limit (defaults to the workspace setting)
    #[arg(short = 'd', long, value_parser = validate_depth)]
    pub max_depth: Option<usize>,
}

/// Arguments for the `order` command
#[derive(Parser, Debug, Clone)]
pub struct OrderArgs {
    /// Nodes to order
    #[arg(required = true, num_args = 1.., value_parser = validate_node_id)]
    pub nodes: Vec<String>,

    /// Graph sources
    #[command(flatten)]
    pub input: GraphInput,
}

/// Arguments for the `stats` command
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Graph sources
    #[command(flatten)]
    pub input: GraphInput,
}

/// Arguments for the `batch` command
#[derive(Parser, Debug, Clone)]
pub struct BatchArgs {
    /// Ignore any workspace and keep the task board in memory
    #[arg(long)]
    pub memory: bool,
}

/// Arguments for the `task` command
#[derive(Parser, Debug, Clone)]
pub struct TaskArgs {
    /// Task board action
    #[command(subcommand)]
    pub action: TaskAction,
}

/// Task board actions
#[derive(Subcommand, Debug, Clone)]
pub enum TaskAction {
    /// Create a task
    Create {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Description
        #[arg(short = 'D', long, default_value = "")]
        description: String,

        /// Priority (higher = more urgent)
        #[arg(short, long, default_value_t = DEFAULT_PRIORITY, allow_negative_numbers = true)]
        priority: i64,

        /// Tasks this one waits for (comma-separated)
        #[arg(long, value_delimiter = ',', value_parser = validate_node_id)]
        deps: Vec<String>,
    },

    /// Claim a ready task
    Claim {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Claiming agent
        #[arg(short, long, value_parser = validate_agent)]
        agent: String,
    },

    /// Complete a claimed task
    Complete {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Mark the task failed instead of completed
        #[arg(long)]
        failed: bool,

        /// Result payload (JSON, or plain text stored as a string)
        #[arg(short, long)]
        result: Option<String>,

        /// Agent finishing the task (must match the claimant)
        #[arg(short, long, value_parser = validate_agent)]
        agent: Option<String>,
    },

    /// Release a claimed task back to the ready pool
    Release {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Agent holding the claim
        #[arg(short, long, value_parser = validate_agent)]
        agent: String,
    },

    /// Make a task wait for another
    Dep {
        /// Dependent task
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Task to wait for
        #[arg(value_parser = validate_node_id)]
        depends_on: String,
    },

    /// Remove a dependency
    Undep {
        /// Dependent task
        #[arg(value_parser = validate_node_id)]
        id: String,

        /// Task it currently waits for
        #[arg(value_parser = validate_node_id)]
        depends_on: String,
    },

    /// Delete a task nothing depends on
    Delete {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,
    },

    /// Show one task
    Show {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,
    },

    /// List tasks
    List {
        /// Filter by state label
        #[arg(short, long, value_enum)]
        state: Option<TaskLabelArg>,

        /// Filter by claimant
        #[arg(short, long)]
        claimant: Option<String>,

        /// Maximum number of tasks to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show claimable tasks, most urgent first
    Ready {
        /// Maximum number of tasks to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show tasks stuck behind a failed dependency
    Blocked,

    /// Show task counts per state
    Stats,

    /// Show every task that transitively waits for a task
    Dependents {
        /// Task id
        #[arg(value_parser = validate_node_id)]
        id: String,
    },

    /// Show storage health
    Status,
}

/// Task state label for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLabelArg {
    /// Waiting on dependencies
    Pending,
    /// Claimable
    Ready,
    /// Claimed
    #[value(name = "in_progress", alias = "in-progress")]
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Pending behind a failure
    Blocked,
}

impl From<TaskLabelArg> for TaskLabel {
    fn from(arg: TaskLabelArg) -> Self {
        match arg {
            TaskLabelArg::Pending => Self::Pending,
            TaskLabelArg::Ready => Self::Ready,
            TaskLabelArg::InProgress => Self::InProgress,
            TaskLabelArg::Completed => Self::Completed,
            TaskLabelArg::Failed => Self::Failed,
            TaskLabelArg::Blocked => Self::Blocked,
        }
    }
}
