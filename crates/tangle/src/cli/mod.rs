//! CLI argument parsing and command dispatch.
//!
//! This module provides the command-line interface for tangle using clap's derive API.
//! Each command has its own argument struct with validation and helpful error messages.
//!
//! # Commands
//!
//! - `init`: Initialize a tangle workspace
//! - `cycles`, `blast`, `impact`, `path`, `order`, `stats`: Analyze a graph
//!   built from `--edges`, `--imports` and `--manifest` files
//! - `task`: Work with the workspace task board
//! - `batch`: Serve JSON protocol requests from stdin
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! tangle cycles --imports imports.json --fixes
//! tangle blast src/core.rs --imports imports.json
//! tangle task create build --deps fetch,configure
//! tangle task claim build --agent worker-1
//! ```

mod args;
mod execute;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

// Re-export argument structs
pub use args::{
    BatchArgs, CyclesArgs, GraphInput, InitArgs, OrderArgs, PathArgs, ReachArgs, StatsArgs,
    TaskAction, TaskArgs, TaskLabelArg,
};

// Re-export validators for external use
pub use validators::{validate_agent, validate_backend, validate_depth, validate_node_id};

/// Tangle - dependency graph analysis and a dependency-gated task board
///
/// Find cycles and blast radius in import or package graphs, and coordinate
/// agents over a task board stored in `.tangle/tasks.jsonl`.
#[derive(Parser, Debug)]
#[command(name = "tangle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a tangle workspace
    ///
    /// Creates the `.tangle/` directory with configuration and an empty task
    /// board. Run this once in your project root.
    Init(InitArgs),

    /// Find dependency cycles
    ///
    /// Reports every strongly connected component with its size, strength
    /// and risk. With `--fixes`, also suggests edges to cut.
    Cycles(CyclesArgs),

    /// Show what depends on a node
    ///
    /// Lists direct and transitive dependents, up to the hop limit.
    Blast(ReachArgs),

    /// Analyze the impact of changing a node
    ///
    /// Like `blast`, with per-node depth and connection counts plus an
    /// overall severity.
    Impact(ReachArgs),

    /// Find the shortest dependency path between two nodes
    Path(PathArgs),

    /// Order nodes so every dependency comes first
    Order(OrderArgs),

    /// Show graph statistics
    Stats(StatsArgs),

    /// Work with the task board
    ///
    /// Create tasks with dependencies, claim ready work, and complete it.
    /// Requires an initialized workspace.
    Task(TaskArgs),

    /// Serve protocol requests from stdin
    ///
    /// Reads one JSON request per line and writes one JSON reply per line.
    Batch(BatchArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Some(Commands::Init(args)) => execute::execute_init(args).await,
            Some(Commands::Cycles(args)) => execute::execute_cycles(args, output_mode).await,
            Some(Commands::Blast(args)) => execute::execute_blast(args, output_mode).await,
            Some(Commands::Impact(args)) => execute::execute_impact(args, output_mode).await,
            Some(Commands::Path(args)) => execute::execute_path(args, output_mode).await,
            Some(Commands::Order(args)) => execute::execute_order(args, output_mode).await,
            Some(Commands::Stats(args)) => execute::execute_stats(args, output_mode).await,
            Some(Commands::Task(args)) => execute::execute_task(args, output_mode).await,
            Some(Commands::Batch(args)) => execute::execute_batch(args).await,
            None => {
                println!("Tangle dependency graph engine");
                println!("Use --help for more information");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // ========== CLI Parsing Tests ==========

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["tangle"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_global_json_flag() {
        let cli = Cli::try_parse_from(["tangle", "task", "ready", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Some(Commands::Task(TaskArgs {
                action: TaskAction::Ready { limit: None }
            }))
        ));
    }

    #[test]
    fn test_parse_init_with_options() {
        let cli = Cli::try_parse_from([
            "tangle",
            "init",
            "--backend",
            "memory",
            "--max-depth",
            "12",
            "-q",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert_eq!(args.backend.as_deref(), Some("memory"));
                assert_eq!(args.max_depth, Some(12));
                assert!(args.quiet);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_parse_init_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["tangle", "init", "--backend", "sqlite"]).is_err());
    }

    #[test]
    fn test_parse_cycles_with_sources() {
        let cli = Cli::try_parse_from([
            "tangle",
            "cycles",
            "--imports",
            "imports.json",
            "--manifest",
            "a/package.json",
            "--manifest",
            "b/package.json",
            "--internal-only",
            "--fixes",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Cycles(args)) => {
                assert!(args.fixes);
                assert_eq!(args.input.imports, Some(PathBuf::from("imports.json")));
                assert_eq!(args.input.manifests.len(), 2);
                assert!(args.input.internal_only);
                assert!(args.input.edges.is_none());
            }
            _ => panic!("Expected Cycles command"),
        }
    }

    #[test]
    fn test_parse_blast_with_depth() {
        let cli =
            Cli::try_parse_from(["tangle", "blast", "src/a.rs", "-e", "edges.jsonl", "-d", "3"])
                .unwrap();
        match cli.command {
            Some(Commands::Blast(args)) => {
                assert_eq!(args.node, "src/a.rs");
                assert_eq!(args.max_depth, Some(3));
            }
            _ => panic!("Expected Blast command"),
        }
    }

    #[test]
    fn test_parse_blast_rejects_zero_depth() {
        assert!(Cli::try_parse_from(["tangle", "blast", "a", "-d", "0"]).is_err());
    }

    #[test]
    fn test_parse_path() {
        let cli = Cli::try_parse_from(["tangle", "path", "a", "c", "-e", "edges.jsonl"]).unwrap();
        match cli.command {
            Some(Commands::Path(args)) => {
                assert_eq!(args.from, "a");
                assert_eq!(args.to, "c");
            }
            _ => panic!("Expected Path command"),
        }
    }

    #[test]
    fn test_parse_order_requires_nodes() {
        assert!(Cli::try_parse_from(["tangle", "order", "-e", "edges.jsonl"]).is_err());

        let cli = Cli::try_parse_from(["tangle", "order", "a", "b", "-e", "edges.jsonl"]).unwrap();
        match cli.command {
            Some(Commands::Order(args)) => assert_eq!(args.nodes, vec!["a", "b"]),
            _ => panic!("Expected Order command"),
        }
    }

    #[test]
    fn test_parse_task_create() {
        let cli = Cli::try_parse_from([
            "tangle",
            "task",
            "create",
            "build",
            "--deps",
            "fetch,configure",
            "-p",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Task(TaskArgs {
                action:
                    TaskAction::Create {
                        id, deps, priority, ..
                    },
            })) => {
                assert_eq!(id, "build");
                assert_eq!(deps, vec!["fetch", "configure"]);
                assert_eq!(priority, -1);
            }
            _ => panic!("Expected task create"),
        }
    }

    #[test]
    fn test_parse_task_claim_requires_agent() {
        assert!(Cli::try_parse_from(["tangle", "task", "claim", "t1"]).is_err());
        assert!(Cli::try_parse_from(["tangle", "task", "claim", "t1", "-a", "w1"]).is_ok());
    }

    #[test]
    fn test_parse_task_complete_failed() {
        let cli = Cli::try_parse_from([
            "tangle", "task", "complete", "t1", "--failed", "--result", "oops",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Task(TaskArgs {
                action: TaskAction::Complete { failed, result, .. },
            })) => {
                assert!(failed);
                assert_eq!(result.as_deref(), Some("oops"));
            }
            _ => panic!("Expected task complete"),
        }
    }

    #[test]
    fn test_parse_task_list_state() {
        let cli =
            Cli::try_parse_from(["tangle", "task", "list", "--state", "in-progress"]).unwrap();
        match cli.command {
            Some(Commands::Task(TaskArgs {
                action: TaskAction::List { state, .. },
            })) => assert_eq!(state, Some(TaskLabelArg::InProgress)),
            _ => panic!("Expected task list"),
        }
    }

    #[test]
    fn test_parse_task_rejects_blank_id() {
        assert!(Cli::try_parse_from(["tangle", "task", "show", "  "]).is_err());
    }

    #[test]
    fn test_parse_batch_memory() {
        let cli = Cli::try_parse_from(["tangle", "batch", "--memory"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Batch(BatchArgs { memory: true }))
        ));
    }
}
