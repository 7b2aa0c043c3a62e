//! Command execution logic.
//!
//! Every command except `init` becomes one or more protocol requests run
//! through an [`Engine`]. Graph commands build a throwaway analysis graph
//! from the given files; task commands open the workspace board.

use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::args::{
    BatchArgs, CyclesArgs, GraphInput, InitArgs, OrderArgs, PathArgs, ReachArgs, StatsArgs,
    TaskAction, TaskArgs,
};
use crate::board::SharedBoard;
use crate::commands::init::{self, TangleConfig};
use crate::engine::Engine;
use crate::graph::{EdgeList, GraphBuilder, ImportMap, PackageManifest, WorkspaceManifests};
use crate::output::{self, OutputConfig, OutputMode};
use crate::protocol::{Rejection, Reply, Request};

/// Execute the init command
pub async fn execute_init(args: &InitArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;

    if !args.quiet {
        println!("Initializing tangle workspace...");
    }

    let result = init::init(&current_dir, args.backend.as_deref(), args.max_depth).await?;

    if !args.quiet {
        println!("Initialized tangle in {}", result.tangle_dir.display());
        println!("  Config: {}", result.config_file.display());
        println!("  Tasks:  {}", result.tasks_file.display());
        println!("  Backend: {}", result.config.storage.backend);
        println!("  Max depth: {}", result.config.graph.max_depth);
    }

    Ok(())
}

/// Load the configuration of the workspace containing `dir`, if any.
async fn workspace_config(dir: &Path) -> Result<Option<(std::path::PathBuf, TangleConfig)>> {
    let Some(root) = init::find_tangle_root(dir) else {
        return Ok(None);
    };
    let config = init::load_workspace_config(&root).await?;
    Ok(Some((root, config)))
}

/// Open the task board of the workspace containing the current directory.
async fn open_workspace() -> Result<Engine> {
    let current_dir = std::env::current_dir()?;
    let Some((root, config)) = workspace_config(&current_dir).await? else {
        bail!(
            "Not a tangle workspace (no {} directory found). Run 'tangle init' first.",
            init::TANGLE_DIR_NAME
        );
    };
    Ok(Engine::open(&config, &root).await?)
}

/// Build the analysis graph described by `input` into a fresh engine.
///
/// The engine's default hop limit comes from the workspace configuration
/// when the current directory is inside one.
async fn open_graph(input: &GraphInput) -> Result<Engine> {
    if input.is_empty() {
        bail!("No graph input given. Pass --edges, --imports or --manifest.");
    }

    let max_depth = match workspace_config(&std::env::current_dir()?).await? {
        Some((_, config)) => config.graph.max_depth,
        None => crate::graph::DEFAULT_MAX_DEPTH,
    };

    let mut builder = GraphBuilder::new();

    if let Some(path) = &input.edges {
        let content = read_input(path).await?;
        builder.add_source(&EdgeList::from_jsonl(path.display().to_string(), &content)?)?;
    }

    if let Some(path) = &input.imports {
        let content = read_input(path).await?;
        builder.add_source(&ImportMap::from_json(path.display().to_string(), &content)?)?;
    }

    if !input.manifests.is_empty() {
        let mut manifests = Vec::with_capacity(input.manifests.len());
        for path in &input.manifests {
            let content = read_input(path).await?;
            let manifest = PackageManifest::from_json(&content)
                .with_context(|| format!("Invalid manifest {}", path.display()))?;
            manifests.push(manifest);
        }
        let mut workspace = WorkspaceManifests::new(manifests);
        if input.internal_only {
            workspace = workspace.internal_only();
        }
        builder.add_source(&workspace)?;
    }

    let (store, report) = builder.finish();
    tracing::debug!(
        nodes = report.nodes,
        edges = report.edges,
        sources = report.sources.len(),
        "graph loaded"
    );

    let engine = Engine::new(SharedBoard::in_memory(), max_depth);
    engine.replace_graph(store).await;
    Ok(engine)
}

async fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Run one request and print its response.
async fn run(engine: &Engine, request: Request, output_mode: OutputMode) -> Result<()> {
    let response = engine.handle(request).await?;
    output::print_response(&response, output_mode)?;
    Ok(())
}

/// Execute the cycles command
pub async fn execute_cycles(args: &CyclesArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    let request = if args.fixes {
        Request::SuggestFixes
    } else {
        Request::FindCycles
    };
    run(&engine, request, output_mode).await
}

/// Execute the blast command
pub async fn execute_blast(args: &ReachArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    let request = Request::BlastRadius {
        node: args.node.clone(),
        max_depth: args.max_depth,
    };
    run(&engine, request, output_mode).await
}

/// Execute the impact command
pub async fn execute_impact(args: &ReachArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    let request = Request::ImpactAnalysis {
        node: args.node.clone(),
        max_depth: args.max_depth,
    };
    run(&engine, request, output_mode).await
}

/// Execute the path command
pub async fn execute_path(args: &PathArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    let request = Request::FindPath {
        from: args.from.clone(),
        to: args.to.clone(),
        max_depth: args.max_depth,
    };
    run(&engine, request, output_mode).await
}

/// Execute the order command
pub async fn execute_order(args: &OrderArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    let request = Request::TopoOrder {
        nodes: args.nodes.clone(),
    };
    run(&engine, request, output_mode).await
}

/// Execute the stats command
pub async fn execute_stats(args: &StatsArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_graph(&args.input).await?;
    run(&engine, Request::GraphStats, output_mode).await
}

/// Translate a task action into a protocol request.
fn task_request(action: &TaskAction) -> Request {
    match action {
        TaskAction::Create {
            id,
            description,
            priority,
            deps,
        } => Request::CreateTask {
            id: id.clone(),
            description: description.clone(),
            priority: *priority,
            dependencies: deps.clone(),
        },
        TaskAction::Claim { id, agent } => Request::ClaimTask {
            id: id.clone(),
            agent: agent.clone(),
        },
        TaskAction::Complete {
            id,
            failed,
            result,
            agent,
        } => Request::CompleteTask {
            id: id.clone(),
            result: result.as_deref().map(parse_result),
            success: !failed,
            agent: agent.clone(),
        },
        TaskAction::Release { id, agent } => Request::ReleaseTask {
            id: id.clone(),
            agent: agent.clone(),
        },
        TaskAction::Dep { id, depends_on } => Request::AddDependency {
            id: id.clone(),
            depends_on: depends_on.clone(),
        },
        TaskAction::Undep { id, depends_on } => Request::RemoveDependency {
            id: id.clone(),
            depends_on: depends_on.clone(),
        },
        TaskAction::Delete { id } => Request::DeleteTask { id: id.clone() },
        TaskAction::Show { id } => Request::ShowTask { id: id.clone() },
        TaskAction::List {
            state,
            claimant,
            limit,
        } => Request::ListTasks {
            label: state.map(Into::into),
            claimant: claimant.clone(),
            limit: *limit,
        },
        TaskAction::Ready { limit } => Request::ReadyTasks { limit: *limit },
        TaskAction::Blocked => Request::BlockedTasks,
        TaskAction::Stats => Request::BoardStats,
        TaskAction::Dependents { id } => Request::TaskBlastRadius { id: id.clone() },
        TaskAction::Status => Request::StorageStatus,
    }
}

/// Result payloads are stored as JSON; anything that does not parse is kept
/// as a string.
fn parse_result(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// One-line confirmation for a task mutation, or `None` to print the full
/// response.
fn confirmation(action: &TaskAction, config: &OutputConfig) -> Option<String> {
    let message = match action {
        TaskAction::Create { id, .. } => format!("Created task {id}"),
        TaskAction::Claim { id, agent } => format!("Claimed {id} for {agent}"),
        TaskAction::Release { id, .. } => format!("Released {id}"),
        TaskAction::Dep { id, depends_on } => format!("{id} now depends on {depends_on}"),
        TaskAction::Undep { id, depends_on } => {
            format!("{id} no longer depends on {depends_on}")
        }
        TaskAction::Delete { id } => format!("Deleted task {id}"),
        _ => return None,
    };
    Some(output::success(&message, config))
}

/// Execute a task command
pub async fn execute_task(args: &TaskArgs, output_mode: OutputMode) -> Result<()> {
    let engine = open_workspace().await?;
    let request = task_request(&args.action);
    let mutation = request.is_mutation();

    let response = engine.handle(request).await?;

    if mutation && let Some(err) = engine.board().status().await.last_save_error {
        bail!("The change was applied but could not be saved: {err}");
    }

    let config = OutputConfig::from_env();
    match (output_mode, confirmation(&args.action, &config)) {
        (OutputMode::Text, Some(message)) => output::print_message(&message)?,
        _ => output::print_response(&response, output_mode)?,
    }

    Ok(())
}

/// Execute the batch command
///
/// Reads one JSON request per line from stdin and writes one JSON reply per
/// line to stdout. A line that is not a valid request gets a
/// `malformed_input` rejection; processing continues with the next line.
pub async fn execute_batch(args: &BatchArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let engine = match workspace_config(&current_dir).await? {
        Some((root, config)) if !args.memory => Engine::open(&config, &root).await?,
        _ => Engine::in_memory(),
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let handled = run_batch(&engine, stdin, tokio::io::stdout()).await?;

    if engine.board().status().await.dirty {
        engine.board().flush().await?;
    }
    tracing::debug!(requests = handled, "batch finished");
    Ok(())
}

/// Answer each request line from `input` with one reply line on `writer`.
///
/// Returns the number of requests handled.
async fn run_batch<R, W>(engine: &Engine, input: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read request from stdin")?
    {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => engine.respond(request).await,
            Err(e) => Reply::Rejected(Rejection {
                error: "malformed_input".to_string(),
                reason: format!("Malformed input: {e}"),
            }),
        };

        let mut buf = Vec::new();
        output::write_reply_line(&mut buf, &reply)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        handled += 1;
    }

    Ok(handled)
}
