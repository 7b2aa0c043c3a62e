//! Output formatting for CLI commands.
//!
//! Every command ends in a protocol [`Response`]; this module renders it
//! either as human-readable text or as JSON for programmatic use.
//!
//! Submodules:
//! - [`color`]: Color and styling helpers (semantic colors, icons)

pub mod color;

use crate::board::{BlockedTask, BoardStats, Completion, LoadState, StorageStatus};
use crate::domain::{NodeId, Task, TaskLabel, TaskView};
use crate::graph::{
    BlastRadius, BuildReport, Cycle, FixSuggestion, GraphStats, Impact, PathOutcome,
};
use crate::protocol::{Reply, Response};
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use color::success;

use color::{
    arrow, bold, colored_label_icon, colorize_id, colorize_label, colorize_risk,
    colorize_severity, dimmed,
};

// ============================================================================
// Output Configuration
// ============================================================================

const DEFAULT_TERMINAL_WIDTH: u16 = 80;
const DEFAULT_MAX_CONTENT_WIDTH: usize = 80;

/// Configuration for output formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Maximum content width for text wrapping.
    pub max_width: usize,
    /// Whether to use ASCII-only icons instead of Unicode.
    pub use_ascii: bool,
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create a new `OutputConfig` with explicit values.
    pub fn new(max_width: usize, use_ascii: bool, use_colors: bool) -> Self {
        Self {
            max_width,
            use_ascii,
            use_colors,
        }
    }

    /// Create an `OutputConfig` by reading from environment variables.
    ///
    /// Reads:
    /// - `TANGLE_MAX_WIDTH`: Maximum content width (default: 80)
    /// - `TANGLE_ASCII`: Set to "1" or "true" for ASCII-only icons
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `TANGLE_COLOR`: Set to "0" or "false" to disable colors
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_width = match lookup("TANGLE_MAX_WIDTH") {
            Some(s) if !s.is_empty() => match s.parse() {
                Ok(width) => width,
                Err(_) => {
                    tracing::warn!(
                        env_var = "TANGLE_MAX_WIDTH",
                        value = %s,
                        default = DEFAULT_MAX_CONTENT_WIDTH,
                        "Invalid value, using default"
                    );
                    DEFAULT_MAX_CONTENT_WIDTH
                }
            },
            _ => DEFAULT_MAX_CONTENT_WIDTH,
        };

        let use_ascii = match lookup("TANGLE_ASCII") {
            Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
            Some(v) if v == "0" || v.eq_ignore_ascii_case("false") || v.is_empty() => false,
            Some(v) => {
                tracing::warn!(
                    env_var = "TANGLE_ASCII",
                    value = %v,
                    "Invalid value (expected '1', 'true', '0', or 'false'), using default"
                );
                false
            }
            None => false,
        };

        // NO_COLOR (https://no-color.org/) wins over TANGLE_COLOR
        let use_colors = lookup("NO_COLOR").is_none()
            && lookup("TANGLE_COLOR")
                .is_none_or(|v| v != "0" && !v.eq_ignore_ascii_case("false"));

        Self {
            max_width,
            use_ascii,
            use_colors,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_CONTENT_WIDTH,
            use_ascii: false,
            use_colors: true,
        }
    }
}

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

fn get_terminal_width() -> usize {
    terminal_size::terminal_size()
        .map_or(usize::from(DEFAULT_TERMINAL_WIDTH), |(w, _)| usize::from(w.0))
}

/// Wrap text to fit within a given width, preserving existing line breaks.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    text.lines()
        .flat_map(|line| {
            if line.trim().is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, max_width)
                    .into_iter()
                    .map(std::borrow::Cow::into_owned)
                    .collect()
            }
        })
        .collect()
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print a response in the specified format
pub fn print_response(response: &Response, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let config = OutputConfig::from_env();

    match mode {
        OutputMode::Text => write_response_text(&mut handle, response, &config),
        OutputMode::Json => write_json(&mut handle, response),
    }
}

/// Print a simple message
pub fn print_message(msg: &str) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{msg}")
}

/// Write a reply as a single JSON line (batch mode).
pub fn write_reply_line<W: Write>(w: &mut W, reply: &Reply) -> io::Result<()> {
    let json = serde_json::to_string(reply).map_err(io::Error::other)?;
    writeln!(w, "{json}")
}

fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(w, "{json}")
}

// ============================================================================
// Text Formatting
// ============================================================================

fn write_response_text<W: Write>(
    w: &mut W,
    response: &Response,
    config: &OutputConfig,
) -> io::Result<()> {
    match response {
        Response::Built(report) => write_build_report(w, report, config),
        Response::Cycles(cycles) => write_cycles(w, cycles, config),
        Response::Fixes(fixes) => write_fixes(w, fixes, config),
        Response::BlastRadius(radius) => write_blast_radius(w, radius, config),
        Response::Impact(impact) => write_impact(w, impact, config),
        Response::Path(outcome) => write_path(w, outcome, config),
        Response::Order(order) => write_order(w, order, config),
        Response::Strength { from, to, strength } => writeln!(
            w,
            "{} {} {}: strength {strength}",
            colorize_id(from.as_str(), config),
            arrow(config),
            colorize_id(to.as_str(), config)
        ),
        Response::GraphStats(stats) => write_graph_stats(w, stats, config),
        Response::Task(task) => write_task_line(w, task, TaskLabel::from(task.state), config),
        Response::Completion(completion) => write_completion(w, completion, config),
        Response::TaskView(view) => write_task_details(w, view, config),
        Response::Tasks(views) => write_task_list(w, views, config),
        Response::Ready(tasks) => write_ready(w, tasks, config),
        Response::Blocked(blocked) => write_blocked(w, blocked, config),
        Response::BoardStats(stats) => write_board_stats(w, stats, config),
        Response::StorageStatus(status) => write_storage_status(w, status, config),
    }
}

fn join_ids(ids: &[NodeId], config: &OutputConfig) -> String {
    ids.iter()
        .map(|id| colorize_id(id.as_str(), config))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_build_report<W: Write>(
    w: &mut W,
    report: &BuildReport,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "Built graph: {} node(s), {} edge(s)",
        report.nodes, report.edges
    )?;
    if report.duplicate_edges > 0 {
        writeln!(
            w,
            "  {} {}",
            dimmed("Merged duplicates:", config),
            report.duplicate_edges
        )?;
    }
    for source in &report.sources {
        writeln!(w, "  {} {source}", dimmed("Source:", config))?;
    }
    Ok(())
}

fn write_cycles<W: Write>(w: &mut W, cycles: &[Cycle], config: &OutputConfig) -> io::Result<()> {
    if cycles.is_empty() {
        writeln!(w, "{}", color::success("No cycles found.", config))?;
        return Ok(());
    }

    writeln!(w, "Found {} cycle(s):", cycles.len())?;
    for cycle in cycles {
        writeln!(w)?;
        write_cycle_header(w, cycle, config)?;
    }
    Ok(())
}

fn write_cycle_header<W: Write>(w: &mut W, cycle: &Cycle, config: &OutputConfig) -> io::Result<()> {
    writeln!(
        w,
        "{} risk, {} node(s), {} internal edge(s), strength {:.2}",
        colorize_risk(cycle.risk, config),
        cycle.size,
        cycle.internal_edges,
        cycle.strength
    )?;
    writeln!(w, "  {}", join_ids(&cycle.nodes, config))
}

fn write_fixes<W: Write>(
    w: &mut W,
    fixes: &[FixSuggestion],
    config: &OutputConfig,
) -> io::Result<()> {
    if fixes.is_empty() {
        writeln!(w, "{}", color::success("No cycles found.", config))?;
        return Ok(());
    }

    let width = get_terminal_width().min(config.max_width);
    for (i, fix) in fixes.iter().enumerate() {
        if i > 0 {
            writeln!(w)?;
        }
        write_cycle_header(w, &fix.cycle, config)?;
        writeln!(
            w,
            "  {} {}",
            dimmed("Extract:", config),
            colorize_id(fix.extract_candidate.as_str(), config)
        )?;
        for edge in &fix.edges_to_cut {
            writeln!(
                w,
                "  {} {} {} {}",
                dimmed("Cut:", config),
                colorize_id(edge.from.as_str(), config),
                arrow(config),
                colorize_id(edge.to.as_str(), config)
            )?;
        }
        for suggestion in &fix.suggestions {
            let mut lines = wrap_text(suggestion, width.saturating_sub(4)).into_iter();
            if let Some(first) = lines.next() {
                writeln!(w, "  - {first}")?;
            }
            for line in lines {
                writeln!(w, "    {line}")?;
            }
        }
    }
    Ok(())
}

fn write_blast_radius<W: Write>(
    w: &mut W,
    radius: &BlastRadius,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {} affects {} node(s)",
        bold("Blast radius:", config),
        colorize_id(radius.target.as_str(), config),
        radius.total()
    )?;
    if !radius.direct.is_empty() {
        writeln!(
            w,
            "  {} {}",
            dimmed("Direct:", config),
            join_ids(&radius.direct, config)
        )?;
    }
    if !radius.transitive.is_empty() {
        writeln!(
            w,
            "  {} {}",
            dimmed("Transitive:", config),
            join_ids(&radius.transitive, config)
        )?;
    }
    if radius.truncated {
        writeln!(
            w,
            "  {}",
            color::warning("(truncated at the depth limit)", config)
        )?;
    }
    Ok(())
}

fn write_impact<W: Write>(w: &mut W, impact: &Impact, config: &OutputConfig) -> io::Result<()> {
    writeln!(
        w,
        "{} {}: {} severity, {} affected",
        bold("Impact of", config),
        colorize_id(impact.target.as_str(), config),
        colorize_severity(impact.severity, config),
        impact.affected.len()
    )?;
    for entry in &impact.affected {
        writeln!(
            w,
            "  {} {}  {} {}",
            dimmed(&format!("[{}]", entry.depth), config),
            colorize_id(entry.node.as_str(), config),
            dimmed("connections:", config),
            entry.connections
        )?;
    }
    if impact.truncated {
        writeln!(
            w,
            "  {}",
            color::warning("(truncated at the depth limit)", config)
        )?;
    }
    Ok(())
}

fn write_path<W: Write>(w: &mut W, outcome: &PathOutcome, config: &OutputConfig) -> io::Result<()> {
    match outcome {
        PathOutcome::Found(path) => {
            let sep = format!(" {} ", arrow(config));
            let rendered: Vec<String> = path
                .iter()
                .map(|id| colorize_id(id.as_str(), config))
                .collect();
            writeln!(w, "{}", rendered.join(&sep))?;
            writeln!(
                w,
                "{}",
                dimmed(&format!("{} hop(s)", path.len().saturating_sub(1)), config)
            )
        }
        PathOutcome::NotFound => writeln!(w, "No path found."),
        PathOutcome::Truncated => writeln!(
            w,
            "{}",
            color::warning("No path within the depth limit.", config)
        ),
    }
}

fn write_order<W: Write>(w: &mut W, order: &[NodeId], config: &OutputConfig) -> io::Result<()> {
    for (i, id) in order.iter().enumerate() {
        writeln!(w, "{:>3}. {}", i + 1, colorize_id(id.as_str(), config))?;
    }
    Ok(())
}

fn write_graph_stats<W: Write>(
    w: &mut W,
    stats: &GraphStats,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{}", bold("Graph", config))?;
    writeln!(w, "  {} {}", dimmed("Nodes:     ", config), stats.nodes)?;
    writeln!(w, "  {} {}", dimmed("Edges:     ", config), stats.edges)?;
    writeln!(w, "  {} {}", dimmed("Roots:     ", config), stats.roots)?;
    writeln!(w, "  {} {}", dimmed("Leaves:    ", config), stats.leaves)?;
    writeln!(w, "  {} {}", dimmed("Self-loops:", config), stats.self_loops)
}

fn write_task_line<W: Write>(
    w: &mut W,
    task: &Task,
    label: TaskLabel,
    config: &OutputConfig,
) -> io::Result<()> {
    write!(
        w,
        "{} {}  {}  {}",
        colored_label_icon(label, config),
        colorize_id(task.id.as_str(), config),
        colorize_label(label, config),
        dimmed(&format!("p{}", task.priority), config)
    )?;
    if let Some(claimant) = &task.claimant {
        write!(w, "  @{claimant}")?;
    }
    if !task.description.is_empty() {
        let first_line = task.description.lines().next().unwrap_or_default();
        write!(w, "  {first_line}")?;
    }
    writeln!(w)
}

fn write_task_details<W: Write>(
    w: &mut W,
    view: &TaskView,
    config: &OutputConfig,
) -> io::Result<()> {
    let task = &view.task;
    let width = get_terminal_width().min(config.max_width);

    writeln!(
        w,
        "{} {}",
        colored_label_icon(view.label, config),
        colorize_id(task.id.as_str(), config)
    )?;
    writeln!(
        w,
        "{}  {}    {}  {}",
        dimmed("State:", config),
        colorize_label(view.label, config),
        dimmed("Priority:", config),
        task.priority
    )?;
    if let Some(claimant) = &task.claimant {
        writeln!(w, "{} {claimant}", dimmed("Claimant:", config))?;
    }
    writeln!(
        w,
        "{} {}",
        dimmed("Created:", config),
        task.created_at.format("%Y-%m-%d %H:%M")
    )?;
    if let Some(completed_at) = task.completed_at {
        writeln!(
            w,
            "{} {}",
            dimmed("Finished:", config),
            completed_at.format("%Y-%m-%d %H:%M")
        )?;
    }

    if !task.description.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}:", bold("Description", config))?;
        for line in wrap_text(&task.description, width.saturating_sub(2)) {
            writeln!(w, "  {line}")?;
        }
    }

    if !task.dependencies.is_empty() {
        writeln!(w)?;
        writeln!(
            w,
            "{} ({}):",
            bold("Dependencies", config),
            task.dependencies.len()
        )?;
        for dep in &task.dependencies {
            let marker = if view.waiting_on.contains(dep) {
                dimmed("waiting", config)
            } else {
                color::success("done", config)
            };
            writeln!(
                w,
                "  {} {} ({marker})",
                arrow(config),
                colorize_id(dep.as_str(), config)
            )?;
        }
    }

    if let Some(result) = &task.result {
        writeln!(w)?;
        writeln!(w, "{}: {result}", bold("Result", config))?;
    }
    Ok(())
}

fn write_task_list<W: Write>(
    w: &mut W,
    views: &[TaskView],
    config: &OutputConfig,
) -> io::Result<()> {
    if views.is_empty() {
        writeln!(w, "No tasks found.")?;
        return Ok(());
    }

    writeln!(w, "Found {} task(s):", views.len())?;
    writeln!(w)?;
    for view in views {
        write_task_line(w, &view.task, view.label, config)?;
    }
    Ok(())
}

fn write_ready<W: Write>(w: &mut W, tasks: &[Task], config: &OutputConfig) -> io::Result<()> {
    if tasks.is_empty() {
        writeln!(w, "No ready tasks.")?;
        return Ok(());
    }

    writeln!(w, "{} ready task(s):", tasks.len())?;
    writeln!(w)?;
    for task in tasks {
        write_task_line(w, task, TaskLabel::Ready, config)?;
    }
    Ok(())
}

fn write_completion<W: Write>(
    w: &mut W,
    completion: &Completion,
    config: &OutputConfig,
) -> io::Result<()> {
    write_task_line(
        w,
        &completion.task,
        TaskLabel::from(completion.task.state),
        config,
    )?;
    if !completion.newly_ready.is_empty() {
        writeln!(
            w,
            "  {} {}",
            dimmed("Now ready:", config),
            join_ids(&completion.newly_ready, config)
        )?;
    }
    if !completion.still_blocked.is_empty() {
        writeln!(
            w,
            "  {} {}",
            dimmed("Still waiting:", config),
            join_ids(&completion.still_blocked, config)
        )?;
    }
    Ok(())
}

fn write_blocked<W: Write>(
    w: &mut W,
    blocked: &[BlockedTask],
    config: &OutputConfig,
) -> io::Result<()> {
    if blocked.is_empty() {
        writeln!(w, "No blocked tasks.")?;
        return Ok(());
    }

    writeln!(w, "Found {} blocked task(s):", blocked.len())?;
    writeln!(w)?;
    for entry in blocked {
        write_task_line(w, &entry.view.task, entry.view.label, config)?;
        writeln!(
            w,
            "  {} {}",
            dimmed("Failed upstream:", config),
            join_ids(&entry.failed_dependencies, config)
        )?;
    }
    Ok(())
}

fn write_board_stats<W: Write>(
    w: &mut W,
    stats: &BoardStats,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{}", bold("Task board", config))?;
    writeln!(
        w,
        "  {} total, {} dependencies",
        stats.total, stats.dependencies
    )?;
    let rows = [
        (TaskLabel::Ready, stats.ready),
        (TaskLabel::Pending, stats.pending),
        (TaskLabel::InProgress, stats.in_progress),
        (TaskLabel::Completed, stats.completed),
        (TaskLabel::Failed, stats.failed),
        (TaskLabel::Blocked, stats.blocked),
    ];
    for (label, count) in rows {
        writeln!(
            w,
            "  {} {:<12} {count}",
            colored_label_icon(label, config),
            colorize_label(label, config)
        )?;
    }
    Ok(())
}

fn write_storage_status<W: Write>(
    w: &mut W,
    status: &StorageStatus,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{} {}", dimmed("Backend: ", config), status.backend)?;
    match &status.load {
        LoadState::Loaded { tasks, warnings } => writeln!(
            w,
            "{} {tasks} task(s), {warnings} warning(s)",
            dimmed("Loaded:  ", config)
        )?,
        LoadState::Degraded { reason } => writeln!(
            w,
            "{} {}",
            dimmed("Loaded:  ", config),
            color::error(&format!("degraded ({reason})"), config)
        )?,
    }
    writeln!(
        w,
        "{} {} (persisted {})",
        dimmed("Revision:", config),
        status.revision,
        status.persisted_revision
    )?;
    if let Some(err) = &status.last_save_error {
        writeln!(
            w,
            "{} {}",
            dimmed("Last save error:", config),
            color::error(err, config)
        )?;
    }
    Ok(())
}
