//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success/Done:   green   (completed tasks, low risk)
//!   - Warning/Active: yellow  (in_progress tasks, medium risk)
//!   - Error/Blocked:  red     (failed and blocked tasks, high risk)
//!   - Info/Reference: cyan    (node and task ids)
//!   - Muted:          dimmed  (field labels, pending tasks)
//!   - Emphasis:       bold    (section headers)

use crate::domain::TaskLabel;
use crate::graph::{Risk, Severity};
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Colorize a node or task id (cyan).
pub(crate) fn colorize_id(id: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return id.to_string();
    }
    id.cyan().to_string()
}

/// Apply dimmed style to text (for labels/field names).
pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Apply bold style to text (for section headers).
pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

/// Apply color to a task label.
pub(crate) fn colorize_label(label: TaskLabel, config: &OutputConfig) -> String {
    let text = label.to_string();
    if !config.use_colors {
        return text;
    }
    match label {
        TaskLabel::Pending => text.dimmed().to_string(),
        TaskLabel::Ready => text.white().bold().to_string(),
        TaskLabel::InProgress => text.yellow().to_string(),
        TaskLabel::Completed => text.green().to_string(),
        TaskLabel::Failed | TaskLabel::Blocked => text.red().to_string(),
    }
}

/// Get a colored label icon, with ASCII fallback support.
pub(crate) fn colored_label_icon(label: TaskLabel, config: &OutputConfig) -> String {
    let icon = if config.use_ascii {
        match label {
            TaskLabel::Pending => ".",
            TaskLabel::Ready => "o",
            TaskLabel::InProgress => ">",
            TaskLabel::Completed => "+",
            TaskLabel::Failed => "!",
            TaskLabel::Blocked => "x",
        }
    } else {
        match label {
            TaskLabel::Pending => "◌",
            TaskLabel::Ready => "○",
            TaskLabel::InProgress => "▶",
            TaskLabel::Completed => "✓",
            TaskLabel::Failed => "✗",
            TaskLabel::Blocked => "⊘",
        }
    };

    if !config.use_colors {
        return icon.to_string();
    }

    match label {
        TaskLabel::Pending => icon.dimmed().to_string(),
        TaskLabel::Ready => icon.white().to_string(),
        TaskLabel::InProgress => icon.yellow().to_string(),
        TaskLabel::Completed => icon.green().to_string(),
        TaskLabel::Failed | TaskLabel::Blocked => icon.red().to_string(),
    }
}

/// Apply color to a cycle risk level.
pub(crate) fn colorize_risk(risk: Risk, config: &OutputConfig) -> String {
    let text = risk.to_string();
    if !config.use_colors {
        return text;
    }
    match risk {
        Risk::Low => text.green().to_string(),
        Risk::Medium => text.yellow().to_string(),
        Risk::High => text.red().bold().to_string(),
    }
}

/// Apply color to an impact severity.
pub(crate) fn colorize_severity(severity: Severity, config: &OutputConfig) -> String {
    let text = severity.to_string();
    if !config.use_colors {
        return text;
    }
    match severity {
        Severity::Low => text.green().to_string(),
        Severity::Medium => text.yellow().to_string(),
        Severity::High => text.red().bold().to_string(),
    }
}

/// The arrow used between path and cycle members.
pub(crate) fn arrow(config: &OutputConfig) -> &'static str {
    if config.use_ascii { "->" } else { "→" }
}
