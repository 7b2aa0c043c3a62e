//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time, providing immediate feedback for invalid values.

use crate::domain::NodeId;

/// Validate a node or task id.
///
/// Delegates to [`NodeId::parse`] so the CLI and the protocol agree on what
/// an id is.
pub fn validate_node_id(s: &str) -> Result<String, String> {
    NodeId::parse(s)
        .map(NodeId::into_inner)
        .map_err(|e| e.to_string())
}

/// Validate an agent name.
pub fn validate_agent(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("Agent name cannot be empty".to_string());
    }
    if trimmed.chars().any(char::is_control) {
        return Err("Agent name cannot contain control characters".to_string());
    }
    Ok(trimmed.to_string())
}

/// Validate the storage backend name.
pub fn validate_backend(s: &str) -> Result<String, String> {
    use crate::commands::init;

    let trimmed = s.trim().to_lowercase();
    init::validate_backend(&trimmed).map_err(|e| e.to_string())?;
    Ok(trimmed)
}

/// Validate a traversal depth (must be at least 1).
pub fn validate_depth(s: &str) -> Result<usize, String> {
    let depth: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid depth '{s}': expected a positive integer"))?;
    if depth == 0 {
        return Err("Depth must be at least 1".to_string());
    }
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::path("src/lib.rs", "src/lib.rs")]
    #[case::trimmed("  t1  ", "t1")]
    fn test_validate_node_id_valid(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate_node_id(input).unwrap(), expected);
    }

    #[test]
    fn test_validate_node_id_rejects_blank() {
        assert!(validate_node_id("   ").is_err());
    }

    #[rstest]
    #[case::empty("")]
    #[case::control("agent\u{7}")]
    fn test_validate_agent_invalid(#[case] input: &str) {
        assert!(validate_agent(input).is_err());
    }

    #[test]
    fn test_validate_backend_normalizes_case() {
        assert_eq!(validate_backend("JSONL").unwrap(), "jsonl");
        assert!(validate_backend("sqlite").is_err());
    }

    #[rstest]
    #[case::zero("0", false)]
    #[case::negative("-3", false)]
    #[case::text("deep", false)]
    #[case::one("1", true)]
    #[case::large("500", true)]
    fn test_validate_depth(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(validate_depth(input).is_ok(), ok);
    }
}
