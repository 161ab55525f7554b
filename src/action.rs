//! Splitting a snapshot into its state and trailing action block

use crate::error::{PipelineError, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const ACTION_MARKER: &str = "action:";
pub const FUNCTION_MARKER: &str = "function: ";

fn action_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| Regex::new(r"(?m)^action:").expect("action pattern is valid"))
}

/// Split at the last line starting with `action:`. The action part keeps
/// the marker; `state + action` equals the input.
pub fn split(text: &str) -> Result<(&str, &str)> {
    let idx = action_line()
        .find_iter(text)
        .last()
        .map(|m| m.start())
        .ok_or_else(|| PipelineError::NotFound("`action:` section".to_string()))?;
    Ok(text.split_at(idx))
}

/// Action block appended after generated narrative
pub fn render_action_block(lead_in: &str, action: &str) -> String {
    format!("\n\n{}:\n\n```yml\n{}\n```", lead_in, action.trim_end())
}

/// Action block on its own, for prediction-only records
pub fn render_bare_action(action: &str) -> String {
    format!("```yml\n{}\n```", action.trim_end())
}

/// Everything after the last `function: ` marker
pub fn function_section(text: &str) -> Option<&str> {
    text.rfind(FUNCTION_MARKER)
        .map(|idx| &text[idx + FUNCTION_MARKER.len()..])
}

/// Function name after the last marker, up to the next newline or period
pub fn function_label(text: &str) -> Option<&str> {
    let rest = function_section(text)?;
    let line = rest.split('\n').next().unwrap_or(rest);
    let label = line.split('.').next().unwrap_or(line).trim();
    (!label.is_empty()).then_some(label)
}
