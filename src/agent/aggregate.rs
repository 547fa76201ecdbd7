//! Final prompt assembly: merge the repo summary, file listing, and
//! per-scope research into one completion prompt.

use crate::agent::research::Scope;
use crate::agent::AgentState;

/// How many file paths the final prompt lists before truncating.
pub const FILE_LIST_DISPLAY: usize = 10;

/// Build the aggregation prompt deterministically from whatever stages
/// produced. Absent or empty sections are omitted entirely rather than
/// rendered as placeholders.
pub fn build_prompt(state: &AgentState) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(summary) = state.summary.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Overview:\n{summary}"));
    }

    if let Some(paths) = state.file_paths.as_deref().filter(|p| !p.is_empty()) {
        let shown = paths
            .iter()
            .take(FILE_LIST_DISPLAY)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if paths.len() > FILE_LIST_DISPLAY {
            parts.push(format!("Files:\n{shown} ..."));
        } else {
            parts.push(format!("Files:\n{shown}"));
        }
    }

    for scope in Scope::ALL {
        if let Some(output) = state.research(scope).filter(|s| !s.is_empty()) {
            parts.push(format!("{} Research:\n{output}", scope.heading()));
        }
    }

    parts.push(format!("Answer to '{}':", state.question));
    parts.join("\n\n")
}
