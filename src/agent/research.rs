//! Per-scope iterative research with a stabilization stopping rule.

use anyhow::Result;

use crate::llm::LlmClient;

/// Analytical lenses the answering pipeline researches independently.
/// Each scope sees only the shared starting context, never another
/// scope's intermediate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Logic,
    File,
    Arch,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Logic, Scope::File, Scope::Arch];

    pub fn label(&self) -> &'static str {
        match self {
            Scope::Logic => "logic",
            Scope::File => "file",
            Scope::Arch => "arch",
        }
    }

    /// Section heading used by the aggregator.
    pub fn heading(&self) -> &'static str {
        match self {
            Scope::Logic => "Logic",
            Scope::File => "File",
            Scope::Arch => "Arch",
        }
    }
}

/// Iteration cap per scope.
pub const MAX_ITERATIONS: usize = 2;

/// Refine an answer for one scope against accumulating context.
///
/// Stops early when a new output is textually identical (after trimming)
/// to the previous one; otherwise the output is appended to the context
/// and the loop continues, up to [`MAX_ITERATIONS`]. Returns the last
/// produced answer, which is empty if the first output trims to empty.
pub async fn research_loop(
    llm: &dyn LlmClient,
    scope: Scope,
    seed_context: &str,
    question: &str,
) -> Result<String> {
    let mut context = seed_context.to_string();
    let mut answer = String::new();

    for _ in 0..MAX_ITERATIONS {
        let prompt = format!(
            "Research in the {} scope.\nContext:\n{}\nQuestion:\n{}",
            scope.label(),
            context,
            question
        );
        let output = llm.complete(&prompt).await?;
        if output.trim() == answer.trim() {
            break;
        }
        answer = output;
        context.push('\n');
        context.push_str(&answer);
    }

    Ok(answer)
}
