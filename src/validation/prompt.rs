//! Corrective prompt construction for regeneration attempts.

use crate::provider::{CharacterDna, EnvironmentDna};

/// Prompt for `attempt` (2 or later) of a panel that failed consistency.
///
/// The previous attempt's failure reasons become explicit corrections; the
/// wording gets firmer on each further attempt.
pub fn enhanced_panel_prompt(
    base_prompt: &str,
    reference: &CharacterDna,
    failure_reasons: &[String],
    attempt: u32,
) -> String {
    let emphasis = if attempt >= 3 {
        "CRITICAL: the previous attempts drifted from the reference character. The character MUST match exactly"
    } else {
        "Keep the character consistent with the reference"
    };

    let mut prompt = format!("{}\n\n{}: {}.", base_prompt, emphasis, reference.summary());
    let corrections: Vec<&str> = failure_reasons
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    if !corrections.is_empty() {
        prompt.push_str("\nCorrect these issues:");
        for reason in corrections {
            prompt.push_str("\n- ");
            prompt.push_str(reason);
        }
    }
    prompt
}

/// Page-wide clause appended to every panel prompt after a coherence rejection.
pub fn environment_reinforcement(
    environment: &EnvironmentDna,
    failure_reasons: &[String],
) -> String {
    let mut clause = format!(
        "ENVIRONMENT (must be identical in every panel of this page): location: {}; lighting: {}",
        environment.location, environment.lighting
    );
    if !environment.palette.is_empty() {
        clause.push_str("; color palette: ");
        clause.push_str(&environment.palette.join(", "));
    }
    if let Some(architecture) = &environment.architecture {
        clause.push_str("; architecture: ");
        clause.push_str(architecture);
    }
    clause.push('.');

    let issues: Vec<&str> = failure_reasons
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    if !issues.is_empty() {
        clause.push_str(" Fix: ");
        clause.push_str(&issues.join("; "));
        clause.push('.');
    }
    clause
}

/// Append a page clause to a panel prompt.
pub fn with_clause(prompt: &str, clause: Option<&str>) -> String {
    match clause {
        Some(clause) => format!("{}\n\n{}", prompt, clause),
        None => prompt.to_string(),
    }
}
