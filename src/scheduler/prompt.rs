//! Prompt rendering: turns a [`Feature`] plus whatever context the
//! scheduler has accumulated about it (prior notes, a handoff, the tail of
//! the progress log) into the text the agent transport sends to the
//! underlying coding agent.

use crate::backlog::Feature;

/// Render the prompt for a coding session against `feature`.
///
/// `handoff_notes` carries forward whatever the previous attempt's agent
/// wrote right before running out of context (spec §4.3's handoff
/// protocol); `progress_tail` is the last few kilobytes of the
/// project-wide progress log, giving the agent situational awareness of
/// work done on other features without replaying the whole history.
pub fn render_feature_prompt(feature: &Feature, progress_tail: &str, handoff_notes: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Feature: {} ({})\n\n", feature.name, feature.id));
    if !feature.description.is_empty() {
        out.push_str(&feature.description);
        out.push_str("\n\n");
    }

    if !feature.acceptance_criteria.is_empty() {
        out.push_str("## Acceptance criteria\n");
        for criterion in &feature.acceptance_criteria {
            out.push_str(&format!("- {criterion}\n"));
        }
        out.push('\n');
    }

    if !feature.depends_on.is_empty() {
        out.push_str(&format!("Depends on: {}\n\n", feature.depends_on.join(", ")));
    }

    if !feature.implementation_notes.is_empty() {
        out.push_str("## Notes from prior attempts\n");
        for note in &feature.implementation_notes {
            out.push_str(&format!("- {note}\n"));
        }
        out.push('\n');
    }

    if !handoff_notes.is_empty() {
        out.push_str("## Handoff from the previous session\n");
        for note in handoff_notes {
            out.push_str(note);
            out.push('\n');
        }
        out.push('\n');
    }

    if !progress_tail.trim().is_empty() {
        out.push_str("## Recent project progress\n");
        out.push_str(progress_tail);
        out.push('\n');
    }

    out.push_str(
        "Signal completion with a `completion_signal` transcript frame naming the acceptance \
         criteria you satisfied. If you run out of context before finishing, leave a clear \
         handoff note describing what remains.\n",
    );
    out
}

/// Render the one-shot prompt for the initializer agent (spec §4.4's
/// `AgentKind::Initializer`): asked to produce `feature-list.json` and
/// `.ada/project.json` directly via its own file tools rather than have the
/// harness parse its transcript.
pub fn render_initializer_prompt(project_name: &str) -> String {
    format!(
        "You are bootstrapping the autonomous coding backlog for the project \"{project_name}\".\n\n\
         Survey the repository and write `feature-list.json` at the project root: a JSON object \
         with a `project_name`, a `project_path`, and a `features` array. Each feature needs a \
         unique lowercase-hyphenated `id`, a `name`, a `description`, a `category` (one of \
         functional, infrastructure, testing, documentation, bugfix, refactor), an integer \
         `priority`, a `status` of \"pending\", an `acceptance_criteria` array, and an optional \
         `depends_on` array of other feature ids.\n\n\
         Also write `.ada/project.json` with `project_name` and `schema_generation: 1`.\n\n\
         Signal completion with a `completion_signal` transcript frame once both files exist.\n"
    )
}

/// Ask an interactive yes/no question on stdin/stdout, blocking the
/// executor thread (spec §4.7: checkpoint resume "offers (interactive) ...").
/// Any unreadable or empty answer defaults to yes, matching the `[Y/n]`
/// prompt text.
pub async fn confirm(question: &str) -> bool {
    let question = question.to_string();
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        print!("{question}");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return true;
        }
        let answer = answer.trim().to_lowercase();
        !(answer == "n" || answer == "no")
    })
    .await
    .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureCategory;

    fn feature() -> Feature {
        let mut f = Feature::new("f1", "First feature", 5);
        f.category = FeatureCategory::Functional;
        f.acceptance_criteria = vec!["tests pass".to_string()];
        f
    }

    #[test]
    fn renders_acceptance_criteria() {
        let prompt = render_feature_prompt(&feature(), "", &[]);
        assert!(prompt.contains("tests pass"));
        assert!(prompt.contains("Feature: First feature"));
    }

    #[test]
    fn renders_handoff_notes_when_present() {
        let prompt = render_feature_prompt(&feature(), "", &["ran out of context mid-refactor".to_string()]);
        assert!(prompt.contains("Handoff from the previous session"));
        assert!(prompt.contains("ran out of context"));
    }

    #[test]
    fn omits_optional_sections_when_empty() {
        let prompt = render_feature_prompt(&Feature::new("f2", "Bare", 1), "", &[]);
        assert!(!prompt.contains("Handoff from the previous session"));
        assert!(!prompt.contains("Depends on"));
    }
}
