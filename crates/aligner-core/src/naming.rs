//! Identifier conventions for judges, scorers and evaluation runs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_IDENT: Regex = Regex::new(r"[^a-z0-9_]").unwrap();
    static ref UNDERSCORE_RUNS: Regex = Regex::new(r"_+").unwrap();
}

/// Lowercase identifier form of a judge name.
///
/// Spaces, hyphens and other non-alphanumerics become underscores, runs of
/// underscores collapse, and leading/trailing underscores are dropped.
pub fn sanitize_judge_name(judge_name: &str) -> String {
    let lowered = judge_name.to_lowercase();
    let replaced = NON_IDENT.replace_all(&lowered, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Scorer name registered for a judge version.
pub fn scorer_name(judge_name: &str, version: u32) -> String {
    format!(
        "v{}_custom_prompt_judge_{}",
        version,
        sanitize_judge_name(judge_name)
    )
}

/// Run name used for an evaluation of a judge version.
pub fn evaluation_run_name(judge_name: &str, version: u32) -> String {
    format!("evaluation_{}_v{}", sanitize_judge_name(judge_name), version)
}

/// Strip the optimizer's prompt scaffolding down to the instruction text.
///
/// Optimized prompts look like `Evaluation criteria: <text> <request>...`;
/// only `<text>` is kept.
pub fn extract_instructions(prompt: &str) -> String {
    let without_prefix = prompt.replace("Evaluation criteria: ", "");
    without_prefix
        .split("<request>")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_judge_name() {
        assert_eq!(sanitize_judge_name("Quality Judge"), "quality_judge");
        assert_eq!(
            sanitize_judge_name("Multi-Word Judge Name!"),
            "multi_word_judge_name"
        );
        assert_eq!(sanitize_judge_name("  Spaced  Out  "), "spaced_out");
        assert_eq!(sanitize_judge_name(""), "");
    }

    #[test]
    fn test_scorer_and_run_names() {
        assert_eq!(
            scorer_name("Quality Judge", 3),
            "v3_custom_prompt_judge_quality_judge"
        );
        assert_eq!(
            evaluation_run_name("Quality Judge", 2),
            "evaluation_quality_judge_v2"
        );
    }

    #[test]
    fn test_extract_instructions() {
        let prompt = "Evaluation criteria: Be concise and polite.\n<request>{{request}}</request>";
        assert_eq!(extract_instructions(prompt), "Be concise and polite.");
        assert_eq!(extract_instructions("  plain text "), "plain text");
    }
}
