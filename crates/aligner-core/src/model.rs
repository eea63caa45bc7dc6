//! Domain types shared by the cache, evaluation, alignment and metrics layers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::naming::{sanitize_judge_name, scorer_name};

/// One immutable version of a judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judge {
    /// Stable judge identifier, shared by all versions.
    pub id: String,

    /// Human-readable judge name.
    pub name: String,

    /// Evaluation criteria for this version.
    pub instruction: String,

    /// Experiment the judge's runs are recorded in.
    pub experiment_id: String,

    /// Version number, starting at 1.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Run holding the labeling session for this judge.
    #[serde(default)]
    pub labeling_run_id: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Judge {
    /// Name of the scorer registered for this exact version.
    pub fn scorer_name(&self) -> String {
        scorer_name(&self.name, self.version)
    }
}

/// Scorer registered for a judge version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorer {
    pub name: String,
    pub judge_id: String,
    pub judge_version: u32,
    pub instruction: String,
}

/// A recorded request/response interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub request: String,
    pub response: String,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
}

impl Trace {
    /// Human assessment attached for `judge_name`, if any.
    pub fn human_feedback(&self, judge_name: &str) -> Option<&Assessment> {
        let name = sanitize_judge_name(judge_name);
        self.assessments
            .iter()
            .find(|a| a.source == AssessmentSource::Human && a.name == name)
    }

    /// Assessment written by the scorer of `judge_name` at `version`, if any.
    pub fn scorer_feedback(&self, judge_name: &str, version: u32) -> Option<&Assessment> {
        let name = scorer_name(judge_name, version);
        self.assessments
            .iter()
            .find(|a| a.source == AssessmentSource::LlmJudge && a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentSource {
    Human,
    LlmJudge,
    Code,
}

/// Feedback entry attached to a trace by a human or a judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub name: String,
    pub source: AssessmentSource,
    #[serde(flatten)]
    pub outcome: AssessmentOutcome,
}

impl Assessment {
    pub fn feedback(
        name: impl Into<String>,
        source: AssessmentSource,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            outcome: AssessmentOutcome::Feedback(Feedback {
                value: value.into(),
                rationale: None,
                metadata: BTreeMap::new(),
            }),
        }
    }

    pub fn error(
        name: impl Into<String>,
        source: AssessmentSource,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            outcome: AssessmentOutcome::Error(EvaluationError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// The successful feedback, or `None` when the assessment errored.
    pub fn as_feedback(&self) -> Option<&Feedback> {
        match &self.outcome {
            AssessmentOutcome::Feedback(f) => Some(f),
            AssessmentOutcome::Error(_) => None,
        }
    }

    pub fn has_error(&self) -> bool {
        matches!(self.outcome, AssessmentOutcome::Error(_))
    }
}

/// Either a verdict or the error that prevented one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentOutcome {
    Feedback(Feedback),
    Error(EvaluationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub value: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationError {
    pub code: String,
    pub message: String,
}

/// Example queued for labeling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub trace_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelingProgress {
    pub total_examples: usize,
    pub labeled_examples: usize,
    #[serde(default)]
    pub used_for_alignment: usize,
}

/// Remote run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub start_time: DateTime<Utc>,
}

/// Optimizer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    pub prompt: String,
    pub algorithm: String,
}

/// Result of an evaluation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub judge_id: String,
    pub judge_version: u32,
    pub run_id: String,
    pub total_traces: usize,
}

impl EvaluationResult {
    /// Zero-count result returned when an evaluation request fails.
    pub fn empty(judge_id: impl Into<String>) -> Self {
        Self {
            judge_id: judge_id.into(),
            judge_version: 0,
            run_id: String::new(),
            total_traces: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.run_id.is_empty()
    }
}

/// Result of scoring a single trace with a judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeTestResult {
    pub judge_id: String,
    pub judge_version: u32,
    pub trace_id: String,
    pub assessment: Assessment,
}

/// Outcome of a successful alignment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResponse {
    pub judge_id: String,
    pub success: bool,
    pub message: String,
    pub new_version: u32,
    #[serde(default)]
    pub improvement_metrics: Option<serde_json::Value>,
}

/// Per-trace view of human, previous-judge and new-judge feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentComparison {
    pub trace_id: String,
    pub request: String,
    pub response: String,
    pub human_feedback: Feedback,
    pub previous_judge_feedback: Feedback,
    pub new_judge_feedback: Feedback,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_with(assessments: Vec<Assessment>) -> Trace {
        Trace {
            trace_id: "t1".into(),
            request: "q".into(),
            response: "a".into(),
            assessments,
        }
    }

    #[test]
    fn test_human_feedback_matches_sanitized_name() {
        let trace = trace_with(vec![
            Assessment::feedback(
                "v1_custom_prompt_judge_tone_check",
                AssessmentSource::LlmJudge,
                "fail",
            ),
            Assessment::feedback("tone_check", AssessmentSource::Human, "pass"),
        ]);
        let human = trace.human_feedback("Tone Check").unwrap();
        assert_eq!(human.as_feedback().unwrap().value, "pass");
        assert!(trace.human_feedback("Other").is_none());
    }

    #[test]
    fn test_scorer_feedback_is_version_specific() {
        let trace = trace_with(vec![
            Assessment::feedback(
                "v1_custom_prompt_judge_tone_check",
                AssessmentSource::LlmJudge,
                "fail",
            ),
            Assessment::error(
                "v2_custom_prompt_judge_tone_check",
                AssessmentSource::LlmJudge,
                "TIMEOUT",
                "judge timed out",
            ),
        ]);
        let v1 = trace.scorer_feedback("Tone Check", 1).unwrap();
        assert!(!v1.has_error());
        let v2 = trace.scorer_feedback("Tone Check", 2).unwrap();
        assert!(v2.has_error());
        assert!(v2.as_feedback().is_none());
        assert!(trace.scorer_feedback("Tone Check", 3).is_none());
    }

    #[test]
    fn test_assessment_serde_shape() {
        let json = serde_json::json!({
            "name": "tone_check",
            "source": "HUMAN",
            "feedback": { "value": "Pass" }
        });
        let parsed: Assessment = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.as_feedback().unwrap().value, "Pass");

        let err = serde_json::json!({
            "name": "v1_custom_prompt_judge_tone_check",
            "source": "LLM_JUDGE",
            "error": { "code": "PARSE", "message": "bad output" }
        });
        let parsed: Assessment = serde_json::from_value(err).unwrap();
        assert!(parsed.has_error());
    }
}
