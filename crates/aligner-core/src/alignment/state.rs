use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AlignError;

/// Named steps of one alignment invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentState {
    Idle,
    FetchingExamples,
    CheckingSufficiency,
    EvaluatingBaseline,
    Optimizing,
    CreatingVersion,
    EvaluatingNew,
    TaggingRun,
    Done,
    Failed,
}

impl AlignmentState {
    /// Successor on the success path. `None` for terminal states.
    pub fn next(self) -> Option<Self> {
        use AlignmentState::*;
        match self {
            Idle => Some(FetchingExamples),
            FetchingExamples => Some(CheckingSufficiency),
            CheckingSufficiency => Some(EvaluatingBaseline),
            EvaluatingBaseline => Some(Optimizing),
            Optimizing => Some(CreatingVersion),
            CreatingVersion => Some(EvaluatingNew),
            EvaluatingNew => Some(TaggingRun),
            TaggingRun => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// `Failed` is reachable from every non-terminal state.
    pub fn can_transition_to(self, to: Self) -> bool {
        if to == Self::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingExamples => "fetching_examples",
            Self::CheckingSufficiency => "checking_sufficiency",
            Self::EvaluatingBaseline => "evaluating_baseline",
            Self::Optimizing => "optimizing",
            Self::CreatingVersion => "creating_version",
            Self::EvaluatingNew => "evaluating_new",
            Self::TaggingRun => "tagging_run",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AlignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context carried through one alignment invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentRun {
    pub judge_id: String,
    state: AlignmentState,
    history: Vec<AlignmentState>,

    /// Trace ids resolved from the labeling session.
    pub trace_ids: Vec<String>,
    pub labeled_examples: usize,
    pub previous_version: Option<u32>,
    pub baseline_run_id: Option<String>,
    pub new_version: Option<u32>,
    pub new_run_id: Option<String>,
    pub error: Option<String>,
}

impl AlignmentRun {
    pub fn new(judge_id: impl Into<String>) -> Self {
        Self {
            judge_id: judge_id.into(),
            state: AlignmentState::Idle,
            history: vec![AlignmentState::Idle],
            trace_ids: Vec::new(),
            labeled_examples: 0,
            previous_version: None,
            baseline_run_id: None,
            new_version: None,
            new_run_id: None,
            error: None,
        }
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[AlignmentState] {
        &self.history
    }

    /// Move to the next success-path state.
    pub(crate) fn advance(&mut self, to: AlignmentState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal alignment transition {} -> {}",
            self.state,
            to
        );
        tracing::debug!(judge_id = %self.judge_id, from = %self.state, to = %to, "alignment transition");
        self.state = to;
        self.history.push(to);
    }

    pub(crate) fn fail(&mut self, error: &AlignError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(judge_id = %self.judge_id, state = %self.state, error = %error, "alignment failed");
        self.error = Some(error.to_string());
        self.state = AlignmentState::Failed;
        self.history.push(AlignmentState::Failed);
    }
}
