//! In-process collaborators backed by a serializable [`MemoryState`].
//!
//! One [`InMemoryBackend`] implements every provider trait over shared state,
//! so evaluations attach assessments to the same traces the labeling and
//! metrics paths read back. Call counters and failure switches make it usable
//! as a test double.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Evaluator, JudgeRegistry, LabelingSource, Optimizer, Providers, TraceBackend};
use crate::alignment::ALIGNED_SAMPLES_COUNT;
use crate::error::{AlignError, AlignResult};
use crate::model::{
    Assessment, AssessmentSource, Judge, LabeledExample, LabelingProgress, OptimizedPrompt,
    RunInfo, Scorer, Trace,
};

/// Verdict the scripted evaluator gives when none is configured.
pub const DEFAULT_VERDICT: &str = "pass";

/// Labeling session of one judge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelingSession {
    pub trace_ids: Vec<String>,

    /// Reported labeled count. Derived from human assessments when unset.
    #[serde(default)]
    pub labeled_examples: Option<usize>,
}

/// Everything the in-memory backend knows; round-trips through serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryState {
    /// Judge versions per judge id, oldest first.
    #[serde(default)]
    pub judges: BTreeMap<String, Vec<Judge>>,

    /// Registered scorers by scorer name.
    #[serde(default)]
    pub scorers: BTreeMap<String, Scorer>,

    #[serde(default)]
    pub traces: BTreeMap<String, Trace>,

    #[serde(default)]
    pub runs: Vec<RunInfo>,

    /// Labeling session per judge id.
    #[serde(default)]
    pub labeling: BTreeMap<String, LabelingSession>,

    /// Scripted verdicts: scorer name -> trace id -> value.
    #[serde(default)]
    pub verdicts: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Default)]
struct Counters {
    trace_fetches: Mutex<HashMap<String, usize>>,
    evaluations: AtomicUsize,
    optimizations: AtomicUsize,
    versions_created: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    failing_traces: BTreeSet<String>,
    optimizer_error: Option<String>,
    evaluator_error: Option<String>,
    search_error: Option<String>,
}

/// In-memory judge registry, trace backend, evaluator, labeling source and optimizer.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted state, registering scorers for every judge version.
    pub fn from_state(mut state: MemoryState) -> Self {
        let versions: Vec<Judge> = state.judges.values().flatten().cloned().collect();
        for judge in versions {
            state
                .scorers
                .entry(judge.scorer_name())
                .or_insert_with(|| scorer_for(&judge));
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Self::default()
        }
    }

    /// Copy of the current state, for persistence.
    pub fn snapshot(&self) -> MemoryState {
        lock(&self.state).clone()
    }

    /// Bundle this backend as every collaborator.
    pub fn providers(&self) -> Providers {
        let this = Arc::new(self.clone());
        Providers {
            registry: this.clone(),
            backend: this.clone(),
            evaluator: this.clone(),
            labeling: this.clone(),
            optimizer: this,
        }
    }

    /// Insert a judge version and register its scorer.
    pub fn with_judge(self, judge: Judge) -> Self {
        {
            let mut state = lock(&self.state);
            state
                .scorers
                .insert(judge.scorer_name(), scorer_for(&judge));
            state
                .judges
                .entry(judge.id.clone())
                .or_default()
                .push(judge);
        }
        self
    }

    pub fn with_trace(self, trace: Trace) -> Self {
        lock(&self.state)
            .traces
            .insert(trace.trace_id.clone(), trace);
        self
    }

    pub fn with_run(self, run: RunInfo) -> Self {
        lock(&self.state).runs.push(run);
        self
    }

    pub fn with_labeling_session(self, judge_id: &str, session: LabelingSession) -> Self {
        lock(&self.state)
            .labeling
            .insert(judge_id.to_string(), session);
        self
    }

    /// Script the verdict a scorer gives for a trace.
    pub fn with_verdict(self, scorer_name: &str, trace_id: &str, value: &str) -> Self {
        lock(&self.state)
            .verdicts
            .entry(scorer_name.to_string())
            .or_default()
            .insert(trace_id.to_string(), value.to_string());
        self
    }

    /// Make fetches of `trace_id` fail with a backend error.
    pub fn fail_trace(&self, trace_id: &str) {
        lock(&self.faults)
            .failing_traces
            .insert(trace_id.to_string());
    }

    /// Make the optimizer fail with `message`.
    pub fn fail_optimizer(&self, message: &str) {
        lock(&self.faults).optimizer_error = Some(message.to_string());
    }

    /// Make the next evaluation fail with `message`.
    pub fn fail_next_evaluation(&self, message: &str) {
        lock(&self.faults).evaluator_error = Some(message.to_string());
    }

    /// Make run searches fail with `message`.
    pub fn fail_search(&self, message: &str) {
        lock(&self.faults).search_error = Some(message.to_string());
    }

    pub fn unregister_scorer(&self, scorer_name: &str) {
        lock(&self.state).scorers.remove(scorer_name);
    }

    /// Attach an assessment to a stored trace, replacing one with the same name and source.
    pub fn attach_assessment(&self, trace_id: &str, assessment: Assessment) {
        let mut state = lock(&self.state);
        if let Some(trace) = state.traces.get_mut(trace_id) {
            upsert_assessment(trace, assessment);
        }
    }

    pub fn trace_fetches(&self, trace_id: &str) -> usize {
        lock(&self.counters.trace_fetches)
            .get(trace_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn evaluations(&self) -> usize {
        self.counters.evaluations.load(Ordering::SeqCst)
    }

    pub fn optimizations(&self) -> usize {
        self.counters.optimizations.load(Ordering::SeqCst)
    }

    pub fn versions_created(&self) -> usize {
        self.counters.versions_created.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<RunInfo> {
        lock(&self.state).runs.clone()
    }

    pub fn run(&self, run_id: &str) -> Option<RunInfo> {
        lock(&self.state)
            .runs
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }
}

fn scorer_for(judge: &Judge) -> Scorer {
    Scorer {
        name: judge.scorer_name(),
        judge_id: judge.id.clone(),
        judge_version: judge.version,
        instruction: judge.instruction.clone(),
    }
}

fn upsert_assessment(trace: &mut Trace, assessment: Assessment) {
    trace
        .assessments
        .retain(|a| !(a.name == assessment.name && a.source == assessment.source));
    trace.assessments.push(assessment);
}

fn scripted_verdict(state: &MemoryState, scorer: &Scorer, trace_id: &str) -> String {
    state
        .verdicts
        .get(&scorer.name)
        .and_then(|by_trace| by_trace.get(trace_id))
        .cloned()
        .unwrap_or_else(|| DEFAULT_VERDICT.to_string())
}

#[async_trait]
impl JudgeRegistry for InMemoryBackend {
    async fn get_judge(&self, judge_id: &str) -> AlignResult<Option<Judge>> {
        Ok(lock(&self.state)
            .judges
            .get(judge_id)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn get_version(&self, judge_id: &str, version: u32) -> AlignResult<Option<Judge>> {
        Ok(lock(&self.state)
            .judges
            .get(judge_id)
            .and_then(|versions| versions.iter().find(|j| j.version == version))
            .cloned())
    }

    async fn list_versions(&self, judge_id: &str) -> AlignResult<Vec<Judge>> {
        Ok(lock(&self.state)
            .judges
            .get(judge_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_version(&self, judge_id: &str, instruction: &str) -> AlignResult<Judge> {
        let mut state = lock(&self.state);
        let versions = state
            .judges
            .get_mut(judge_id)
            .ok_or_else(|| AlignError::not_found("judge", judge_id))?;
        let current = versions
            .last()
            .cloned()
            .ok_or_else(|| AlignError::not_found("judge", judge_id))?;

        let next = Judge {
            instruction: instruction.to_string(),
            version: current.version + 1,
            ..current
        };
        versions.push(next.clone());
        state.scorers.insert(next.scorer_name(), scorer_for(&next));
        self.counters.versions_created.fetch_add(1, Ordering::SeqCst);
        debug!(judge_id, version = next.version, "created judge version");
        Ok(next)
    }

    async fn get_scorer(&self, judge_name: &str, version: u32) -> AlignResult<Option<Scorer>> {
        let name = crate::naming::scorer_name(judge_name, version);
        Ok(lock(&self.state).scorers.get(&name).cloned())
    }

    async fn delete_judge(&self, judge_id: &str) -> AlignResult<bool> {
        let mut state = lock(&self.state);
        let Some(versions) = state.judges.remove(judge_id) else {
            return Ok(false);
        };
        for judge in versions {
            state.scorers.remove(&judge.scorer_name());
        }
        state.labeling.remove(judge_id);
        Ok(true)
    }
}

#[async_trait]
impl TraceBackend for InMemoryBackend {
    async fn get_trace(&self, trace_id: &str) -> AlignResult<Option<Trace>> {
        *lock(&self.counters.trace_fetches)
            .entry(trace_id.to_string())
            .or_insert(0) += 1;
        if lock(&self.faults).failing_traces.contains(trace_id) {
            return Err(AlignError::backend(format!(
                "trace fetch failed for {}",
                trace_id
            )));
        }
        Ok(lock(&self.state).traces.get(trace_id).cloned())
    }

    async fn search_runs(
        &self,
        experiment_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> AlignResult<Vec<RunInfo>> {
        if let Some(message) = lock(&self.faults).search_error.clone() {
            return Err(AlignError::backend(message));
        }
        Ok(lock(&self.state)
            .runs
            .iter()
            .filter(|run| run.experiment_id == experiment_id)
            .filter(|run| tags.iter().all(|(k, v)| run.tags.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn start_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &BTreeMap<String, String>,
    ) -> AlignResult<RunInfo> {
        let run = RunInfo {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            experiment_id: experiment_id.to_string(),
            run_name: run_name.to_string(),
            tags: tags.clone(),
            start_time: Utc::now(),
        };
        lock(&self.state).runs.push(run.clone());
        Ok(run)
    }

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> AlignResult<()> {
        let mut state = lock(&self.state);
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| AlignError::not_found("run", run_id))?;
        run.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl Evaluator for InMemoryBackend {
    async fn evaluate(
        &self,
        run_id: &str,
        scorer: &Scorer,
        traces: &[Arc<Trace>],
    ) -> AlignResult<()> {
        self.counters.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.faults).evaluator_error.take() {
            return Err(AlignError::backend(message));
        }
        let mut state = lock(&self.state);
        for trace in traces {
            let value = scripted_verdict(&state, scorer, &trace.trace_id);
            if let Some(stored) = state.traces.get_mut(&trace.trace_id) {
                upsert_assessment(
                    stored,
                    Assessment::feedback(&scorer.name, AssessmentSource::LlmJudge, value),
                );
            }
        }
        debug!(run_id, scorer = %scorer.name, traces = traces.len(), "evaluated traces");
        Ok(())
    }

    async fn score(&self, scorer: &Scorer, trace: &Trace) -> AlignResult<Assessment> {
        let state = lock(&self.state);
        let value = scripted_verdict(&state, scorer, &trace.trace_id);
        Ok(Assessment::feedback(
            &scorer.name,
            AssessmentSource::LlmJudge,
            value,
        ))
    }
}

#[async_trait]
impl LabelingSource for InMemoryBackend {
    async fn examples(&self, judge: &Judge) -> AlignResult<Vec<LabeledExample>> {
        Ok(lock(&self.state)
            .labeling
            .get(&judge.id)
            .map(|session| {
                session
                    .trace_ids
                    .iter()
                    .map(|trace_id| LabeledExample {
                        trace_id: trace_id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn progress(&self, judge: &Judge) -> AlignResult<LabelingProgress> {
        let state = lock(&self.state);
        let Some(session) = state.labeling.get(&judge.id) else {
            return Ok(LabelingProgress::default());
        };

        let derived = session
            .trace_ids
            .iter()
            .filter_map(|id| state.traces.get(id))
            .filter(|trace| trace.human_feedback(&judge.name).is_some())
            .count();
        let used_for_alignment = judge
            .labeling_run_id
            .as_deref()
            .and_then(|run_id| state.runs.iter().find(|r| r.run_id == run_id))
            .and_then(|run| run.tags.get(ALIGNED_SAMPLES_COUNT))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(LabelingProgress {
            total_examples: session.trace_ids.len(),
            labeled_examples: session.labeled_examples.unwrap_or(derived),
            used_for_alignment,
        })
    }
}

#[async_trait]
impl Optimizer for InMemoryBackend {
    async fn optimize(
        &self,
        instruction: &str,
        traces: &[Arc<Trace>],
    ) -> AlignResult<OptimizedPrompt> {
        self.counters.optimizations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.faults).optimizer_error.clone() {
            return Err(AlignError::backend(message));
        }
        Ok(OptimizedPrompt {
            prompt: format!(
                "Evaluation criteria: {} (calibrated on {} labeled traces)\n<request>{{{{request}}}}</request>\n<response>{{{{response}}}}</response>",
                instruction.trim(),
                traces.len()
            ),
            algorithm: "scripted".to_string(),
        })
    }
}
