//! Interfaces to the remote systems the core orchestrates.
//!
//! Implementations talk to a tracking backend, a judge registry and an
//! optimizer; the core only sees these traits. [`memory`] provides
//! in-process implementations used by the CLI and tests.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AlignResult;
use crate::model::{
    Assessment, Judge, LabeledExample, LabelingProgress, OptimizedPrompt, RunInfo, Scorer, Trace,
};

/// Versioned judge storage.
#[async_trait]
pub trait JudgeRegistry: Send + Sync {
    /// Latest version of a judge.
    async fn get_judge(&self, judge_id: &str) -> AlignResult<Option<Judge>>;

    async fn get_version(&self, judge_id: &str, version: u32) -> AlignResult<Option<Judge>>;

    /// All versions, oldest first.
    async fn list_versions(&self, judge_id: &str) -> AlignResult<Vec<Judge>>;

    /// Create `latest.version + 1` with new instructions and register its scorer.
    async fn create_version(&self, judge_id: &str, instruction: &str) -> AlignResult<Judge>;

    async fn get_scorer(&self, judge_name: &str, version: u32) -> AlignResult<Option<Scorer>>;

    async fn delete_judge(&self, judge_id: &str) -> AlignResult<bool>;
}

/// Durable trace and run storage.
#[async_trait]
pub trait TraceBackend: Send + Sync {
    async fn get_trace(&self, trace_id: &str) -> AlignResult<Option<Trace>>;

    /// Runs in `experiment_id` carrying every tag in `tags`.
    async fn search_runs(
        &self,
        experiment_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> AlignResult<Vec<RunInfo>>;

    async fn start_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &BTreeMap<String, String>,
    ) -> AlignResult<RunInfo>;

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> AlignResult<()>;
}

/// Executes a scorer over traces.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score `traces` under `run_id`, attaching assessments on the backend.
    async fn evaluate(&self, run_id: &str, scorer: &Scorer, traces: &[Arc<Trace>])
        -> AlignResult<()>;

    /// Score one trace without recording a run.
    async fn score(&self, scorer: &Scorer, trace: &Trace) -> AlignResult<Assessment>;
}

/// Human labeling sessions.
#[async_trait]
pub trait LabelingSource: Send + Sync {
    async fn examples(&self, judge: &Judge) -> AlignResult<Vec<LabeledExample>>;

    async fn progress(&self, judge: &Judge) -> AlignResult<LabelingProgress>;
}

/// Prompt optimizer.
#[async_trait]
pub trait Optimizer: Send + Sync {
    /// Optimize `instruction` against labeled traces. Errors are fatal to the caller.
    async fn optimize(&self, instruction: &str, traces: &[Arc<Trace>])
        -> AlignResult<OptimizedPrompt>;
}

/// Handles to every collaborator, constructed once per process.
#[derive(Clone)]
pub struct Providers {
    pub registry: Arc<dyn JudgeRegistry>,
    pub backend: Arc<dyn TraceBackend>,
    pub evaluator: Arc<dyn Evaluator>,
    pub labeling: Arc<dyn LabelingSource>,
    pub optimizer: Arc<dyn Optimizer>,
}
