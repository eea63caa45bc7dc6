//! Alignment workflow: evaluate, optimize, create a version, re-evaluate.
//!
//! Each invocation walks the [`AlignmentState`] machine over an
//! [`AlignmentRun`]. Runs for the same judge are serialized by a per-judge
//! async lock; runs for different judges proceed independently.

mod state;
mod steps;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

pub use state::{AlignmentRun, AlignmentState};

use crate::cache::CacheStore;
use crate::config::AlignerConfig;
use crate::error::AlignResult;
use crate::evaluation::EvaluationService;
use crate::model::AlignmentResponse;
use crate::providers::{JudgeRegistry, LabelingSource, Optimizer, Providers, TraceBackend};

/// Tag written on a judge's labeling run once alignment completes.
pub const ALIGNED_SAMPLES_COUNT: &str = "aligned_samples_count";

pub struct AlignmentService {
    registry: Arc<dyn JudgeRegistry>,
    backend: Arc<dyn TraceBackend>,
    labeling: Arc<dyn LabelingSource>,
    optimizer: Arc<dyn Optimizer>,
    evaluation: Arc<EvaluationService>,
    cache: Arc<CacheStore>,
    min_examples: usize,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AlignmentService {
    pub fn new(
        config: &AlignerConfig,
        providers: &Providers,
        cache: Arc<CacheStore>,
        evaluation: Arc<EvaluationService>,
    ) -> Self {
        Self {
            registry: providers.registry.clone(),
            backend: providers.backend.clone(),
            labeling: providers.labeling.clone(),
            optimizer: providers.optimizer.clone(),
            evaluation,
            cache,
            min_examples: config.min_examples,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn judge_lock(&self, judge_id: &str) -> Arc<AsyncMutex<()>> {
        self.lock_table()
            .entry(judge_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the judge's lock entry once no run holds or waits on it.
    fn release_judge_lock(&self, judge_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.lock_table();
        drop(lock);
        if locks
            .get(judge_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(judge_id);
        }
    }

    /// Run alignment and return the run context along with the outcome.
    pub async fn align(&self, judge_id: &str) -> (AlignmentRun, AlignResult<AlignmentResponse>) {
        let lock = self.judge_lock(judge_id);
        let guard = lock.lock().await;

        let mut run = AlignmentRun::new(judge_id);
        let result = self.drive(&mut run).await;
        if let Err(e) = &result {
            run.fail(e);
        }

        drop(guard);
        self.release_judge_lock(judge_id, lock);
        (run, result)
    }

    pub async fn run_alignment(&self, judge_id: &str) -> AlignResult<AlignmentResponse> {
        self.align(judge_id).await.1
    }

    /// Run alignment on a runtime worker; the caller awaits the handle.
    pub fn spawn_alignment(
        self: &Arc<Self>,
        judge_id: impl Into<String>,
    ) -> JoinHandle<AlignResult<AlignmentResponse>> {
        let service = Arc::clone(self);
        let judge_id = judge_id.into();
        tokio::spawn(async move { service.run_alignment(&judge_id).await })
    }
}
