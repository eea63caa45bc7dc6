//! Evaluation coordination: reuse a recorded run or create one.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::{key, CacheStore};
use crate::error::{AlignError, AlignResult};
use crate::fingerprint::fingerprint;
use crate::model::{EvaluationResult, Judge, JudgeTestResult};
use crate::naming::evaluation_run_name;
use crate::providers::{Evaluator, JudgeRegistry, Providers, TraceBackend};

/// Look up the latest version of a judge or fail with not-found.
pub(crate) async fn require_judge(
    registry: &dyn JudgeRegistry,
    judge_id: &str,
) -> AlignResult<Judge> {
    registry
        .get_judge(judge_id)
        .await?
        .ok_or_else(|| AlignError::not_found("judge", judge_id))
}

/// Produces evaluation runs for judge versions, at most once per dataset.
pub struct EvaluationService {
    registry: Arc<dyn JudgeRegistry>,
    backend: Arc<dyn TraceBackend>,
    evaluator: Arc<dyn Evaluator>,
    cache: Arc<CacheStore>,
}

impl EvaluationService {
    pub fn new(providers: &Providers, cache: Arc<CacheStore>) -> Self {
        Self {
            registry: providers.registry.clone(),
            backend: providers.backend.clone(),
            evaluator: providers.evaluator.clone(),
            cache,
        }
    }

    /// Request-level entry point.
    ///
    /// Never fails: any error is logged and reported as a zero-count result
    /// with an empty run id.
    pub async fn evaluate_judge<S: AsRef<str>>(
        &self,
        judge_id: &str,
        trace_ids: &[S],
    ) -> EvaluationResult {
        match self.try_evaluate_judge(judge_id, trace_ids).await {
            Ok(result) => result,
            Err(e) => {
                error!(judge_id, error = %e, "failed to evaluate judge");
                EvaluationResult::empty(judge_id)
            }
        }
    }

    /// Evaluate the latest version of `judge_id`, propagating errors.
    pub async fn try_evaluate_judge<S: AsRef<str>>(
        &self,
        judge_id: &str,
        trace_ids: &[S],
    ) -> AlignResult<EvaluationResult> {
        let judge = require_judge(self.registry.as_ref(), judge_id).await?;
        self.evaluate(&judge, trace_ids).await
    }

    /// Evaluate one judge version over a dataset.
    ///
    /// A run already recorded for (judge id, version, dataset fingerprint),
    /// in cache or on the backend, is returned without calling the evaluator.
    pub async fn evaluate<S: AsRef<str>>(
        &self,
        judge: &Judge,
        trace_ids: &[S],
    ) -> AlignResult<EvaluationResult> {
        if let Some(run_id) = self
            .cache
            .get_evaluation_run_id(
                &judge.id,
                judge.version,
                trace_ids,
                Some(&judge.experiment_id),
            )
            .await
        {
            info!(judge_id = %judge.id, version = judge.version, run_id = %run_id, "using cached evaluation run");
            return Ok(EvaluationResult {
                judge_id: judge.id.clone(),
                judge_version: judge.version,
                run_id,
                total_traces: trace_ids.len(),
            });
        }

        let scorer = self
            .registry
            .get_scorer(&judge.name, judge.version)
            .await?
            .ok_or_else(|| AlignError::not_found("scorer", judge.scorer_name()))?;
        info!(scorer = %scorer.name, judge_id = %judge.id, version = judge.version, "found scorer");

        let traces = self.cache.get_traces(trace_ids).await;
        if traces.len() < trace_ids.len() {
            warn!(
                judge_id = %judge.id,
                requested = trace_ids.len(),
                resolved = traces.len(),
                "some traces could not be fetched"
            );
        }
        if traces.is_empty() {
            return Err(AlignError::invalid_input("no valid traces found"));
        }

        let dataset = fingerprint(trace_ids);
        let run = self
            .backend
            .start_run(
                &judge.experiment_id,
                &evaluation_run_name(&judge.name, judge.version),
                &key::pending_run_tags(&judge.id, judge.version),
            )
            .await?;

        self.evaluator
            .evaluate(&run.run_id, &scorer, &traces)
            .await?;
        // Only a completed run carries the dataset tag that lookups match on.
        if let Err(e) = self
            .backend
            .set_tag(&run.run_id, key::TAG_DATASET_VERSION, dataset.as_str())
            .await
        {
            warn!(run_id = %run.run_id, error = %e, "failed to tag evaluation run with dataset");
        }
        self.cache
            .cache_evaluation_run_id(&judge.id, judge.version, trace_ids, &run.run_id);

        info!(
            judge_id = %judge.id,
            version = judge.version,
            run_id = %run.run_id,
            dataset = %dataset,
            traces = traces.len(),
            "evaluation run recorded"
        );
        Ok(EvaluationResult {
            judge_id: judge.id.clone(),
            judge_version: judge.version,
            run_id: run.run_id,
            total_traces: traces.len(),
        })
    }

    /// Score a single trace with the latest judge version.
    pub async fn test_judge(&self, judge_id: &str, trace_id: &str) -> AlignResult<JudgeTestResult> {
        let judge = require_judge(self.registry.as_ref(), judge_id).await?;
        let trace = self
            .cache
            .get_trace(trace_id)
            .await
            .ok_or_else(|| AlignError::not_found("trace", trace_id))?;
        let scorer = self
            .registry
            .get_scorer(&judge.name, judge.version)
            .await?
            .ok_or_else(|| AlignError::not_found("scorer", judge.scorer_name()))?;

        let assessment = self.evaluator.score(&scorer, &trace).await?;
        Ok(JudgeTestResult {
            judge_id: judge.id,
            judge_version: judge.version,
            trace_id: trace_id.to_string(),
            assessment,
        })
    }

    /// Delete a judge and forget its cached evaluation runs.
    pub async fn delete_judge(&self, judge_id: &str) -> AlignResult<bool> {
        let deleted = self.registry.delete_judge(judge_id).await?;
        self.cache.invalidate_judge_evaluations(judge_id);
        if deleted {
            info!(judge_id, "deleted judge");
        } else {
            warn!(judge_id, "cannot delete judge: not found");
        }
        Ok(deleted)
    }
}
