use std::sync::Arc;

use tracing::{error, info, warn};

use super::{AlignmentRun, AlignmentService, AlignmentState, ALIGNED_SAMPLES_COUNT};
use crate::error::{AlignError, AlignResult};
use crate::evaluation::require_judge;
use crate::model::{AlignmentResponse, Judge, OptimizedPrompt, Trace};
use crate::naming::extract_instructions;

impl AlignmentService {
    pub(super) async fn drive(&self, run: &mut AlignmentRun) -> AlignResult<AlignmentResponse> {
        run.advance(AlignmentState::FetchingExamples);
        let judge = require_judge(self.registry.as_ref(), &run.judge_id).await?;
        run.previous_version = Some(judge.version);
        let traces = self.fetch_examples(&judge).await?;
        run.trace_ids = traces.iter().map(|t| t.trace_id.clone()).collect();

        run.advance(AlignmentState::CheckingSufficiency);
        run.labeled_examples = self.check_sufficiency(&judge).await?;

        run.advance(AlignmentState::EvaluatingBaseline);
        info!(judge_id = %judge.id, version = judge.version, "running baseline evaluation");
        let baseline = self.evaluation.evaluate(&judge, &run.trace_ids).await?;
        run.baseline_run_id = Some(baseline.run_id);
        // The evaluator attached new feedback remotely.
        self.cache.invalidate_traces(&run.trace_ids);

        run.advance(AlignmentState::Optimizing);
        let optimized = self.optimize(&judge, &run.trace_ids).await?;

        run.advance(AlignmentState::CreatingVersion);
        let new_judge = self.create_version(&judge, &optimized).await?;
        run.new_version = Some(new_judge.version);

        run.advance(AlignmentState::EvaluatingNew);
        info!(judge_id = %new_judge.id, version = new_judge.version, "running evaluation on new version");
        let evaluated = self.evaluation.evaluate(&new_judge, &run.trace_ids).await?;
        run.new_run_id = Some(evaluated.run_id);
        self.cache.invalidate_traces(&run.trace_ids);

        run.advance(AlignmentState::TaggingRun);
        let aligned_samples = self.tag_labeling_run(&new_judge, run.labeled_examples).await;

        run.advance(AlignmentState::Done);
        info!(
            judge_id = %new_judge.id,
            from = judge.version,
            to = new_judge.version,
            aligned_samples,
            "alignment complete"
        );
        Ok(AlignmentResponse {
            judge_id: new_judge.id.clone(),
            success: true,
            message: format!(
                "Successfully optimized judge from version {} to {} using {} aligned samples",
                judge.version, new_judge.version, aligned_samples
            ),
            new_version: new_judge.version,
            improvement_metrics: None,
        })
    }

    /// Resolve the labeling session to traces, skipping unresolvable ids.
    async fn fetch_examples(&self, judge: &Judge) -> AlignResult<Vec<Arc<Trace>>> {
        let examples = self.labeling.examples(judge).await?;
        let mut traces = Vec::with_capacity(examples.len());
        for example in &examples {
            match self.cache.get_trace(&example.trace_id).await {
                Some(trace) => traces.push(trace),
                None => warn!(trace_id = %example.trace_id, "could not fetch labeled trace"),
            }
        }
        if traces.is_empty() {
            return Err(AlignError::not_found("labeled traces for judge", &judge.id));
        }
        info!(judge_id = %judge.id, examples = examples.len(), resolved = traces.len(), "fetched labeled examples");
        Ok(traces)
    }

    async fn check_sufficiency(&self, judge: &Judge) -> AlignResult<usize> {
        let progress = self.labeling.progress(judge).await?;
        if progress.labeled_examples < self.min_examples {
            return Err(AlignError::InsufficientData {
                required: self.min_examples,
                actual: progress.labeled_examples,
            });
        }
        Ok(progress.labeled_examples)
    }

    async fn optimize(&self, judge: &Judge, trace_ids: &[String]) -> AlignResult<OptimizedPrompt> {
        let fresh = self.cache.get_traces(trace_ids).await;
        info!(judge_id = %judge.id, traces = fresh.len(), "starting optimization");

        let optimized = self
            .optimizer
            .optimize(&judge.instruction, &fresh)
            .await
            .map_err(|e| {
                error!(judge_id = %judge.id, error = %e, "optimization failed");
                AlignError::OptimizationFailed {
                    judge_id: judge.id.clone(),
                    message: e.to_string(),
                }
            })?;
        info!(judge_id = %judge.id, algorithm = %optimized.algorithm, "optimization finished");
        Ok(optimized)
    }

    async fn create_version(&self, judge: &Judge, optimized: &OptimizedPrompt) -> AlignResult<Judge> {
        let instructions = extract_instructions(&optimized.prompt);
        if instructions.is_empty() {
            return Err(AlignError::OptimizationFailed {
                judge_id: judge.id.clone(),
                message: "optimizer produced empty instructions".to_string(),
            });
        }
        let new_judge = self.registry.create_version(&judge.id, &instructions).await?;
        info!(judge_id = %judge.id, version = new_judge.version, "created judge version");
        Ok(new_judge)
    }

    /// Tag the labeling run with the aligned sample count.
    ///
    /// Tagging is bookkeeping: failures are logged and the count is still
    /// reported.
    async fn tag_labeling_run(&self, judge: &Judge, fallback_count: usize) -> usize {
        let aligned_samples = match self.labeling.progress(judge).await {
            Ok(progress) => progress.labeled_examples,
            Err(e) => {
                warn!(judge_id = %judge.id, error = %e, "failed to re-read labeling progress");
                fallback_count
            }
        };

        let Some(run_id) = judge.labeling_run_id.as_deref() else {
            warn!(judge_id = %judge.id, "judge has no labeling run, skipping tag");
            return aligned_samples;
        };
        match self
            .backend
            .set_tag(run_id, ALIGNED_SAMPLES_COUNT, &aligned_samples.to_string())
            .await
        {
            Ok(()) => info!(run_id, aligned_samples, "tagged labeling run"),
            Err(e) => warn!(run_id, error = %e, "failed to tag labeling run"),
        }
        aligned_samples
    }
}
