//! Version comparison against human labels.

mod confusion;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use confusion::{agreement_count, is_pass, AlignmentMetrics, ConfusionMatrix};

use crate::cache::CacheStore;
use crate::error::{AlignError, AlignResult};
use crate::evaluation::require_judge;
use crate::model::{AlignmentComparison, Judge};
use crate::providers::{JudgeRegistry, LabelingSource, Providers};

/// Metrics plus the per-trace rows they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub metrics: AlignmentMetrics,
    pub comparisons: Vec<AlignmentComparison>,
}

pub struct MetricsService {
    registry: Arc<dyn JudgeRegistry>,
    labeling: Arc<dyn LabelingSource>,
    cache: Arc<CacheStore>,
}

impl MetricsService {
    pub fn new(providers: &Providers, cache: Arc<CacheStore>) -> Self {
        Self {
            registry: providers.registry.clone(),
            labeling: providers.labeling.clone(),
            cache,
        }
    }

    /// Compare the latest judge version with its predecessor.
    ///
    /// Both evaluation runs must already exist; nothing is evaluated here.
    /// Rows missing a feedback, or carrying an errored one, are skipped.
    pub async fn compare_versions(&self, judge_id: &str) -> AlignResult<VersionComparison> {
        let judge = require_judge(self.registry.as_ref(), judge_id).await?;
        if judge.version < 2 {
            return Err(AlignError::invalid_input(format!(
                "judge {} must have version >= 2 for alignment comparison",
                judge_id
            )));
        }
        let previous_version = judge.version - 1;

        let trace_ids: Vec<String> = self
            .labeling
            .examples(&judge)
            .await?
            .into_iter()
            .map(|example| example.trace_id)
            .collect();
        if trace_ids.is_empty() {
            return Err(AlignError::not_found("labeled traces for judge", judge_id));
        }

        self.require_runs(&judge, previous_version, &trace_ids).await?;

        let mut comparisons = Vec::new();
        for trace_id in &trace_ids {
            if let Some(row) = self.compare_trace(&judge, previous_version, trace_id).await {
                comparisons.push(row);
            }
        }
        if comparisons.is_empty() {
            return Err(AlignError::not_found(
                "valid examples with both human and judge feedback",
                judge_id,
            ));
        }

        let human: Vec<&str> = comparisons.iter().map(|c| c.human_feedback.value.as_str()).collect();
        let previous: Vec<&str> = comparisons
            .iter()
            .map(|c| c.previous_judge_feedback.value.as_str())
            .collect();
        let new: Vec<&str> = comparisons
            .iter()
            .map(|c| c.new_judge_feedback.value.as_str())
            .collect();
        let metrics = AlignmentMetrics::from_labels(&human, &previous, &new)?;

        info!(
            judge_id,
            samples = metrics.total_samples,
            previous_agreement = metrics.previous_agreement_count,
            new_agreement = metrics.new_agreement_count,
            "computed alignment metrics"
        );
        Ok(VersionComparison {
            metrics,
            comparisons,
        })
    }

    async fn require_runs(
        &self,
        judge: &Judge,
        previous_version: u32,
        trace_ids: &[String],
    ) -> AlignResult<()> {
        let experiment = Some(judge.experiment_id.as_str());
        let previous = self
            .cache
            .get_evaluation_run_id(&judge.id, previous_version, trace_ids, experiment)
            .await;
        let current = self
            .cache
            .get_evaluation_run_id(&judge.id, judge.version, trace_ids, experiment)
            .await;
        match (previous, current) {
            (Some(previous), Some(current)) => {
                debug!(judge_id = %judge.id, previous_run = %previous, current_run = %current, "found evaluation runs");
                Ok(())
            }
            _ => Err(AlignError::not_found(
                "evaluation runs",
                format!("{} (run alignment first)", judge.id),
            )),
        }
    }

    async fn compare_trace(
        &self,
        judge: &Judge,
        previous_version: u32,
        trace_id: &str,
    ) -> Option<AlignmentComparison> {
        let Some(trace) = self.cache.get_trace(trace_id).await else {
            warn!(trace_id, "skipping trace: not found");
            return None;
        };
        let Some(human) = trace.human_feedback(&judge.name) else {
            debug!(trace_id, "skipping trace: no human feedback");
            return None;
        };
        let Some(previous) = trace.scorer_feedback(&judge.name, previous_version) else {
            warn!(trace_id, version = previous_version, "skipping trace: missing previous judge feedback");
            return None;
        };
        let Some(current) = trace.scorer_feedback(&judge.name, judge.version) else {
            warn!(trace_id, version = judge.version, "skipping trace: missing current judge feedback");
            return None;
        };

        match (human.as_feedback(), previous.as_feedback(), current.as_feedback()) {
            (Some(human), Some(previous), Some(current)) => Some(AlignmentComparison {
                trace_id: trace.trace_id.clone(),
                request: trace.request.clone(),
                response: trace.response.clone(),
                human_feedback: human.clone(),
                previous_judge_feedback: previous.clone(),
                new_judge_feedback: current.clone(),
            }),
            _ => {
                warn!(
                    trace_id,
                    human = human.has_error(),
                    previous = previous.has_error(),
                    current = current.has_error(),
                    "skipping trace: assessment has errors"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlignerConfig;
    use crate::error::ErrorKind;
    use crate::evaluation::EvaluationService;
    use crate::model::{Assessment, AssessmentSource, Trace};
    use crate::providers::memory::{InMemoryBackend, LabelingSession};

    const V1: &str = "v1_custom_prompt_judge_tone_check";
    const V2: &str = "v2_custom_prompt_judge_tone_check";

    fn judge(version: u32) -> Judge {
        Judge {
            id: "j1".into(),
            name: "Tone Check".into(),
            instruction: "be polite".into(),
            experiment_id: "exp".into(),
            version,
            labeling_run_id: None,
        }
    }

    fn trace(id: &str, human: &str) -> Trace {
        Trace {
            trace_id: id.into(),
            request: format!("q{id}"),
            response: format!("a{id}"),
            assessments: vec![Assessment::feedback("tone_check", AssessmentSource::Human, human)],
        }
    }

    /// Two versions with human labels [pass, fail, pass] and both runs recorded.
    async fn evaluated_backend() -> (InMemoryBackend, Arc<CacheStore>, MetricsService) {
        let backend = InMemoryBackend::new()
            .with_judge(judge(1))
            .with_judge(judge(2))
            .with_trace(trace("t1", "pass"))
            .with_trace(trace("t2", "fail"))
            .with_trace(trace("t3", "pass"))
            .with_labeling_session(
                "j1",
                LabelingSession {
                    trace_ids: vec!["t1".into(), "t2".into(), "t3".into()],
                    labeled_examples: None,
                },
            )
            .with_verdict(V1, "t1", "pass")
            .with_verdict(V1, "t2", "pass")
            .with_verdict(V1, "t3", "fail")
            .with_verdict(V2, "t1", "Pass")
            .with_verdict(V2, "t2", "fail")
            .with_verdict(V2, "t3", "pass");

        let providers = backend.providers();
        let cache = Arc::new(CacheStore::new(
            &AlignerConfig::default(),
            providers.backend.clone(),
        ));
        let evaluation = EvaluationService::new(&providers, cache.clone());
        let ids = ["t1", "t2", "t3"];
        evaluation.evaluate(&judge(1), &ids).await.unwrap();
        evaluation.evaluate(&judge(2), &ids).await.unwrap();
        cache.invalidate_traces(&ids);

        let metrics = MetricsService::new(&providers, cache.clone());
        (backend, cache, metrics)
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let (_, _, service) = evaluated_backend().await;
        let result = service.compare_versions("j1").await.unwrap();

        assert_eq!(result.comparisons.len(), 3);
        let metrics = &result.metrics;
        assert_eq!(metrics.total_samples, 3);
        assert_eq!(metrics.previous_agreement_count, 1);
        assert_eq!(metrics.new_agreement_count, 3);
        assert_eq!(
            metrics.confusion_matrix_previous,
            ConfusionMatrix {
                true_positive: 1,
                false_negative: 1,
                false_positive: 1,
                true_negative: 0,
            }
        );
        assert_eq!(metrics.confusion_matrix_new.true_positive, 2);
        assert_eq!(metrics.confusion_matrix_new.true_negative, 1);

        let first = &result.comparisons[0];
        assert_eq!(first.trace_id, "t1");
        assert_eq!(first.request, "qt1");
        assert_eq!(first.new_judge_feedback.value, "Pass");
    }

    #[tokio::test]
    async fn test_errored_rows_are_skipped() {
        let (backend, cache, service) = evaluated_backend().await;
        backend.attach_assessment(
            "t2",
            Assessment::error(V2, AssessmentSource::LlmJudge, "TIMEOUT", "judge timed out"),
        );
        cache.invalidate_trace("t2");

        let result = service.compare_versions("j1").await.unwrap();
        assert_eq!(result.metrics.total_samples, 2);
        assert!(result.comparisons.iter().all(|c| c.trace_id != "t2"));
    }

    #[tokio::test]
    async fn test_no_usable_rows_is_not_found() {
        let (backend, cache, service) = evaluated_backend().await;
        for id in ["t1", "t2", "t3"] {
            backend.attach_assessment(
                id,
                Assessment::error(V1, AssessmentSource::LlmJudge, "PARSE", "bad output"),
            );
            cache.invalidate_trace(id);
        }

        let err = service.compare_versions("j1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_requires_second_version() {
        let backend = InMemoryBackend::new().with_judge(judge(1));
        let providers = backend.providers();
        let cache = Arc::new(CacheStore::new(
            &AlignerConfig::default(),
            providers.backend.clone(),
        ));
        let service = MetricsService::new(&providers, cache);

        let err = service.compare_versions("j1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_runs_is_not_found() {
        let backend = InMemoryBackend::new()
            .with_judge(judge(1))
            .with_judge(judge(2))
            .with_trace(trace("t1", "pass"))
            .with_labeling_session(
                "j1",
                LabelingSession {
                    trace_ids: vec!["t1".into()],
                    labeled_examples: None,
                },
            );
        let providers = backend.providers();
        let cache = Arc::new(CacheStore::new(
            &AlignerConfig::default(),
            providers.backend.clone(),
        ));
        let service = MetricsService::new(&providers, cache);

        let err = service.compare_versions("j1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("run alignment first"));
        assert_eq!(backend.evaluations(), 0);
    }
}
