//! Trace and evaluation-run caches.
//!
//! Both caches are acceleration layers only: the trace backend stays the
//! source of truth, so every miss falls through to it and every backend
//! failure is logged and reported as a miss.

mod bounded;
pub mod key;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub use bounded::{BoundedCache, CacheStats};

use crate::config::AlignerConfig;
use crate::fingerprint::{fingerprint, DatasetFingerprint};
use crate::model::Trace;
use crate::providers::TraceBackend;

/// Statistics for both caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStoreStats {
    pub trace_cache: CacheStats,
    pub evaluation_cache: CacheStats,
}

/// Shared cache for traces and evaluation run ids.
pub struct CacheStore {
    traces: BoundedCache<Arc<Trace>>,
    evaluations: BoundedCache<String>,
    backend: Arc<dyn TraceBackend>,
}

impl CacheStore {
    pub fn new(config: &AlignerConfig, backend: Arc<dyn TraceBackend>) -> Self {
        Self {
            traces: BoundedCache::new(config.trace_cache_capacity, config.trace_cache_ttl()),
            evaluations: BoundedCache::new(config.eval_cache_capacity, config.eval_cache_ttl()),
            backend,
        }
    }

    /// Get a trace from cache or fetch it from the backend.
    ///
    /// Fetch failures and unknown ids yield `None`; callers skip the trace.
    pub async fn get_trace(&self, trace_id: &str) -> Option<Arc<Trace>> {
        if let Some(trace) = self.traces.get(trace_id) {
            debug!(trace_id, "trace cache hit");
            return Some(trace);
        }

        debug!(trace_id, "trace cache miss, fetching from backend");
        match self.backend.get_trace(trace_id).await {
            Ok(Some(trace)) => {
                let trace = Arc::new(trace);
                self.traces.put(trace_id, trace.clone());
                Some(trace)
            }
            Ok(None) => {
                warn!(trace_id, "trace not found on backend");
                None
            }
            Err(e) => {
                warn!(trace_id, error = %e, "failed to fetch trace");
                None
            }
        }
    }

    /// Resolve many traces, skipping the ones that cannot be fetched.
    pub async fn get_traces<S: AsRef<str>>(&self, trace_ids: &[S]) -> Vec<Arc<Trace>> {
        let mut traces = Vec::with_capacity(trace_ids.len());
        for trace_id in trace_ids {
            if let Some(trace) = self.get_trace(trace_id.as_ref()).await {
                traces.push(trace);
            }
        }
        traces
    }

    pub fn invalidate_trace(&self, trace_id: &str) {
        if self.traces.invalidate(trace_id) {
            debug!(trace_id, "invalidated trace cache entry");
        }
    }

    /// Invalidate every listed trace. Returns how many were cached.
    pub fn invalidate_traces<S: AsRef<str>>(&self, trace_ids: &[S]) -> usize {
        let invalidated = trace_ids
            .iter()
            .filter(|id| self.traces.invalidate(id.as_ref()))
            .count();
        info!(invalidated, requested = trace_ids.len(), "invalidated traces from cache");
        invalidated
    }

    /// Cached or remotely recorded evaluation run for a judge version and dataset.
    ///
    /// With `experiment_id`, a cache miss searches the backend for a run tagged
    /// with the same judge id, version and dataset fingerprint and writes a hit
    /// back into the cache.
    pub async fn get_evaluation_run_id<S: AsRef<str>>(
        &self,
        judge_id: &str,
        judge_version: u32,
        trace_ids: &[S],
        experiment_id: Option<&str>,
    ) -> Option<String> {
        let dataset = fingerprint(trace_ids);
        let cache_key = key::evaluation_key(judge_id, judge_version, &dataset);

        if let Some(run_id) = self.evaluations.get(&cache_key) {
            debug!(key = %cache_key, run_id = %run_id, "evaluation cache hit");
            return Some(run_id);
        }
        debug!(key = %cache_key, "evaluation cache miss");

        let experiment_id = experiment_id?;
        let run_id = self
            .find_evaluation_run(judge_id, judge_version, experiment_id, &dataset)
            .await?;
        debug!(run_id = %run_id, "found evaluation run on backend");
        Some(run_id)
    }

    /// Search the backend for a tagged evaluation run and cache it when found.
    pub async fn find_evaluation_run(
        &self,
        judge_id: &str,
        judge_version: u32,
        experiment_id: &str,
        dataset: &DatasetFingerprint,
    ) -> Option<String> {
        let tags = key::evaluation_tags(judge_id, judge_version, dataset);
        match self.backend.search_runs(experiment_id, &tags).await {
            Ok(runs) => {
                let run_id = runs.into_iter().next()?.run_id;
                self.evaluations.put(
                    key::evaluation_key(judge_id, judge_version, dataset),
                    run_id.clone(),
                );
                Some(run_id)
            }
            Err(e) => {
                error!(judge_id, judge_version, error = %e, "failed to find evaluation run");
                None
            }
        }
    }

    pub fn cache_evaluation_run_id<S: AsRef<str>>(
        &self,
        judge_id: &str,
        judge_version: u32,
        trace_ids: &[S],
        run_id: &str,
    ) {
        let dataset = fingerprint(trace_ids);
        let cache_key = key::evaluation_key(judge_id, judge_version, &dataset);
        self.evaluations.put(cache_key.clone(), run_id.to_string());
        debug!(key = %cache_key, run_id, "cached evaluation run");
    }

    /// Drop every cached evaluation run of a judge, across versions and datasets.
    pub fn invalidate_judge_evaluations(&self, judge_id: &str) -> usize {
        let prefix = key::judge_prefix(judge_id);
        let invalidated = self
            .evaluations
            .invalidate_all(|cache_key| cache_key.starts_with(&prefix));
        debug!(judge_id, invalidated, "invalidated evaluation cache for judge");
        invalidated
    }

    pub fn clear(&self) {
        self.traces.clear();
        self.evaluations.clear();
        info!("cleared trace and evaluation caches");
    }

    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            trace_cache: self.traces.stats(),
            evaluation_cache: self.evaluations.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Judge, Trace};
    use crate::providers::memory::InMemoryBackend;

    fn trace(id: &str) -> Trace {
        Trace {
            trace_id: id.into(),
            request: format!("request {id}"),
            response: format!("response {id}"),
            assessments: vec![],
        }
    }

    fn store(backend: &InMemoryBackend) -> CacheStore {
        CacheStore::new(&AlignerConfig::default(), Arc::new(backend.clone()))
    }

    #[tokio::test]
    async fn test_trace_miss_fetches_then_hits() {
        let backend = InMemoryBackend::new().with_trace(trace("t1"));
        let cache = store(&backend);

        assert!(cache.get_trace("t1").await.is_some());
        assert!(cache.get_trace("t1").await.is_some());
        assert_eq!(backend.trace_fetches("t1"), 1);

        let stats = cache.stats().trace_cache;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let backend = InMemoryBackend::new().with_trace(trace("t1"));
        let cache = store(&backend);

        cache.get_trace("t1").await;
        cache.invalidate_trace("t1");
        cache.get_trace("t1").await;
        assert_eq!(backend.trace_fetches("t1"), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_found() {
        let backend = InMemoryBackend::new()
            .with_trace(trace("t1"))
            .with_trace(trace("t2"));
        backend.fail_trace("t2");
        let cache = store(&backend);

        assert!(cache.get_trace("t2").await.is_none());
        assert!(cache.get_trace("missing").await.is_none());
        let traces = cache.get_traces(&["t1", "t2", "missing"]).await;
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].trace_id, "t1");
    }

    #[tokio::test]
    async fn test_bulk_invalidation_counts_cached_only() {
        let backend = InMemoryBackend::new()
            .with_trace(trace("t1"))
            .with_trace(trace("t2"));
        let cache = store(&backend);
        cache.get_traces(&["t1", "t2"]).await;

        assert_eq!(cache.invalidate_traces(&["t1", "t2", "t3"]), 2);
        assert_eq!(cache.stats().trace_cache.invalidations, 2);
    }

    #[tokio::test]
    async fn test_evaluation_run_cached_by_dataset_not_order() {
        let backend = InMemoryBackend::new();
        let cache = store(&backend);

        cache.cache_evaluation_run_id("j1", 1, &["b", "a"], "run-1");
        assert_eq!(
            cache.get_evaluation_run_id("j1", 1, &["a", "b"], None).await,
            Some("run-1".to_string())
        );
        assert_eq!(cache.get_evaluation_run_id("j1", 2, &["a", "b"], None).await, None);
        assert_eq!(cache.get_evaluation_run_id("j1", 1, &["a"], None).await, None);
    }

    #[tokio::test]
    async fn test_remote_fallback_writes_back() {
        let backend = InMemoryBackend::new();
        let dataset = fingerprint(["a", "b"]);
        let tags = key::evaluation_tags("j1", 1, &dataset);
        let run = backend.start_run("exp", "evaluation_x_v1", &tags).await.unwrap();
        let cache = store(&backend);

        assert_eq!(cache.get_evaluation_run_id("j1", 1, &["a", "b"], None).await, None);
        assert_eq!(
            cache
                .get_evaluation_run_id("j1", 1, &["a", "b"], Some("exp"))
                .await,
            Some(run.run_id.clone())
        );
        // Written back: found without the experiment id now.
        assert_eq!(
            cache.get_evaluation_run_id("j1", 1, &["a", "b"], None).await,
            Some(run.run_id)
        );
    }

    #[tokio::test]
    async fn test_search_failure_is_a_miss() {
        let backend = InMemoryBackend::new();
        backend.fail_search("backend unavailable");
        let cache = store(&backend);
        assert_eq!(
            cache.get_evaluation_run_id("j1", 1, &["a"], Some("exp")).await,
            None
        );
    }

    #[tokio::test]
    async fn test_prefix_invalidation_scoped_to_judge() {
        let backend = InMemoryBackend::new();
        let cache = store(&backend);
        cache.cache_evaluation_run_id("j1", 1, &["a"], "r1");
        cache.cache_evaluation_run_id("j1", 2, &["a"], "r2");
        cache.cache_evaluation_run_id("j10", 1, &["a"], "r3");

        assert_eq!(cache.invalidate_judge_evaluations("j1"), 2);
        assert_eq!(cache.stats().evaluation_cache.invalidations, 2);
        assert_eq!(cache.get_evaluation_run_id("j1", 1, &["a"], None).await, None);
        assert_eq!(cache.get_evaluation_run_id("j1", 2, &["a"], None).await, None);
        assert_eq!(
            cache.get_evaluation_run_id("j10", 1, &["a"], None).await,
            Some("r3".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let backend = InMemoryBackend::new()
            .with_judge(Judge {
                id: "j1".into(),
                name: "J".into(),
                instruction: "i".into(),
                experiment_id: "exp".into(),
                version: 1,
                labeling_run_id: None,
            })
            .with_trace(trace("t1"));
        let cache = store(&backend);
        cache.get_trace("t1").await;
        cache.cache_evaluation_run_id("j1", 1, &["t1"], "r1");

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.trace_cache.size, 0);
        assert_eq!(stats.evaluation_cache.size, 0);
    }
}
