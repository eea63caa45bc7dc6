//! Runtime configuration for caches and the alignment workflow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aligner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Maximum number of cached traces.
    #[serde(default = "default_trace_cache_capacity")]
    pub trace_cache_capacity: u64,

    /// Trace cache TTL in seconds.
    #[serde(default = "default_trace_cache_ttl_secs")]
    pub trace_cache_ttl_secs: u64,

    /// Maximum number of cached evaluation run ids.
    #[serde(default = "default_eval_cache_capacity")]
    pub eval_cache_capacity: u64,

    /// Evaluation run cache TTL in seconds.
    #[serde(default = "default_eval_cache_ttl_secs")]
    pub eval_cache_ttl_secs: u64,

    /// Labeled examples required before an optimization cycle is spent.
    #[serde(default = "default_min_examples")]
    pub min_examples: usize,
}

fn default_trace_cache_capacity() -> u64 {
    1000
}

fn default_trace_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_eval_cache_capacity() -> u64 {
    500
}

fn default_eval_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_min_examples() -> usize {
    10
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            trace_cache_capacity: default_trace_cache_capacity(),
            trace_cache_ttl_secs: default_trace_cache_ttl_secs(),
            eval_cache_capacity: default_eval_cache_capacity(),
            eval_cache_ttl_secs: default_eval_cache_ttl_secs(),
            min_examples: default_min_examples(),
        }
    }
}

impl AlignerConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `ALIGNER_TRACE_CACHE_CAPACITY` | Max cached traces |
    /// | `ALIGNER_TRACE_CACHE_TTL_SECS` | Trace TTL in seconds |
    /// | `ALIGNER_EVAL_CACHE_CAPACITY` | Max cached evaluation runs |
    /// | `ALIGNER_EVAL_CACHE_TTL_SECS` | Evaluation run TTL in seconds |
    /// | `ALIGNER_MIN_EXAMPLES` | Minimum labeled examples for alignment |
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            trace_cache_capacity: env_parse("ALIGNER_TRACE_CACHE_CAPACITY")
                .unwrap_or_else(default_trace_cache_capacity),
            trace_cache_ttl_secs: env_parse("ALIGNER_TRACE_CACHE_TTL_SECS")
                .unwrap_or_else(default_trace_cache_ttl_secs),
            eval_cache_capacity: env_parse("ALIGNER_EVAL_CACHE_CAPACITY")
                .unwrap_or_else(default_eval_cache_capacity),
            eval_cache_ttl_secs: env_parse("ALIGNER_EVAL_CACHE_TTL_SECS")
                .unwrap_or_else(default_eval_cache_ttl_secs),
            min_examples: env_parse("ALIGNER_MIN_EXAMPLES").unwrap_or_else(default_min_examples),
        }
    }

    /// Set the minimum labeled example count.
    pub fn with_min_examples(mut self, min_examples: usize) -> Self {
        self.min_examples = min_examples;
        self
    }

    pub fn trace_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.trace_cache_ttl_secs)
    }

    pub fn eval_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.eval_cache_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = AlignerConfig::default();
        assert_eq!(config.trace_cache_capacity, 1000);
        assert_eq!(config.trace_cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.eval_cache_capacity, 500);
        assert_eq!(config.eval_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.min_examples, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AlignerConfig = serde_json::from_str(r#"{"min_examples": 4}"#).unwrap();
        assert_eq!(config.min_examples, 4);
        assert_eq!(config.trace_cache_capacity, 1000);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides_and_ignores_garbage() {
        std::env::set_var("ALIGNER_MIN_EXAMPLES", "25");
        std::env::set_var("ALIGNER_EVAL_CACHE_CAPACITY", "not-a-number");
        let config = AlignerConfig::from_env();
        std::env::remove_var("ALIGNER_MIN_EXAMPLES");
        std::env::remove_var("ALIGNER_EVAL_CACHE_CAPACITY");

        assert_eq!(config.min_examples, 25);
        assert_eq!(config.eval_cache_capacity, 500);
    }
}
