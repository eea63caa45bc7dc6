//! Judge versioning, evaluation caching and alignment.
//!
//! The crate drives an alignment workflow for automated judges:
//!
//! - [`fingerprint`] gives a stable identity to a set of trace ids
//! - [`cache::CacheStore`] keeps fetched traces and evaluation run ids
//! - [`evaluation::EvaluationService`] reuses or creates evaluation runs
//! - [`alignment::AlignmentService`] runs evaluate → optimize → version → re-evaluate
//! - [`metrics::MetricsService`] compares two judge versions against human labels
//!
//! Remote systems (judge registry, trace backend, evaluator, labeling, optimizer)
//! are reached through the traits in [`providers`]; [`providers::memory`] holds
//! in-process implementations.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `ALIGNER_TRACE_CACHE_CAPACITY` | Max cached traces (default: 1000) |
//! | `ALIGNER_TRACE_CACHE_TTL_SECS` | Trace TTL in seconds (default: 1800) |
//! | `ALIGNER_EVAL_CACHE_CAPACITY` | Max cached evaluation runs (default: 500) |
//! | `ALIGNER_EVAL_CACHE_TTL_SECS` | Evaluation run TTL in seconds (default: 3600) |
//! | `ALIGNER_MIN_EXAMPLES` | Labeled examples required before optimizing (default: 10) |

pub mod alignment;
pub mod cache;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod fingerprint;
pub mod metrics;
pub mod model;
pub mod naming;
pub mod providers;

pub use alignment::{AlignmentService, AlignmentState};
pub use cache::{CacheStats, CacheStore};
pub use config::AlignerConfig;
pub use error::{AlignError, AlignResult, ErrorKind};
pub use evaluation::EvaluationService;
pub use fingerprint::{fingerprint, DatasetFingerprint};
pub use metrics::{ConfusionMatrix, MetricsService};
pub use providers::Providers;
