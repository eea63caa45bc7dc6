mod judge;
pub mod state;

use std::sync::Arc;

use aligner_core::providers::memory::InMemoryBackend;
use aligner_core::{
    fingerprint, AlignError, AlignerConfig, AlignmentService, CacheStore, ErrorKind,
    EvaluationService, MetricsService,
};
use anyhow::Result;
use tracing::debug;

use super::args::{Cli, Command};
use crate::exit_codes::{
    BACKEND_ERROR, CLIENT_ERROR, CONFIG_ERROR, OPTIMIZATION_FAILED, SUCCESS,
};

/// Services wired over one in-memory backend loaded from the state file.
pub struct Context {
    pub backend: InMemoryBackend,
    pub cache: Arc<CacheStore>,
    pub evaluation: Arc<EvaluationService>,
    pub alignment: Arc<AlignmentService>,
    pub metrics: MetricsService,
}

impl Context {
    pub fn new(config: &AlignerConfig, backend: InMemoryBackend) -> Self {
        let providers = backend.providers();
        let cache = Arc::new(CacheStore::new(config, providers.backend.clone()));
        let evaluation = Arc::new(EvaluationService::new(&providers, cache.clone()));
        let alignment = Arc::new(AlignmentService::new(
            config,
            &providers,
            cache.clone(),
            evaluation.clone(),
        ));
        let metrics = MetricsService::new(&providers, cache.clone());
        Self {
            backend,
            cache,
            evaluation,
            alignment,
            metrics,
        }
    }
}

/// Print a core error and map it to the process exit code.
pub(crate) fn report(err: &AlignError) -> i32 {
    eprintln!("error: {err}");
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::InsufficientData => {
            CLIENT_ERROR
        }
        ErrorKind::Config => CONFIG_ERROR,
        ErrorKind::OptimizationFailed => OPTIMIZATION_FAILED,
        ErrorKind::Backend => BACKEND_ERROR,
    }
}

pub async fn dispatch(cli: Cli) -> Result<i32> {
    if let Command::Fingerprint(args) = &cli.cmd {
        println!("{}", fingerprint(&args.trace_ids));
        return Ok(SUCCESS);
    }

    let config = state::load_config(cli.config.as_deref())?;
    let backend = InMemoryBackend::from_state(state::load_state(&cli.state)?);
    let ctx = Context::new(&config, backend);

    let code = match cli.cmd {
        Command::Fingerprint(_) => SUCCESS,
        Command::Evaluate(args) => judge::evaluate(&ctx, args).await?,
        Command::Test(args) => judge::test(&ctx, args).await?,
        Command::Align(args) => judge::align(&ctx, args).await?,
        Command::Compare(args) => judge::compare(&ctx, args).await?,
        Command::Delete(args) => judge::delete(&ctx, args).await?,
    };

    debug!(stats = ?ctx.cache.stats(), "cache statistics");
    state::save_state(&cli.state, &ctx.backend.snapshot())?;
    Ok(code)
}
