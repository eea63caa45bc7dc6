//! State and config files.

use std::path::Path;

use aligner_core::providers::memory::MemoryState;
use aligner_core::AlignerConfig;
use anyhow::{Context, Result};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

pub fn load_state(path: &Path) -> Result<MemoryState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state = if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid YAML state in {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON state in {}", path.display()))?
    };
    Ok(state)
}

pub fn save_state(path: &Path, state: &MemoryState) -> Result<()> {
    let content = if is_yaml(path) {
        serde_yaml::to_string(state)?
    } else {
        serde_json::to_string_pretty(state)?
    };
    std::fs::write(path, content)
        .with_context(|| format!("failed to write state file {}", path.display()))?;
    Ok(())
}

/// Config from a YAML file, or from `ALIGNER_*` variables when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<AlignerConfig> {
    let Some(path) = path else {
        return Ok(AlignerConfig::from_env());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("invalid config in {}", path.display()))
}
