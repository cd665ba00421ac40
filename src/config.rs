//! Config file discovery and loading for the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rc_core::config::Config;

/// Locations tried, in order, when no `--config` is given.
const DEFAULT_PATHS: &[&str] = &[
    "./reelcast.toml",
    "~/.config/reelcast/config.toml",
    "/etc/reelcast/config.toml",
];

/// Read `path`, then apply environment overrides. Warnings are logged, not
/// returned.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.apply_env();

    config
        .validate()
        .iter()
        .for_each(|warning| tracing::warn!(path = %path.display(), "{warning}"));
    Ok(config)
}

/// An explicit path must load. Without one, the first existing default
/// location is used, and failing that the built-in defaults.
pub fn load_config_or_default(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    let found = DEFAULT_PATHS
        .iter()
        .map(|candidate| PathBuf::from(shellexpand::tilde(candidate).into_owned()))
        .find(|candidate| candidate.is_file());
    match found {
        Some(path) => {
            tracing::debug!("using config file {}", path.display());
            load_config(&path)
        }
        None => {
            let mut config = Config::default();
            config.apply_env();
            Ok(config)
        }
    }
}
