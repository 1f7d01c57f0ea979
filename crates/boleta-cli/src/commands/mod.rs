//! CLI subcommands.

pub mod config;
pub mod reconcile;
pub mod scan;

use std::path::{Path, PathBuf};

use boleta_core::models::config::BoletaConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boleta")
        .join("config.json")
}

/// Resolve the configuration file: `--config` if given, the default path otherwise.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration, falling back to defaults when no file exists.
///
/// An explicit path that does not exist is an error.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<BoletaConfig> {
    let path = config_path(explicit);

    if path.exists() {
        return BoletaConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e));
    }
    if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    Ok(BoletaConfig::default())
}

/// Read an operator transcript, rejecting empty files.
pub fn read_transcript(path: &Path) -> anyhow::Result<String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    if text.trim().is_empty() {
        anyhow::bail!("Transcript {} is empty", path.display());
    }
    Ok(text)
}
