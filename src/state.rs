use std::fs;
use std::path::{Path, PathBuf};

use crate::types::Config;

/// Environment override for the analytics service base URL.
pub const API_URL_ENV: &str = "OPSINTEL_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    NoHomeDir,
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write config: {0}")]
    Write(#[from] std::io::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Get the canonical config file path (~/.opsintel/config.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".opsintel").join("config.json"))
}

/// Load config from the canonical path, falling back to defaults when the
/// file does not exist. The `OPSINTEL_API_URL` override is applied last.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config, std::env::var(API_URL_ENV).ok());
    Ok(config)
}

/// Load config from an explicit path. A missing file yields `Config::default()`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write config as pretty JSON, creating the parent directory if needed.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

fn apply_env_overrides(config: &mut Config, api_url: Option<String>) {
    if let Some(url) = api_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        log::info!("Using analytics service from {}: {}", API_URL_ENV, url);
        config.api.base_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.api.base_url = "https://ops.example.org".to_string();
        config.api.request_timeout_secs = 5;
        config.top_hubs = 3;
        save_config_to(&path, &config).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api": {"baseUrl": "http://10.0.0.5:8000"}}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.api.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.api.api_prefix, "/api/v1");
        assert_eq!(config.forecast_periods, 3);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_override_ignores_blank_values() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, Some("   ".to_string()));
        assert_eq!(config.api.base_url, "http://localhost:8000");

        apply_env_overrides(&mut config, Some("https://backend.example.app".to_string()));
        assert_eq!(config.api.base_url, "https://backend.example.app");
    }
}
