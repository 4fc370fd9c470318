//! Configuration loading and saving utilities.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::schema::Config;

/// Get the presto data directory (`~/.presto`).
pub fn get_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".presto")
}

/// Get the default configuration file path (`~/.presto/config.json`).
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Load configuration from a file, or return a default [`Config`] if the file
/// does not exist or cannot be parsed.
///
/// If `config_path` is `None`, the default path (`~/.presto/config.json`) is
/// used.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path(),
    };

    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        "Failed to parse config from {}: {}. Using default configuration.",
                        path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read config from {}: {}. Using default configuration.",
                    path.display(),
                    e
                );
            }
        }
    }

    Config::default()
}

/// Save configuration to a JSON file.
///
/// If `config_path` is `None`, the default path is used. Parent directories
/// are created if they don't exist.
pub fn save_config(config: &Config, config_path: Option<&Path>) {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path(),
    };

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match serde_json::to_string_pretty(config) {
        Ok(json) => {
            if let Err(e) = fs::write(&path, json) {
                warn!("Failed to write config to {}: {}", path.display(), e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize config: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = load_config(Some(Path::new("/nonexistent/presto/config.json")));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.server.port = 9100;
        config.llm.api_key = "sk-test".to_string();
        save_config(&config, Some(&path));

        let loaded = load_config(Some(&path));
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(loaded.llm.api_key, "sk-test");
    }

    #[test]
    fn test_load_invalid_json_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.llm.model, "gpt-5-mini");
    }
}
