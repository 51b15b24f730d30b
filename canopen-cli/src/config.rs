use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub can_interface: String,
    pub node_id: u8,
    /// SDO response timeout
    pub timeout_ms: u64,
    /// TOML object dictionary of the remote node, enables typed values.
    pub dictionary: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            can_interface: "vcan0".to_string(),
            node_id: 4,
            timeout_ms: 300,
            dictionary: None,
        }
    }
}

impl CliConfig {
    /// Get the path to the config file
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "canopen", "canopen-sdo")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from file, returns default if file doesn't exist or on error
    pub fn load(path: Option<&Path>) -> Self {
        let Some(config_path) = path.map(Path::to_path_buf).or_else(Self::config_file_path) else {
            return Self::default();
        };
        if !config_path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?}: {}", config_path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path` (or the default location)
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(Self::config_file_path)
            .context("could not determine config file path")?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {:?}", parent))?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(&config_path, toml_string)
            .with_context(|| format!("failed to write config file {:?}", config_path))?;
        info!("Saved configuration to {:?}", config_path);
        Ok(config_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("canopen-sdo-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        let config = CliConfig {
            can_interface: "can0".into(),
            node_id: 12,
            timeout_ms: 1000,
            dictionary: Some(PathBuf::from("od.toml")),
        };

        assert_eq!(config.save(Some(&path)).unwrap(), path);
        assert_eq!(CliConfig::load(Some(&path)), config);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("canopen-sdo-invalid-{}.toml", std::process::id()));
        fs::write(&path, "node_id = \"four\"").unwrap();
        assert_eq!(CliConfig::load(Some(&path)), CliConfig::default());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn partial_file() {
        let config: CliConfig = toml::from_str("timeout_ms = 50").unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(50));
        assert_eq!(config.node_id, 4);
    }
}
