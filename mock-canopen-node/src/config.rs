use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub can_interface: String,
    pub node_id: u8,
    /// Idle time after which a pending segmented transfer is aborted.
    pub sdo_timeout_ms: u64,
    /// TOML object dictionary to serve instead of the built-in one.
    pub dictionary: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            can_interface: "vcan0".to_string(),
            node_id: 4,
            sdo_timeout_ms: 1000,
            dictionary: None,
        }
    }
}

impl NodeConfig {
    /// Get the path to the config file
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "canopen", "mock-canopen-node")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), falling back
    /// to defaults if the file is missing or invalid.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = match path.map(Path::to_path_buf).or_else(Self::config_file_path) {
            Some(config_path) if config_path.exists() => config_path,
            _ => {
                info!("Using default configuration");
                return Self::default();
            }
        };

        match fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
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

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn sdo_timeout(&self) -> Duration {
        Duration::from_millis(self.sdo_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = NodeConfig::parse("node_id = 9\n").unwrap();
        assert_eq!(config.node_id, 9);
        assert_eq!(config.can_interface, "vcan0");
        assert_eq!(config.sdo_timeout(), Duration::from_secs(1));
        assert_eq!(config.dictionary, None);
    }

    #[test]
    fn full_file() {
        let config = NodeConfig::parse(
            r#"
can_interface = "can1"
node_id = 12
sdo_timeout_ms = 250
dictionary = "/etc/mock-node/od.toml"
"#,
        )
        .unwrap();
        assert_eq!(config.can_interface, "can1");
        assert_eq!(config.sdo_timeout(), Duration::from_millis(250));
        assert_eq!(config.dictionary, Some(PathBuf::from("/etc/mock-node/od.toml")));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let config = NodeConfig::load(Some(Path::new("/nonexistent/mock-node.toml")));
        assert_eq!(config, NodeConfig::default());
    }
}
