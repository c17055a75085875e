use super::schema::{EnvOverrides, WaypointConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./waypoint.yaml
    /// 2. ~/.waypoint/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<WaypointConfig, ConfigError> {
        let local_config = PathBuf::from("./waypoint.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".waypoint").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(WaypointConfig::default())
    }

    /// The harness configuration for one run: `explicit` when given, otherwise the
    /// default locations, with the environment applied on top.
    pub async fn resolve(explicit: Option<&Path>) -> Result<WaypointConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path).await?,
            None => Self::load_default().await?,
        };
        let overrides = EnvOverrides::from_env();
        if overrides.ci {
            tracing::info!("CI detected: headless unless configured otherwise");
        }
        config.apply_overrides(&overrides);
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<WaypointConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: WaypointConfig = serde_yaml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
