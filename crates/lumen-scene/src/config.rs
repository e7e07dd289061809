//! Scene configuration
//!
//! Read from TOML. Every field has a default, so a partial file is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SceneError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Threads backing the asynchronous loading strand
    pub worker_threads: usize,
    /// Initial state of the collision debug wireframe
    pub collision_debug: bool,
    /// Push every transform to the backend each frame, dirty or not
    pub force_recompute: bool,
    /// Base directory for relative asset paths
    pub asset_root: PathBuf,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            collision_debug: false,
            force_recompute: false,
            asset_root: PathBuf::from("."),
        }
    }
}

impl SceneConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, SceneError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| SceneError::ConfigIo(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded scene config from {:?}", path);
        Ok(config)
    }

    /// Resolve an asset path against `asset_root`. Absolute paths are kept.
    pub fn resolve_asset(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config = SceneConfig::from_toml_str("collision_debug = true\n").unwrap();
        assert!(config.collision_debug);
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.asset_root, PathBuf::from("."));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = SceneConfig {
            worker_threads: 3,
            collision_debug: false,
            force_recompute: true,
            asset_root: PathBuf::from("assets"),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(SceneConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(matches!(
            SceneConfig::from_toml_str("worker_threads = \"many\""),
            Err(SceneError::ConfigParse(_))
        ));
        assert!(matches!(
            SceneConfig::load("/nonexistent/lumen/scene.toml"),
            Err(SceneError::ConfigIo(..))
        ));
    }

    #[test]
    fn relative_assets_resolve_under_root() {
        let config = SceneConfig {
            asset_root: PathBuf::from("assets"),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_asset("sky.ktx"),
            PathBuf::from("assets").join("sky.ktx")
        );
    }
}
