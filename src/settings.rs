//! Host settings with persistence
//!
//! Settings are saved to `~/.config/lumen/settings.toml`

use std::fs;
use std::path::PathBuf;

use lumen_scene::SceneConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};

/// All host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Max tracing level: error, warn, info, debug or trace
    pub log_level: String,
    /// Frames to run before querying the scene
    pub frames: u32,
    pub scene: SceneConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frames: 3,
            scene: SceneConfig::default(),
        }
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lumen"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if not found.
    ///
    /// Runs before logging is set up, so problems are returned as notes for
    /// the caller to log once the subscriber exists.
    pub fn load() -> (Self, Vec<String>) {
        let Some(path) = Self::settings_path() else {
            return (
                Self::default(),
                vec!["Could not determine config directory".to_string()],
            );
        };

        if !path.exists() {
            return (
                Self::default(),
                vec![format!("No settings file at {:?}, using defaults", path)],
            );
        }

        match fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(settings) => (settings, vec![format!("Loaded settings from {:?}", path)]),
                Err(e) => (
                    Self::default(),
                    vec![format!("Failed to parse settings: {}, using defaults", e)],
                ),
            },
            Err(e) => (
                Self::default(),
                vec![format!("Failed to read settings file: {}, using defaults", e)],
            ),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(dir) = Self::config_dir() else {
            anyhow::bail!("Could not determine config directory");
        };

        let path = dir.join("settings.toml");

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// The configured tracing level, `INFO` if it does not parse.
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            frames = 10

            [scene]
            collision_debug = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.frames, 10);
        assert_eq!(settings.log_level, "info");
        assert!(settings.scene.collision_debug);
        assert_eq!(settings.scene.worker_threads, 1);
    }

    #[test]
    fn log_level_parsing() {
        let mut settings = Settings::default();
        assert_eq!(settings.level(), Level::INFO);
        settings.log_level = "debug".to_string();
        assert_eq!(settings.level(), Level::DEBUG);
        settings.log_level = "loud".to_string();
        assert_eq!(settings.level(), Level::INFO);
    }

    #[test]
    fn saved_form_parses_back() {
        let settings = Settings {
            log_level: "warn".to_string(),
            frames: 7,
            scene: SceneConfig::default(),
        };
        let content = toml::to_string_pretty(&settings).unwrap();
        assert_eq!(Settings::from_toml_str(&content).unwrap(), settings);
    }
}
