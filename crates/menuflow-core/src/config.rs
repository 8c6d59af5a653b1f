//! Configuration management for menuflow.
//!
//! Loads configuration from ${MENUFLOW_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for menuflow configuration.
    //!
    //! MENUFLOW_HOME resolution order:
    //! 1. MENUFLOW_HOME environment variable (if set)
    //! 2. ~/.config/menuflow (default)

    use std::path::PathBuf;

    pub fn menuflow_home() -> PathBuf {
        if let Ok(home) = std::env::var("MENUFLOW_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".menuflow"),
            |home| home.join(".config").join("menuflow"),
        )
    }

    pub fn config_path() -> PathBuf {
        menuflow_home().join("config.toml")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub sequential_transitions: bool,
    pub overlay_transition_ms: u64,
    pub controller_transition_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            sequential_transitions: false,
            overlay_transition_ms: 250,
            controller_transition_ms: 200,
        }
    }
}

impl NavigationConfig {
    pub fn overlay_transition(&self) -> Duration {
        Duration::from_millis(self.overlay_transition_ms)
    }

    pub fn controller_transition(&self) -> Duration {
        Duration::from_millis(self.controller_transition_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub back_effect: String,
    pub click_effect: String,
    pub click_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            back_effect: crate::overlay::DEFAULT_BACK_EFFECT.to_string(),
            click_effect: crate::overlay::DEFAULT_CLICK_EFFECT.to_string(),
            click_volume: crate::overlay::DEFAULT_CLICK_VOLUME,
        }
    }
}

/// Well-known controller names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerNames {
    pub main_menu: String,
    pub gameplay: String,
}

impl Default for ControllerNames {
    fn default() -> Self {
        Self {
            main_menu: "Main Menu Controller".to_string(),
            gameplay: "Gameplay Menu Controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub target_framerate: u32,
    pub navigation: NavigationConfig,
    pub audio: AudioConfig,
    pub controllers: ControllerNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
            target_framerate: Self::DEFAULT_FRAMERATE,
            navigation: NavigationConfig::default(),
            audio: AudioConfig::default(),
            controllers: ControllerNames::default(),
        }
    }
}

impl Config {
    const DEFAULT_LOG_LEVEL: &str = "info";
    const DEFAULT_FRAMERATE: u32 = 120;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Duration of one tick of the driver loop.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.target_framerate.max(1)
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content).with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename {} to {}", tmp_path.display(), path.display()))?;

        Ok(())
    }
}
