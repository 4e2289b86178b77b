use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capture::CaptureConfig;
use crate::detection::DetectionThresholds;
use crate::error::{ConfigError, StoreError};
use crate::rules::RuleConfig;
use crate::store::{FileBackend, KeyValueStore, PREFERENCES_KEY};

const APP_DIR: &str = "CricketLive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Camera device and requested stream geometry
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Per-class confidence thresholds
    #[serde(default)]
    pub detection: DetectionThresholds,

    /// Zones, distances and cooldown for the rule engine
    #[serde(default)]
    pub rules: RuleConfig,

    /// Where match data lives; platform data dir when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Frames the demo run pushes through the frame loop
    #[serde(default = "default_demo_frames")]
    pub demo_frames: u64,
}

fn default_demo_frames() -> u64 {
    180
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            detection: DetectionThresholds::default(),
            rules: RuleConfig::default(),
            data_dir: None,
            demo_frames: default_demo_frames(),
        }
    }
}

impl Config {
    /// Load configuration from the platform-specific config directory.
    /// Creates default config if file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            info!(path = %path.display(), "Created default config");
            return Ok(config);
        }

        let load_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source,
        };
        let content = fs::read_to_string(path).map_err(|e| load_failed(Box::new(e)))?;
        let config: Config = serde_json::from_str(&content).map_err(|e| load_failed(Box::new(e)))?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save configuration to the platform-specific config directory
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let save_failed = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_failed(Box::new(e)))?;
        Ok(())
    }

    /// `<config_dir>/CricketLive`
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn log_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join("logs"))
    }

    /// Directory handed to `FileBackend`
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(FileBackend::default_dir)
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.width == Some(0) || self.capture.height == Some(0) {
            return Err(ConfigError::Invalid(
                "capture width and height must be non-zero".to_string(),
            ));
        }
        if self.capture.frame_rate == Some(0) {
            return Err(ConfigError::Invalid(
                "capture frame_rate must be non-zero".to_string(),
            ));
        }
        self.detection.validate().map_err(ConfigError::Invalid)?;
        self.rules.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

/// User preferences, stored in the key-value store next to match data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub default_overs: u32,
    /// Zero disables autosave of the live snapshot
    pub autosave_interval_secs: u64,
    pub camera_detection: bool,
    pub confidence_threshold: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_overs: 20,
            autosave_interval_secs: 30,
            camera_detection: true,
            confidence_threshold: 0.6,
        }
    }
}

impl Preferences {
    pub fn autosave_enabled(&self) -> bool {
        self.autosave_interval_secs > 0
    }

    /// Stored preferences, defaults when none were saved yet
    pub fn load(kv: &KeyValueStore) -> Result<Self, StoreError> {
        Ok(kv.get(PREFERENCES_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, kv: &KeyValueStore) -> Result<(), StoreError> {
        self.validate().map_err(StoreError::Invalid)?;
        kv.set(PREFERENCES_KEY, self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_overs == 0 {
            return Err("default_overs must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold {} must be within 0.0-1.0",
                self.confidence_threshold
            ));
        }
        Ok(())
    }
}
