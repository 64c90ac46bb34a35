use crate::core::fingerprint::{DEFAULT_HASH_SIZE, MAX_HASH_SIZE, MIN_HASH_SIZE};
use crate::core::sampler::DEFAULT_INTERVAL;
use crate::database::DEFAULT_DATABASE_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub frames_dir: PathBuf,
    pub database_path: PathBuf,
    pub interval: u64,
    pub hash_size: u32,
    pub persist_frames: bool,
    pub parallel_hashing: bool,
    pub video_extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            interval: DEFAULT_INTERVAL,
            hash_size: DEFAULT_HASH_SIZE,
            persist_frames: true,
            parallel_hashing: true,
            video_extensions: vec![
                "mp4".to_string(),
                "mov".to_string(),
                "avi".to_string(),
                "mkv".to_string(),
                "webm".to_string(),
                "m4v".to_string(),
            ],
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                log::debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::Invalid("interval must be at least 1".to_string()));
        }
        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&self.hash_size) {
            return Err(ConfigError::Invalid(format!(
                "hash_size must be between {} and {}, got {}",
                MIN_HASH_SIZE, MAX_HASH_SIZE, self.hash_size
            )));
        }
        Ok(())
    }

    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.video_extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

/// `<config dir>/frameprint/config.json`, e.g. `~/.config/frameprint/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("frameprint").join("config.json"))
}
