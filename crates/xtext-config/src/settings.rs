//! TOML settings file.
//!
//! Settings cover the knobs that are per-installation rather than
//! per-collection: buffer thresholds, result limits, and the stemming
//! language of the default analyzer. The collection-level rule document is
//! handled separately by [`crate::IndexConfiguration`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the settings file.
pub const SETTINGS_FILENAME: &str = ".xtext.toml";

/// Top-level settings for xtext.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// General settings.
    pub settings: GeneralSettings,
    /// Search-related settings.
    pub search: SearchSettings,
}

/// General settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Buffered text threshold in bytes before an eager flush runs.
    pub buffer_limit: usize,
    /// Maximum number of matches retrieved per query.
    pub default_limit: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            buffer_limit: 4 * 1024 * 1024,
            default_limit: 10_000,
        }
    }
}

/// Search-related settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Stemming language for the default analyzer.
    pub stemmer: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            stemmer: String::from("english"),
        }
    }
}

impl Settings {
    /// Loads settings from a file, or returns defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serializes the effective settings to TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).expect("settings serialization should not fail")
    }

    /// Path of the per-user settings file, if a home directory exists.
    pub fn global_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(SETTINGS_FILENAME))
    }
}
