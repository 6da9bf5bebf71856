//! Persisted user preferences.
//!
//! Stored as pretty-printed JSON under the platform configuration
//! directory. A missing file is not an error; defaults are used instead.

use crate::{EngineConfig, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name under the platform configuration directory.
pub const APP_DIR: &str = "textonic";

/// File name of the settings file.
pub const SETTINGS_FILE: &str = "settings.json";

/// Settings errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The platform has no configuration directory.
    #[error("could not determine configuration directory")]
    NoConfigDir,

    /// Reading or writing the settings file failed.
    #[error("settings I/O error at {path}: {source}")]
    Io {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`Settings`].
    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// User preferences carried between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// PNG resolution in dpi.
    pub resolution: u32,

    /// Outline fonts in EPS/PDF output.
    pub outline_fonts: bool,

    /// Format used when none is requested.
    pub format: OutputFormat,

    /// LaTeX executable.
    pub latex: PathBuf,

    /// Ghostscript executable.
    pub ghostscript: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            resolution: engine.resolution,
            outline_fonts: engine.outline_fonts,
            format: OutputFormat::default(),
            latex: engine.latex,
            ghostscript: engine.ghostscript,
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR).join(SETTINGS_FILE))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Loads settings from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads settings from the default location.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Writes settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }

    /// Writes settings to the default location.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::default_path()?)
    }

    /// Engine configuration reflecting these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            latex: self.latex.clone(),
            ghostscript: self.ghostscript.clone(),
            resolution: self.resolution,
            outline_fonts: self.outline_fonts,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.resolution, 300);
        assert!(settings.outline_fonts);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = Settings {
            resolution: 600,
            outline_fonts: false,
            format: OutputFormat::Pdf,
            latex: PathBuf::from("/opt/texlive/bin/pdflatex"),
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "resolution": 150, "format": "eps" }"#).unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.resolution, 150);
        assert_eq!(settings.format, OutputFormat::Eps);
        assert!(settings.outline_fonts);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "resolution = 300").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_engine_config_keeps_probe_resolution() {
        let settings = Settings {
            resolution: 72,
            ..Settings::default()
        };
        let config = settings.engine_config();
        assert_eq!(config.resolution, 72);
        assert_eq!(config.bbox_resolution, 1200);
    }
}
