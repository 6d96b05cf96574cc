//! Configuration management for avtrack

use crate::converter::OutputFormat;
use crate::error::ConfigError;
use crate::session::SessionConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub session: SessionDefaults,
    pub output: OutputConfig,
    pub temp: TempConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
    /// Path to ffprobe binary (auto-detected if not set)
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Apply pre-emphasis and peak normalization
    pub enhance: bool,
    /// Output format: "mp3", "wav" or "ogg"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where extracted tracks are written
    pub default_directory: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TempConfig {
    /// Custom temp directory (uses system temp if not set)
    pub directory: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            session: SessionDefaults {
                enhance: true,
                format: OutputFormat::Mp3.extension().to_string(),
            },
            output: OutputConfig {
                default_directory: PathBuf::from("."),
            },
            temp: TempConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        }

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        // AVTRACK_SESSION__FORMAT=ogg, AVTRACK_PATHS__FFMPEG=/opt/bin/ffmpeg
        figment = figment.merge(Env::prefixed("AVTRACK_").split("__"));

        figment.extract().map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Per-user config file location
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("avtrack/config.toml"))
    }

    /// Session settings derived from the `[session]` table
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let output_format = self.session.format.parse::<OutputFormat>().map_err(|_| {
            ConfigError::InvalidValue(format!(
                "session.format must be mp3, wav or ogg (got {:?})",
                self.session.format
            ))
        })?;

        Ok(SessionConfig {
            enhance_audio: self.session.enhance,
            output_format,
        })
    }

    /// Get FFmpeg path, auto-detecting if not configured
    pub fn ffmpeg_path(&self) -> Result<PathBuf, ConfigError> {
        match self.paths.ffmpeg {
            Some(ref path) => Ok(path.clone()),
            None => which::which("ffmpeg")
                .map_err(|_| ConfigError::InvalidValue("ffmpeg not found in PATH".to_string())),
        }
    }

    /// Get ffprobe path, auto-detecting if not configured
    pub fn ffprobe_path(&self) -> Result<PathBuf, ConfigError> {
        match self.paths.ffprobe {
            Some(ref path) => Ok(path.clone()),
            None => which::which("ffprobe")
                .map_err(|_| ConfigError::InvalidValue("ffprobe not found in PATH".to_string())),
        }
    }

    /// Get temp directory
    pub fn temp_dir(&self) -> PathBuf {
        self.temp.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enhance_to_mp3() {
        let session = Config::default().session_config().unwrap();
        assert!(session.enhance_audio);
        assert_eq!(session.output_format, OutputFormat::Mp3);
    }

    #[test]
    fn rejects_unknown_format() {
        let mut config = Config::default();
        config.session.format = "flac".to_string();
        assert!(matches!(
            config.session_config(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nenhance = false\nformat = \"OGG\"\n\n[paths]\nffprobe = \"/opt/ff/ffprobe\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let session = config.session_config().unwrap();
        assert!(!session.enhance_audio);
        assert_eq!(session.output_format, OutputFormat::Ogg);
        assert_eq!(
            config.ffprobe_path().unwrap(),
            PathBuf::from("/opt/ff/ffprobe")
        );
    }
}
