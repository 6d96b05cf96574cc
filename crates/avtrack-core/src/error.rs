//! Error types for avtrack-core

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AvTrackError>;

/// Workflow stage an error is attributed to when reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Probe,
    Extract,
    Enhance,
    Convert,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Upload => write!(f, "upload"),
            Stage::Probe => write!(f, "probe"),
            Stage::Extract => write!(f, "extract"),
            Stage::Enhance => write!(f, "enhance"),
            Stage::Convert => write!(f, "convert"),
            Stage::Deliver => write!(f, "deliver"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AvTrackError {
    #[error("Unsupported video file: {0} (expected mp4, mov, avi, mkv or webm)")]
    UnsupportedUpload(String),

    #[error("No audio tracks found in the video file.")]
    NoAudioTracks,

    #[error("Track {requested} does not exist ({available} audio tracks available)")]
    TrackOutOfRange { requested: usize, available: usize },

    #[error("Error analyzing video: {0}")]
    Probe(#[from] ProbeError),

    #[error("Error extracting audio: {0}")]
    Extract(#[from] ExtractError),

    #[error("Error enhancing audio: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("Error converting audio: {0}")]
    Convert(#[from] ConvertError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error during {stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

impl AvTrackError {
    /// Wrap an IO failure with the stage it happened in, for `map_err`
    pub fn io(stage: Stage) -> impl FnOnce(std::io::Error) -> Self {
        move |source| AvTrackError::Io { stage, source }
    }

    /// Stage this error is reported against.
    pub fn stage(&self) -> Stage {
        match self {
            AvTrackError::UnsupportedUpload(_) | AvTrackError::Config(_) => Stage::Upload,
            AvTrackError::NoAudioTracks | AvTrackError::Probe(_) => Stage::Probe,
            AvTrackError::TrackOutOfRange { .. } | AvTrackError::Extract(_) => Stage::Extract,
            AvTrackError::Enhance(_) => Stage::Enhance,
            AvTrackError::Convert(_) => Stage::Convert,
            AvTrackError::Io { stage, .. } => *stage,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("ffprobe failed with exit code {code:?}: {stderr}")]
    FfprobeFailed { code: Option<i32>, stderr: String },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Carries the raw ffmpeg stderr so it can be shown verbatim.
    #[error("{stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { bits: u16, format: &'static str },

    #[error("Enhancement task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("ffmpeg encoding failed with exit code {code:?}: {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_failure_shows_stderr_verbatim() {
        let err = AvTrackError::from(ExtractError::FfmpegFailed {
            code: Some(1),
            stderr: "Stream map '0:a:3' matches no streams.".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Error extracting audio: Stream map '0:a:3' matches no streams."
        );
        assert_eq!(err.stage(), Stage::Extract);
    }

    #[test]
    fn io_errors_keep_their_stage() {
        let missing = || std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        for stage in [Stage::Upload, Stage::Extract, Stage::Convert, Stage::Deliver] {
            let err = AvTrackError::io(stage)(missing());
            assert_eq!(err.stage(), stage);
            assert_eq!(err.to_string(), format!("IO error during {}: gone", stage));
        }
    }

    #[test]
    fn no_audio_tracks_is_a_probe_stage_error() {
        assert_eq!(AvTrackError::NoAudioTracks.stage(), Stage::Probe);
    }
}
