//! Output format conversion using FFmpeg

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Mp3, OutputFormat::Wav, OutputFormat::Ogg];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::Ogg => "ogg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mp3",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Ogg => "audio/ogg",
        }
    }

    /// Whether `path` is already in this format
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension()))
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            "ogg" => Ok(OutputFormat::Ogg),
            other => Err(format!("unsupported output format: {}", other)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Mp3 => write!(f, "MP3"),
            OutputFormat::Wav => write!(f, "WAV"),
            OutputFormat::Ogg => write!(f, "OGG"),
        }
    }
}

#[derive(Debug)]
pub struct Converter {
    ffmpeg_path: PathBuf,
}

impl Converter {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    fn command(&self, input: &Path, output: &Path, format: OutputFormat) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd.arg("-i").arg(input);
        // Container default encoder and settings
        cmd.args(["-vn", "-f", format.extension()]);
        cmd.arg("-y").arg(output);
        cmd
    }

    /// Re-encode audio to the target format
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
    ) -> Result<(), ConvertError> {
        info!("Converting to {} format", format);

        let result = self.command(input, output, format).output().await?;

        if !result.status.success() {
            return Err(ConvertError::FfmpegFailed {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        debug!("Converted to: {}", output.display());
        Ok(())
    }
}
