//! Audio stream discovery using ffprobe

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Placeholder for any field ffprobe did not report.
pub const UNKNOWN: &str = "unknown";

/// One audio stream found in a video container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioStreamDescriptor {
    /// Position in the listed tracks (zero based)
    pub ordinal: usize,
    /// Container stream index as reported by ffprobe
    pub index: Option<u32>,
    pub codec: String,
    pub sample_rate: String,
    pub channels: String,
    pub duration: String,
    pub bit_rate: String,
    pub language: String,
    pub title: String,
}

impl AudioStreamDescriptor {
    pub fn has_language(&self) -> bool {
        self.language != UNKNOWN
    }

    pub fn has_title(&self) -> bool {
        self.title != UNKNOWN
    }

    /// Human readable entry for track selection
    pub fn label(&self) -> String {
        let mut label = format!("Track {}", self.ordinal);
        if self.has_language() {
            label.push_str(&format!(" - Language: {}", self.language));
        }
        if self.has_title() {
            label.push_str(&format!(" - Title: {}", self.title));
        }
        label.push_str(&format!(
            " - Channels: {}, Codec: {}",
            self.channels, self.codec
        ));
        label
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: Option<u32>,
    #[serde(default)]
    codec_name: Option<Value>,
    #[serde(default)]
    sample_rate: Option<Value>,
    #[serde(default)]
    channels: Option<Value>,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default)]
    bit_rate: Option<Value>,
    #[serde(default)]
    tags: Option<HashMap<String, Value>>,
}

impl ProbeStream {
    fn into_descriptor(self, ordinal: usize) -> AudioStreamDescriptor {
        let tag = |key: &str| {
            self.tags
                .as_ref()
                .and_then(|tags| tags.get(key))
                .map_or_else(|| UNKNOWN.to_string(), render)
        };

        AudioStreamDescriptor {
            ordinal,
            index: self.index,
            codec: render_opt(&self.codec_name),
            sample_rate: render_opt(&self.sample_rate),
            channels: render_opt(&self.channels),
            duration: render_opt(&self.duration),
            bit_rate: render_opt(&self.bit_rate),
            language: tag("language"),
            title: tag("title"),
        }
    }
}

fn render_opt(value: &Option<Value>) -> String {
    value.as_ref().map_or_else(|| UNKNOWN.to_string(), render)
}

fn render(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.is_empty() {
        UNKNOWN.to_string()
    } else {
        text
    }
}

/// Parse `ffprobe -print_format json -show_streams` output.
pub fn parse_streams(json: &str) -> Result<Vec<AudioStreamDescriptor>, ProbeError> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    Ok(output
        .streams
        .into_iter()
        .enumerate()
        .map(|(ordinal, stream)| stream.into_descriptor(ordinal))
        .collect())
}

#[derive(Debug)]
pub struct Prober {
    ffprobe_path: PathBuf,
}

impl Prober {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// List audio streams in container order
    pub async fn probe(&self, video: &Path) -> Result<Vec<AudioStreamDescriptor>, ProbeError> {
        info!("Analyzing audio tracks in {}", video.display());

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "a",
            ])
            .arg(video)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::FfprobeFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let streams = parse_streams(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Found {} audio stream(s)", streams.len());
        Ok(streams)
    }
}
