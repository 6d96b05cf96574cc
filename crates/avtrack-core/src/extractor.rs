//! Audio track demuxing using FFmpeg

use crate::error::ExtractError;
use crate::probe::AudioStreamDescriptor;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Sample rate of the intermediate WAV
pub const EXTRACT_SAMPLE_RATE: u32 = 44_100;

/// Which input stream ffmpeg should map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    /// Absolute container stream index (`0:<index>`)
    Container(u32),
    /// Nth audio stream of the input (`0:a:<n>`)
    AudioOrdinal(usize),
}

impl StreamSelector {
    /// Prefer the container index ffprobe reported; the audio ordinal only
    /// matches it when no streams were skipped.
    pub fn for_track(track: &AudioStreamDescriptor) -> Self {
        match track.index {
            Some(index) => StreamSelector::Container(index),
            None => {
                warn!(
                    "Track {} has no container index, selecting by audio position",
                    track.ordinal
                );
                StreamSelector::AudioOrdinal(track.ordinal)
            }
        }
    }
}

impl fmt::Display for StreamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSelector::Container(index) => write!(f, "0:{}", index),
            StreamSelector::AudioOrdinal(n) => write!(f, "0:a:{}", n),
        }
    }
}

#[derive(Debug)]
pub struct Extractor {
    ffmpeg_path: PathBuf,
}

impl Extractor {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    fn command(&self, video: &Path, selector: StreamSelector, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd.arg("-i").arg(video);
        cmd.arg("-map").arg(selector.to_string());
        // Audio only, 16-bit PCM at 44.1kHz
        cmd.arg("-vn");
        cmd.args(["-acodec", "pcm_s16le"]);
        cmd.arg("-ar").arg(EXTRACT_SAMPLE_RATE.to_string());
        cmd.arg("-y").arg(output);
        cmd
    }

    /// Demux one audio stream to a PCM WAV file
    pub async fn extract(
        &self,
        video: &Path,
        selector: StreamSelector,
        output: &Path,
    ) -> Result<(), ExtractError> {
        info!("Extracting stream {} from {}", selector, video.display());

        let result = self.command(video, selector, output).output().await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            debug!("ffmpeg stderr: {}", stderr);
            return Err(ExtractError::FfmpegFailed {
                code: result.status.code(),
                stderr,
            });
        }

        debug!("Extracted to: {}", output.display());
        Ok(())
    }
}
