use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "avtrack")]
#[command(author, version, about = "Extract a chosen audio track from a video file")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Video file to process (shorthand for `extract <VIDEO>`)
    #[arg(value_name = "VIDEO")]
    pub video: Option<PathBuf>,

    #[command(flatten)]
    pub options: ExtractOptions,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one audio track from a video
    Extract {
        /// Video file (mp4, mov, avi, mkv, webm)
        video: PathBuf,

        #[command(flatten)]
        options: ExtractOptions,
    },

    /// List the audio tracks of a video
    Probe {
        /// Video file
        video: PathBuf,

        /// Print tracks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are installed
    Doctor,

    /// Show configuration
    Config,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct ExtractOptions {
    /// Audio track to extract (as listed by `probe`); prompts when omitted
    #[arg(short, long)]
    pub track: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Apply pre-emphasis and peak normalization
    #[arg(short, long, conflicts_with = "no_enhance")]
    pub enhance: bool,

    /// Skip enhancement
    #[arg(long)]
    pub no_enhance: bool,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExtractOptions {
    /// Explicit enhancement choice, if any flag was given
    pub fn enhance_override(&self) -> Option<bool> {
        match (self.enhance, self.no_enhance) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// MP3 - Lossy, widely compatible
    Mp3,
    /// WAV - Uncompressed PCM
    Wav,
    /// OGG - Lossy, open format
    Ogg,
}
