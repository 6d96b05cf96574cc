use anyhow::Result;
use std::path::Path;

use avtrack_core::{config::Config, probe::Prober};

pub async fn run(video: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let prober = Prober::new(config.ffprobe_path()?);

    let tracks = match prober.probe(video).await {
        Ok(tracks) => tracks,
        Err(e) => {
            eprintln!("Error analyzing video: {}", e);
            Vec::new()
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
        return Ok(());
    }

    if tracks.is_empty() {
        println!("No audio tracks found in the video file.");
        return Ok(());
    }

    println!("Available Audio Tracks\n");
    for track in &tracks {
        println!("  {}", track.label());
        println!(
            "      sample rate: {}, duration: {}, bit rate: {}",
            track.sample_rate, track.duration, track.bit_rate
        );
    }

    Ok(())
}
