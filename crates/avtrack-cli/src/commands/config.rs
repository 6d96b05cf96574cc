use anyhow::Result;
use std::path::Path;

use avtrack_core::config::Config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("avtrack configuration\n");
    println!("{}", toml::to_string_pretty(&config)?);

    let resolve = |found: Result<std::path::PathBuf, _>| match found {
        Ok(p) => p.display().to_string(),
        Err(e) => format!("({})", e),
    };
    println!("Resolved tools:");
    println!("  ffmpeg  = {}", resolve(config.ffmpeg_path()));
    println!("  ffprobe = {}", resolve(config.ffprobe_path()));
    println!("  temp    = {}", config.temp_dir().display());

    // Show config file locations
    println!("\nConfig file locations (in priority order):");
    println!("  1. Environment variables (AVTRACK_*, nested keys joined with __)");
    if let Some(p) = config_path {
        println!("  2. {} (specified)", p.display());
    }
    if let Some(p) = Config::user_config_path() {
        println!("  3. {}", p.display());
    }

    Ok(())
}
