use anyhow::Result;
use std::path::PathBuf;
use std::process::Command;

use avtrack_core::config::Config;

pub async fn run() -> Result<()> {
    println!("avtrack dependency check\n");

    let config = Config::load(None).unwrap_or_default();

    let ffmpeg_ok = check_tool("ffmpeg:  ", config.ffmpeg_path().ok(), "ffmpeg");
    let ffprobe_ok = check_tool("ffprobe: ", config.ffprobe_path().ok(), "ffmpeg");

    println!();
    if ffmpeg_ok && ffprobe_ok {
        println!("All dependencies OK!");
    } else {
        println!("Some dependencies are missing. See above for installation instructions.");
    }

    Ok(())
}

fn check_tool(label: &str, path: Option<PathBuf>, package: &str) -> bool {
    print!("{}", label);

    let Some(path) = path else {
        println!("NOT FOUND");
        println!("         Install with: brew install {} (or your package manager)", package);
        return false;
    };

    match Command::new(&path).arg("-version").output() {
        Ok(out) if out.status.success() => {
            // First line looks like "ffmpeg version 6.1.1 Copyright ..."
            let stdout = String::from_utf8_lossy(&out.stdout);
            let version = stdout
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(2))
                .unwrap_or("unknown");
            println!("OK ({}, {})", version, path.display());
            true
        }
        _ => {
            println!("FOUND at {} but failed to get version", path.display());
            false
        }
    }
}
