use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::args::{ExtractOptions, OutputFormat as CliFormat};
use avtrack_core::{Config, OutputFormat, Session, SessionConfig, SessionEvent, ToolPaths};

type Prompt = Lines<BufReader<Stdin>>;

/// Session failures are shown by the progress reporter, so they come back as
/// `ExitCode::FAILURE` rather than as an error.
pub async fn run(
    video: &Path,
    options: &ExtractOptions,
    config_path: Option<&Path>,
) -> Result<ExitCode> {
    let config = Config::load(config_path)?;
    let tools = ToolPaths::from_config(&config)?;

    let mut session_config = config.session_config()?;
    if let Some(format) = options.format {
        session_config.output_format = match format {
            CliFormat::Mp3 => OutputFormat::Mp3,
            CliFormat::Wav => OutputFormat::Wav,
            CliFormat::Ogg => OutputFormat::Ogg,
        };
    }
    if let Some(enhance) = options.enhance_override() {
        session_config.enhance_audio = enhance;
    }

    let output_dir = options
        .output
        .clone()
        .unwrap_or_else(|| config.output.default_directory.clone());
    debug!("Session settings: {:?}, output to {}", session_config, output_dir.display());

    let metadata = tokio::fs::metadata(video)
        .await
        .with_context(|| format!("Cannot read {}", video.display()))?;
    println!(
        "Filename: {}",
        video.file_name().unwrap_or_default().to_string_lossy()
    );
    println!("File size: {:.2} MB\n", metadata.len() as f64 / (1024.0 * 1024.0));

    let style = ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")?;
    let (tx, rx) = mpsc::channel(32);
    let progress = Progress::start(rx, style);

    let interactive = std::io::stdin().is_terminal();
    let result = match Session::upload(video, &tools, &config.temp_dir(), tx).await {
        Ok(mut session) => {
            let result = extract_with_retry(
                &mut session,
                &progress,
                options.track,
                &session_config,
                &output_dir,
                interactive,
            )
            .await;
            session.close().await;
            result
        }
        Err(e) => {
            debug!("Upload failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    };

    // Wait for progress handler
    progress.finish().await?;
    result
}

async fn extract_with_retry(
    session: &mut Session,
    progress: &Progress,
    track: Option<usize>,
    config: &SessionConfig,
    output_dir: &Path,
    interactive: bool,
) -> Result<ExitCode> {
    let mut prompt = BufReader::new(tokio::io::stdin()).lines();

    let mut selected = match track {
        Some(track) => track,
        None if interactive && session.tracks().len() > 1 => {
            progress.flush().await;
            match choose_track(session, &mut prompt, Some(0)).await? {
                Some(track) => track,
                None => return Ok(ExitCode::SUCCESS),
            }
        }
        None => 0,
    };

    loop {
        let result = session.extract(selected, config, output_dir).await;
        progress.flush().await;

        match result {
            Ok(delivered) => {
                println!("\nAudio extracted successfully!");
                println!("{}", delivered.summary());
                println!(
                    "Output: {} ({})",
                    delivered.path.display(),
                    delivered.format.mime_type()
                );
                return Ok(ExitCode::SUCCESS);
            }
            Err(_) if interactive => {
                println!("\nPick a track to try again, or press Enter to quit.");
                match choose_track(session, &mut prompt, None).await? {
                    Some(track) => selected = track,
                    None => return Ok(ExitCode::FAILURE),
                }
            }
            Err(_) => return Ok(ExitCode::FAILURE),
        }
    }
}

/// Ask for a track number; an empty answer picks `default`
async fn choose_track(
    session: &Session,
    prompt: &mut Prompt,
    default: Option<usize>,
) -> Result<Option<usize>> {
    let tracks = session.tracks();

    println!("\nAvailable Audio Tracks");
    for track in tracks {
        println!("  {}", track.label());
    }

    loop {
        match default {
            Some(d) => print!("Select audio track to extract [{}]: ", d),
            None => print!("Select audio track to extract: "),
        }
        std::io::stdout().flush()?;

        let Some(line) = prompt.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(default);
        }

        match line.parse::<usize>() {
            Ok(n) if n < tracks.len() => return Ok(Some(n)),
            _ => println!("Enter a number between 0 and {}", tracks.len() - 1),
        }
    }
}

/// Handle to the task that renders session events
struct Progress {
    flush: mpsc::Sender<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Progress {
    fn start(events: mpsc::Receiver<SessionEvent>, style: ProgressStyle) -> Self {
        let (flush, flush_rx) = mpsc::channel(1);
        let handle = tokio::spawn(report_progress(events, flush_rx, style));
        Self { flush, handle }
    }

    /// Wait until every event sent so far has been rendered
    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.flush.send(ack).await.is_ok() {
            let _ = done.await;
        }
    }

    async fn finish(self) -> Result<()> {
        drop(self.flush);
        self.handle.await?;
        Ok(())
    }
}

async fn report_progress(
    mut events: mpsc::Receiver<SessionEvent>,
    mut flush: mpsc::Receiver<oneshot::Sender<()>>,
    style: ProgressStyle,
) {
    let mut display = Display::new(style);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => display.show(event),
                None => break,
            },
            Some(ack) = flush.recv() => {
                while let Ok(event) = events.try_recv() {
                    display.show(event);
                }
                let _ = ack.send(());
            }
        }
    }
}

struct Display {
    style: ProgressStyle,
    spinner: Option<ProgressBar>,
}

impl Display {
    fn new(style: ProgressStyle) -> Self {
        Self { style, spinner: None }
    }

    fn show(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Probing { file } => {
                self.spin(format!("Analyzing audio tracks in {}...", file));
            }
            SessionEvent::Probed { tracks } => {
                self.finish(format!("Found {} audio track(s)", tracks));
            }
            SessionEvent::Extracting { track } => {
                self.spin(format!("Extracting {}...", track));
            }
            SessionEvent::Enhancing => {
                self.spin("Applying audio enhancement...".to_string());
            }
            SessionEvent::Converting { format } => {
                self.spin(format!("Converting to {}...", format));
            }
            SessionEvent::Ready { output, duration } => {
                self.finish(format!(
                    "Done: {} ({:.1}s)",
                    output.display(),
                    duration.as_secs_f32()
                ));
            }
            SessionEvent::Failed { stage, error } => {
                let message = format!("Failed at {}: {}", stage, error);
                match self.spinner.take() {
                    Some(pb) => pb.abandon_with_message(message),
                    None => eprintln!("{}", message),
                }
            }
            SessionEvent::CleanupWarning { path, error } => {
                let message = format!("Warning: could not delete {}: {}", path.display(), error);
                match self.spinner {
                    Some(ref pb) => pb.println(message),
                    None => eprintln!("{}", message),
                }
            }
        }
    }

    fn spin(&mut self, message: String) {
        let style = &self.style;
        let pb = self.spinner.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(style.clone());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        pb.set_message(message);
    }

    fn finish(&mut self, message: String) {
        match self.spinner.take() {
            Some(pb) => pb.finish_with_message(message),
            None => println!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn hidden_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
    }

    #[tokio::test]
    async fn flush_renders_every_queued_event() {
        let (tx, rx) = mpsc::channel(8);
        let progress = Progress::start(rx, hidden_style());

        tx.send(SessionEvent::Probed { tracks: 2 }).await.unwrap();
        tx.send(SessionEvent::CleanupWarning {
            path: PathBuf::from("/tmp/x.wav"),
            error: "busy".to_string(),
        })
        .await
        .unwrap();
        progress.flush().await;

        // Everything sent before the flush has been taken off the channel
        assert_eq!(tx.capacity(), 8);

        drop(tx);
        progress.finish().await.unwrap();
    }

    #[tokio::test]
    async fn flush_after_the_session_is_gone_returns() {
        let (tx, rx) = mpsc::channel::<SessionEvent>(8);
        let progress = Progress::start(rx, hidden_style());
        drop(tx);

        progress.flush().await;
        progress.finish().await.unwrap();
    }
}
