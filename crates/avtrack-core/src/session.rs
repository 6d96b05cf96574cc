//! Session orchestration: upload, probe, extract, enhance, convert, deliver

use crate::config::Config;
use crate::converter::{Converter, OutputFormat};
use crate::enhancer;
use crate::error::{AvTrackError, ConfigError, Result, Stage};
use crate::extractor::{Extractor, StreamSelector};
use crate::naming::{is_supported_video, output_filename};
use crate::probe::{AudioStreamDescriptor, Prober};
use crate::temp::TempFileRegistry;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-session user settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub enhance_audio: bool,
    pub output_format: OutputFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enhance_audio: true,
            output_format: OutputFormat::Mp3,
        }
    }
}

/// External binaries a session calls
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            ffmpeg: config.ffmpeg_path()?,
            ffprobe: config.ffprobe_path()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Probed,
    Extracting,
    Extracted,
    Enhancing,
    Enhanced,
    Converting,
    Ready,
    Failed,
}

/// Status updates for the user
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Probing { file: String },
    Probed { tracks: usize },
    Extracting { track: String },
    Enhancing,
    Converting { format: OutputFormat },
    Ready { output: PathBuf, duration: Duration },
    Failed { stage: Stage, error: String },
    CleanupWarning { path: PathBuf, error: String },
}

/// Result of a successful extraction attempt
#[derive(Debug, Clone)]
pub struct Delivered {
    pub path: PathBuf,
    pub track: AudioStreamDescriptor,
    pub format: OutputFormat,
    pub enhanced: bool,
    pub elapsed: Duration,
}

impl Delivered {
    pub fn summary(&self) -> String {
        format!(
            "Extracted audio: {} ({}, {} channels)",
            self.track.language, self.track.codec, self.track.channels
        )
    }
}

async fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    let _ = events.send(event).await;
}

async fn release(files: &mut TempFileRegistry, events: &mpsc::Sender<SessionEvent>) {
    for warning in files.release() {
        warn!("{}", warning);
        emit(
            events,
            SessionEvent::CleanupWarning {
                path: warning.path,
                error: warning.error.to_string(),
            },
        )
        .await;
    }
}

/// One uploaded video and the attempts made against it
pub struct Session {
    id: Uuid,
    upload_name: String,
    temp_dir: PathBuf,
    source: PathBuf,
    files: TempFileRegistry,
    tracks: Vec<AudioStreamDescriptor>,
    state: SessionState,
    extractor: Extractor,
    converter: Converter,
    events: mpsc::Sender<SessionEvent>,
}

impl Session {
    /// Copy `video` into a private temp file and list its audio tracks
    pub async fn upload(
        video: &Path,
        tools: &ToolPaths,
        temp_dir: &Path,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let upload_name = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(session = %id, "New session for {}", upload_name);

        let mut files = TempFileRegistry::new(temp_dir);
        let result = Self::stage_upload(video, &upload_name, tools, &mut files, &events).await;

        match result {
            Ok((source, tracks)) => {
                emit(&events, SessionEvent::Probed { tracks: tracks.len() }).await;
                let mut session = Self {
                    id,
                    upload_name,
                    temp_dir: temp_dir.to_path_buf(),
                    source,
                    files,
                    tracks,
                    state: SessionState::Idle,
                    extractor: Extractor::new(tools.ffmpeg.clone()),
                    converter: Converter::new(tools.ffmpeg.clone()),
                    events,
                };
                session.transition(SessionState::Probed);
                Ok(session)
            }
            Err(e) => {
                release(&mut files, &events).await;
                error!(session = %id, "{}", e);
                emit(
                    &events,
                    SessionEvent::Failed {
                        stage: e.stage(),
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn stage_upload(
        video: &Path,
        upload_name: &str,
        tools: &ToolPaths,
        files: &mut TempFileRegistry,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Result<(PathBuf, Vec<AudioStreamDescriptor>)> {
        if !is_supported_video(video) {
            return Err(AvTrackError::UnsupportedUpload(upload_name.to_string()));
        }

        let suffix = video
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let source = files.create(&suffix).map_err(AvTrackError::io(Stage::Upload))?;
        tokio::fs::copy(video, &source)
            .await
            .map_err(AvTrackError::io(Stage::Upload))?;

        emit(
            events,
            SessionEvent::Probing {
                file: upload_name.to_string(),
            },
        )
        .await;

        // A failed probe is reported, then handled as a video without audio
        let tracks = match Prober::new(tools.ffprobe.clone()).probe(&source).await {
            Ok(tracks) => tracks,
            Err(e) => {
                let e = AvTrackError::from(e);
                error!("{}", e);
                emit(
                    events,
                    SessionEvent::Failed {
                        stage: Stage::Probe,
                        error: e.to_string(),
                    },
                )
                .await;
                Vec::new()
            }
        };

        if tracks.is_empty() {
            return Err(AvTrackError::NoAudioTracks);
        }

        Ok((source, tracks))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn upload_name(&self) -> &str {
        &self.upload_name
    }

    /// Private copy of the uploaded video
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// Audio tracks in selection order
    pub fn tracks(&self) -> &[AudioStreamDescriptor] {
        &self.tracks
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run one extraction attempt for the track at `ordinal` and write the
    /// result into `output_dir`. Every temp file of the attempt is removed
    /// before this returns.
    pub async fn extract(
        &mut self,
        ordinal: usize,
        config: &SessionConfig,
        output_dir: &Path,
    ) -> Result<Delivered> {
        let started = Instant::now();
        let mut files = TempFileRegistry::new(&self.temp_dir);

        let result = self
            .run_attempt(ordinal, config, output_dir, &mut files, started)
            .await;

        release(&mut files, &self.events).await;

        match result {
            Ok(delivered) => {
                self.transition(SessionState::Ready);
                info!(
                    session = %self.id,
                    "Delivered {} ({:.1}s)",
                    delivered.path.display(),
                    delivered.elapsed.as_secs_f32()
                );
                emit(
                    &self.events,
                    SessionEvent::Ready {
                        output: delivered.path.clone(),
                        duration: delivered.elapsed,
                    },
                )
                .await;
                Ok(delivered)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                error!(session = %self.id, "{}", e);
                emit(
                    &self.events,
                    SessionEvent::Failed {
                        stage: e.stage(),
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_attempt(
        &mut self,
        ordinal: usize,
        config: &SessionConfig,
        output_dir: &Path,
        files: &mut TempFileRegistry,
        started: Instant,
    ) -> Result<Delivered> {
        let track = self
            .tracks
            .get(ordinal)
            .cloned()
            .ok_or(AvTrackError::TrackOutOfRange {
                requested: ordinal,
                available: self.tracks.len(),
            })?;

        // 1. Extract
        self.transition(SessionState::Extracting);
        emit(&self.events, SessionEvent::Extracting { track: track.label() }).await;

        let raw = files.create(".wav").map_err(AvTrackError::io(Stage::Extract))?;
        self.extractor
            .extract(&self.source, StreamSelector::for_track(&track), &raw)
            .await?;
        self.transition(SessionState::Extracted);

        // 2. Enhance (if enabled)
        let audio = if config.enhance_audio {
            self.transition(SessionState::Enhancing);
            emit(&self.events, SessionEvent::Enhancing).await;

            let enhanced = files
                .adopt(enhancer::enhanced_path(&raw))
                .map_err(AvTrackError::io(Stage::Enhance))?;
            enhancer::enhance(&raw, &enhanced).await?;
            self.transition(SessionState::Enhanced);
            enhanced
        } else {
            raw
        };

        // 3. Convert
        let format = config.output_format;
        self.transition(SessionState::Converting);
        emit(&self.events, SessionEvent::Converting { format }).await;

        let artifact = if format.matches(&audio) {
            debug!("Audio is already {}, skipping conversion", format);
            audio
        } else {
            let converted = files
                .create(&format!(".{}", format.extension()))
                .map_err(AvTrackError::io(Stage::Convert))?;
            self.converter.convert(&audio, &converted, format).await?;
            converted
        };

        // 4. Deliver
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(AvTrackError::io(Stage::Deliver))?;
        let destination = output_dir.join(output_filename(&self.upload_name, &track, format));
        tokio::fs::copy(&artifact, &destination)
            .await
            .map_err(AvTrackError::io(Stage::Deliver))?;

        Ok(Delivered {
            path: destination,
            track,
            format,
            enhanced: config.enhance_audio,
            elapsed: started.elapsed(),
        })
    }

    /// Remove the uploaded video copy
    pub async fn close(mut self) {
        debug!(session = %self.id, "Closing session");
        release(&mut self.files, &self.events).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const ONE_ENGLISH_TRACK: &str = r#"{"streams":[{"index":1,"codec_name":"aac","sample_rate":"44100","channels":2,"duration":"10.000000","tags":{"language":"eng"}}]}"#;

    const TWO_TRACKS: &str = r#"{"streams":[{"index":1,"codec_name":"aac","channels":2,"tags":{"language":"eng"}},{"index":2,"codec_name":"aac","channels":2}]}"#;

    struct Fixture {
        dir: TempDir,
        temp: PathBuf,
        out: PathBuf,
        video: PathBuf,
    }

    impl Fixture {
        fn new(video_name: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let temp = dir.path().join("tmp");
            let out = dir.path().join("out");
            std::fs::create_dir_all(&temp).unwrap();
            let video = dir.path().join(video_name);
            std::fs::write(&video, b"not really a video").unwrap();
            Self { dir, temp, out, video }
        }

        fn tool(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn ffprobe(&self, json: &str) -> PathBuf {
            self.tool("ffprobe", &format!("cat <<'EOF'\n{}\nEOF", json))
        }

        /// ffmpeg stand-in that logs its arguments and writes a short WAV
        /// to its last argument
        fn ffmpeg(&self) -> PathBuf {
            let wav = self.dir.path().join("fixture.wav");
            let spec = WavSpec {
                channels: 2,
                sample_rate: 44_100,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut writer = WavWriter::create(&wav, spec).unwrap();
            for i in 0..4410 {
                let v = ((i as f32 * 0.05).sin() * 6000.0) as i16;
                writer.write_sample(v).unwrap();
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();

            let log = self.dir.path().join("ffmpeg.log");
            self.tool(
                "ffmpeg",
                &format!(
                    "echo \"$@\" >> '{}'\nfor last; do :; done\ncp '{}' \"$last\"",
                    log.display(),
                    wav.display()
                ),
            )
        }

        fn ffmpeg_calls(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("ffmpeg.log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        fn temp_is_empty(&self) -> bool {
            std::fs::read_dir(&self.temp).unwrap().next().is_none()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn english_track_without_enhancement_to_mp3() {
        let fx = Fixture::new("holiday.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        assert_eq!(session.state(), SessionState::Probed);
        assert_eq!(session.tracks().len(), 1);
        assert_eq!(session.tracks()[0].language, "eng");

        let config = SessionConfig {
            enhance_audio: false,
            output_format: OutputFormat::Mp3,
        };
        let delivered = session.extract(0, &config, &fx.out).await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(delivered.path, fx.out.join("holiday_eng.mp3"));
        assert!(delivered.path.exists());
        assert_eq!(delivered.summary(), "Extracted audio: eng (aac, 2 channels)");

        let calls = fx.ffmpeg_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("-map 0:1 -vn -acodec pcm_s16le -ar 44100 -y"));
        assert!(calls[1].contains("-f mp3"));

        session.close().await;
        assert!(fx.temp_is_empty());

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(SessionEvent::Probing { .. })));
        assert!(matches!(events.last(), Some(SessionEvent::Ready { .. })));
    }

    #[tokio::test]
    async fn second_track_is_selected_by_container_index() {
        let fx = Fixture::new("movie.mkv");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(TWO_TRACKS),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let labels: Vec<String> = session.tracks().iter().map(|t| t.label()).collect();
        assert_eq!(
            labels,
            [
                "Track 0 - Language: eng - Channels: 2, Codec: aac",
                "Track 1 - Channels: 2, Codec: aac",
            ]
        );

        let delivered = session
            .extract(1, &SessionConfig::default(), &fx.out)
            .await
            .unwrap();
        assert_eq!(delivered.path, fx.out.join("movie.mp3"));
        assert!(fx.ffmpeg_calls()[0].contains("-map 0:2"));

        session.close().await;
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn wav_output_reuses_enhanced_audio() {
        let fx = Fixture::new("talk.webm");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let config = SessionConfig {
            enhance_audio: true,
            output_format: OutputFormat::Wav,
        };
        let delivered = session.extract(0, &config, &fx.out).await.unwrap();

        // Only the extraction ran through ffmpeg
        assert_eq!(fx.ffmpeg_calls().len(), 1);
        assert!(delivered.enhanced);

        let mut reader = hound::WavReader::open(&delivered.path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        let peak = reader.samples::<i16>().map(|s| s.unwrap().unsigned_abs()).max();
        assert_eq!(peak, Some(i16::MAX as u16));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Enhancing)));

        session.close().await;
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_reports_stderr_and_cleans_up() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.tool("ffmpeg", "echo 'Stream map matches no streams.' >&2\nexit 1"),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let err = session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Extract);
        assert!(err.to_string().contains("Stream map matches no streams."));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!fx.out.exists());

        // Only the uploaded copy is left until the session closes
        assert_eq!(std::fs::read_dir(&fx.temp).unwrap().count(), 1);
        assert!(session.source_path().exists());

        match drain(&mut rx).last() {
            Some(SessionEvent::Failed { stage, error }) => {
                assert_eq!(*stage, Stage::Extract);
                assert!(error.contains("Stream map matches no streams."));
            }
            other => panic!("unexpected last event: {:?}", other),
        }

        session.close().await;
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn video_without_audio_never_extracts() {
        let fx = Fixture::new("silent.mov");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(r#"{"streams":[]}"#),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let result = Session::upload(&fx.video, &tools, &fx.temp, tx).await;
        assert!(matches!(result, Err(AvTrackError::NoAudioTracks)));
        assert!(fx.ffmpeg_calls().is_empty());
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn unreadable_container_is_reported_as_no_audio() {
        let fx = Fixture::new("broken.avi");
        let tools = ToolPaths {
            ffprobe: fx.tool("ffprobe", "echo 'moov atom not found' >&2\nexit 1"),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let result = Session::upload(&fx.video, &tools, &fx.temp, tx).await;
        assert!(matches!(result, Err(AvTrackError::NoAudioTracks)));

        let failures: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Failed { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("Error analyzing video"));
        assert_eq!(failures[1], "No audio tracks found in the video file.");
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn rejects_unsupported_upload() {
        let fx = Fixture::new("song.mp3");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let result = Session::upload(&fx.video, &tools, &fx.temp, tx).await;
        assert!(matches!(result, Err(AvTrackError::UnsupportedUpload(_))));
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn out_of_range_track_fails_without_calling_ffmpeg() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let err = session
            .extract(3, &SessionConfig::default(), &fx.out)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AvTrackError::TrackOutOfRange { requested: 3, available: 1 }
        ));
        assert!(fx.ffmpeg_calls().is_empty());

        // Retry with a valid track after the failure
        session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        session.close().await;
    }

    #[tokio::test]
    async fn conversion_failure_keeps_only_the_upload_copy() {
        let fx = Fixture::new("clip.mp4");
        fx.ffmpeg();
        let marker = fx.dir.path().join("extracted");
        // First call (extraction) succeeds, the second (conversion) fails
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.tool(
                "ffmpeg",
                &format!(
                    "if [ -f '{marker}' ]; then echo 'Unknown encoder' >&2; exit 1; fi\n\
                     touch '{marker}'\nfor last; do :; done\ncp '{wav}' \"$last\"",
                    marker = marker.display(),
                    wav = fx.dir.path().join("fixture.wav").display(),
                ),
            ),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let config = SessionConfig {
            enhance_audio: false,
            output_format: OutputFormat::Mp3,
        };
        let err = session.extract(0, &config, &fx.out).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Convert);
        assert!(err.to_string().contains("Unknown encoder"));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!fx.out.join("clip_eng.mp3").exists());

        let left: Vec<PathBuf> = std::fs::read_dir(&fx.temp)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(left, [session.source_path().to_path_buf()]);

        assert!(matches!(
            drain(&mut rx).last(),
            Some(SessionEvent::Failed { stage: Stage::Convert, .. })
        ));

        session.close().await;
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn unreadable_extraction_fails_enhancement() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.tool("ffmpeg", "for last; do :; done\necho garbage > \"$last\""),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let err = session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap_err();

        assert!(matches!(err, AvTrackError::Enhance(_)));
        assert_eq!(err.stage(), Stage::Enhance);
        assert_eq!(session.state(), SessionState::Failed);

        let names: Vec<String> = std::fs::read_dir(&fx.temp)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains(enhancer::ENHANCED_MARKER));

        assert!(matches!(
            drain(&mut rx).last(),
            Some(SessionEvent::Failed { stage: Stage::Enhance, .. })
        ));
        session.close().await;
        assert!(fx.temp_is_empty());
    }

    #[tokio::test]
    async fn undeletable_temp_file_warns_without_failing() {
        let fx = Fixture::new("clip.mp4");
        fx.ffmpeg();
        // During conversion, replace the enhanced WAV with a non-empty
        // directory so it cannot be removed afterwards
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.tool(
                "ffmpeg",
                &format!(
                    "prev=\nfor a; do\n  if [ \"$prev\" = -i ]; then input=\"$a\"; fi\n  prev=\"$a\"\ndone\n\
                     case \"$input\" in *_enhanced.wav)\n  \
                     rm -f \"$input\"; mkdir \"$input\"; touch \"$input/keep\";;\nesac\n\
                     cp '{}' \"$prev\"",
                    fx.dir.path().join("fixture.wav").display(),
                ),
            ),
        };
        let (tx, mut rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let delivered = session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap();
        assert!(delivered.path.exists());
        assert_eq!(session.state(), SessionState::Ready);

        let events = drain(&mut rx);
        let warnings: Vec<&PathBuf> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CleanupWarning { path, .. } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string_lossy().ends_with("_enhanced.wav"));
        assert!(matches!(events.last(), Some(SessionEvent::Ready { .. })));

        session.close().await;
    }

    #[tokio::test]
    async fn missing_temp_dir_fails_the_upload() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let missing = fx.dir.path().join("no-such-dir");
        let err = Session::upload(&fx.video, &tools, &missing, tx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AvTrackError::Io { stage: Stage::Upload, .. }));
    }

    #[tokio::test]
    async fn lost_temp_dir_fails_extraction() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        std::fs::remove_dir_all(&fx.temp).unwrap();

        let err = session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap_err();
        assert!(matches!(err, AvTrackError::Io { stage: Stage::Extract, .. }));
        assert!(fx.ffmpeg_calls().is_empty());
    }

    #[tokio::test]
    async fn lost_temp_dir_fails_conversion() {
        let fx = Fixture::new("clip.mp4");
        fx.ffmpeg();
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.tool(
                "ffmpeg",
                &format!(
                    "for last; do :; done\ncp '{}' \"$last\"\nrm -rf '{}'",
                    fx.dir.path().join("fixture.wav").display(),
                    fx.temp.display(),
                ),
            ),
        };
        let (tx, _rx) = mpsc::channel(64);

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let config = SessionConfig {
            enhance_audio: false,
            output_format: OutputFormat::Mp3,
        };
        let err = session.extract(0, &config, &fx.out).await.unwrap_err();
        assert!(matches!(err, AvTrackError::Io { stage: Stage::Convert, .. }));
    }

    #[tokio::test]
    async fn output_path_taken_by_a_file_fails_delivery() {
        let fx = Fixture::new("clip.mp4");
        let tools = ToolPaths {
            ffprobe: fx.ffprobe(ONE_ENGLISH_TRACK),
            ffmpeg: fx.ffmpeg(),
        };
        let (tx, _rx) = mpsc::channel(64);
        std::fs::write(&fx.out, b"not a directory").unwrap();

        let mut session = Session::upload(&fx.video, &tools, &fx.temp, tx).await.unwrap();
        let err = session
            .extract(0, &SessionConfig::default(), &fx.out)
            .await
            .unwrap_err();
        assert!(matches!(err, AvTrackError::Io { stage: Stage::Deliver, .. }));

        session.close().await;
        assert!(fx.temp_is_empty());
    }
}
