//! Pre-emphasis and peak normalization of extracted audio

use crate::error::EnhanceError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// First-order pre-emphasis coefficient
pub const PREEMPHASIS_COEF: f32 = 0.97;

/// Marker inserted before the extension of the enhanced file
pub const ENHANCED_MARKER: &str = "_enhanced";

/// `dir/track.wav` -> `dir/track_enhanced.wav`
pub fn enhanced_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, ENHANCED_MARKER, ext.to_string_lossy()),
        None => format!("{}{}", stem, ENHANCED_MARKER),
    };
    input.with_file_name(name)
}

/// `y[n] = x[n] - coef * x[n-1]`. The first output adds the filter's initial
/// state `2 * x[0] - x[1]` to `x[0]`, which is how librosa seeds the filter.
pub fn preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let state = match samples {
        [] => return Vec::new(),
        [only] => *only,
        [first, second, ..] => 2.0 * first - second,
    };

    let mut out = Vec::with_capacity(samples.len());
    out.push(samples[0] + state);
    out.extend(samples.windows(2).map(|w| w[1] - coef * w[0]));
    out
}

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Scale so the peak magnitude is exactly 1.0. Returns `false` and leaves the
/// samples untouched when the signal is silent.
pub fn peak_normalize(samples: &mut [f32]) -> bool {
    let peak = peak(samples);
    if peak == 0.0 || !peak.is_finite() {
        return false;
    }
    for sample in samples.iter_mut() {
        *sample /= peak;
    }
    true
}

/// Summary of one enhancement pass
#[derive(Debug, Clone)]
pub struct EnhanceReport {
    pub sample_rate: u32,
    pub frames: usize,
    pub normalized: bool,
}

fn read_mono(path: &Path) -> Result<(Vec<f32>, u32), EnhanceError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => {
            return Err(EnhanceError::UnsupportedFormat {
                bits,
                format: match format {
                    SampleFormat::Float => "float",
                    SampleFormat::Int => "int",
                },
            })
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

fn write_pcm16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), EnhanceError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample * i16::MAX as f32).round().clamp(i16::MIN as f32, i16::MAX as f32);
        writer.write_sample(value as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Enhance `input` into `output` on the calling thread
pub fn enhance_file(input: &Path, output: &Path) -> Result<EnhanceReport, EnhanceError> {
    let (samples, sample_rate) = read_mono(input)?;
    debug!("Loaded {} frames at {} Hz", samples.len(), sample_rate);

    let mut enhanced = preemphasis(&samples, PREEMPHASIS_COEF);
    let normalized = peak_normalize(&mut enhanced);
    if !normalized {
        warn!("Audio is silent, skipping peak normalization");
    }

    write_pcm16(output, &enhanced, sample_rate)?;

    Ok(EnhanceReport {
        sample_rate,
        frames: enhanced.len(),
        normalized,
    })
}

/// Enhance a WAV file on the blocking pool
pub async fn enhance(input: &Path, output: &Path) -> Result<EnhanceReport, EnhanceError> {
    info!("Applying pre-emphasis and peak normalization");

    let input = input.to_path_buf();
    let output = output.to_path_buf();
    let report = tokio::task::spawn_blocking(move || enhance_file(&input, &output)).await??;

    debug!("Enhanced {} frames", report.frames);
    Ok(report)
}
