//! Upload validation and download file naming

use crate::converter::OutputFormat;
use crate::probe::AudioStreamDescriptor;
use std::path::Path;

/// Video containers accepted for upload
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Sanitize filename for filesystem
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `<stem>[_<language>].<format>`, language omitted when unknown
pub fn output_filename(
    upload_name: &str,
    track: &AudioStreamDescriptor,
    format: OutputFormat,
) -> String {
    let stem = Path::new(upload_name)
        .file_stem()
        .map(|s| sanitize_filename(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "audio".to_string());

    let language = if track.has_language() {
        format!("_{}", sanitize_filename(&track.language))
    } else {
        String::new()
    };

    format!("{}{}.{}", stem, language, format.extension())
}
