// FFprobe wrapper for video metadata

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::{Result, ShelfError};
use crate::metadata::VideoInfo;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
}

/// Run ffprobe on a file and read duration and frame size
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new(crate::tools::ffprobe_path())
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| ShelfError::Decode(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ShelfError::Decode(format!("ffprobe failed: {}", stderr)));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo> {
    let probe_output: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ShelfError::Decode(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut info = VideoInfo::default();

    let video = probe_output
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ShelfError::Decode("No video stream".to_string()))?;

    info.width = video.width;
    info.height = video.height;
    info.duration_secs = parse_duration_secs(video.duration.as_deref());

    if info.duration_secs.is_none() {
        info.duration_secs = probe_output
            .format
            .and_then(|f| parse_duration_secs(f.duration.as_deref()));
    }

    Ok(info)
}

fn parse_duration_secs(duration_str: Option<&str>) -> Option<f64> {
    let seconds: f64 = duration_str?.parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds)
    } else {
        None
    }
}
