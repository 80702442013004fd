// Thumbnail capture
//
// Grabs one JPEG frame at the video's native size. Seeks a little way in to
// avoid black leading frames: min(offset, 10% of duration).

use std::path::Path;
use std::process::{Command, Stdio};

use crate::constants::{THUMB_DEFAULT_OFFSET_SECS, THUMB_QUALITY, THUMB_SEEK_FRACTION};
use crate::error::{Result, ShelfError};

/// Options for thumbnail generation.
#[derive(Debug, Clone)]
pub struct ThumbOptions {
    /// Preferred seek position in seconds.
    pub time_offset: f64,
    /// JPEG quality, 0-100.
    pub quality: u32,
}

impl Default for ThumbOptions {
    fn default() -> Self {
        Self {
            time_offset: THUMB_DEFAULT_OFFSET_SECS,
            quality: THUMB_QUALITY,
        }
    }
}

/// Seek position for the poster frame.
pub fn seek_position(duration_secs: Option<f64>, time_offset: f64) -> f64 {
    let offset = time_offset.max(0.0);
    match duration_secs {
        Some(d) if d.is_finite() && d >= 0.0 => offset.min(d * THUMB_SEEK_FRACTION),
        _ => offset,
    }
}

/// Map 0-100 quality onto ffmpeg's 1-31 qscale (1 is best).
fn quality_to_qscale(quality: u32) -> u32 {
    let quality = quality.min(100);
    ((100 - quality) as f32 / 100.0 * 30.0 + 1.0) as u32
}

/// Capture a single JPEG frame and return its bytes.
pub fn capture_frame(source_path: &Path, duration_secs: Option<f64>, options: &ThumbOptions) -> Result<Vec<u8>> {
    let seek_time = format_duration(seek_position(duration_secs, options.time_offset));
    let q_value = quality_to_qscale(options.quality).to_string();

    let output = Command::new(crate::tools::ffmpeg_path())
        .args(["-v", "error", "-ss", &seek_time, "-i"])
        .arg(source_path)
        .args([
            "-frames:v", "1",
            "-q:v", &q_value,
            "-f", "image2pipe",
            "-c:v", "mjpeg",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ShelfError::Decode(format!("Failed to run ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ShelfError::Decode(format!("FFmpeg frame capture failed: {}", stderr.trim())));
    }

    if output.stdout.is_empty() {
        return Err(ShelfError::Decode(format!(
            "No frame decoded from {}",
            source_path.display()
        )));
    }

    Ok(output.stdout)
}

/// Format seconds as HH:MM:SS.mmm for ffmpeg.
fn format_duration(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}
