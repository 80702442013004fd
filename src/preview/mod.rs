// Preview module
//
// Poster frames for episodes. A frame is captured once at discovery time and
// stored inline on the episode as a data URI.

pub mod thumb;

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::THUMB_MIME;
use crate::error::Result;
use crate::metadata::ffprobe;

pub use thumb::ThumbOptions;

/// One captured still plus the facts learned while decoding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub jpeg: Vec<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Probed duration in seconds, 0 when unknown.
    pub duration_secs: f64,
}

impl Capture {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", THUMB_MIME, STANDARD.encode(&self.jpeg))
    }
}

/// Decodes a single representative frame from a video file.
pub trait FrameGrabber {
    fn capture(&self, video: &Path, options: &ThumbOptions) -> Result<Capture>;
}

/// Frame grabber backed by the ffprobe/ffmpeg binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegGrabber;

impl FrameGrabber for FfmpegGrabber {
    fn capture(&self, video: &Path, options: &ThumbOptions) -> Result<Capture> {
        let info = ffprobe::probe(video)?;
        let jpeg = thumb::capture_frame(video, info.duration_secs, options)?;
        Ok(Capture {
            jpeg,
            width: info.width,
            height: info.height,
            duration_secs: info.duration_or_zero(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri() {
        let capture = Capture {
            jpeg: vec![0xFF, 0xD8, 0xFF],
            width: Some(2),
            height: Some(2),
            duration_secs: 1.0,
        };
        assert_eq!(capture.data_uri(), "data:image/jpeg;base64,/9j/");
    }
}
