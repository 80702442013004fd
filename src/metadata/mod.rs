// Video metadata extraction module

pub mod ffprobe;

use serde::{Deserialize, Serialize};

/// Container-level facts needed before a frame can be captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoInfo {
    /// Duration in seconds, or 0 when unknown.
    pub fn duration_or_zero(&self) -> f64 {
        self.duration_secs.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0)
    }
}
