// Arc Shelf Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Access to a tracked directory or file was revoked or has expired.
    #[error("Access to '{0}' is no longer valid. Re-select the library directory.")]
    CapabilityStale(String),

    #[error("No library directory has been selected")]
    NoLibraryGranted,

    #[error("Arc not found: {0}")]
    ArcNotFound(String),

    #[error("Arc directory '{0}' is missing from the library")]
    ArcDirectoryMissing(String),

    #[error("Episode not found: {0}")]
    EpisodeNotFound(String),

    #[error("Episode file '{file}' not found in arc '{arc}'")]
    EpisodeFileNotFound { arc: String, file: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Thumbnail capture failed: {0}")]
    Decode(String),

    #[error("Failed to write sidecar '{file}': {source}")]
    SidecarWrite {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed backup bundle: {0}")]
    Format(String),

    #[error("{0}")]
    Other(String),
}

impl ShelfError {
    /// True when the only recovery is for the user to grant the library directory again.
    pub fn needs_regrant(&self) -> bool {
        matches!(
            self,
            ShelfError::CapabilityStale(_) | ShelfError::NoLibraryGranted
        )
    }
}

impl From<anyhow::Error> for ShelfError {
    fn from(err: anyhow::Error) -> Self {
        ShelfError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShelfError>;
