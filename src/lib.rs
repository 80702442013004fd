// Arc Shelf - Library Entry Point
//
// Local video library: arcs are directories under a granted root, episodes
// are the video files inside them. Metadata lives in SQLite; the videos are
// never copied or modified.

pub mod constants;
pub mod error;
pub mod config;
pub mod tools;
pub mod db;
pub mod handles;
pub mod metadata;
pub mod preview;
pub mod ingest;
pub mod sidecar;
pub mod playback;
pub mod backup;

pub use config::ShelfConfig;
pub use db::Store;
pub use error::{Result, ShelfError};
