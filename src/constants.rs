// Arc Shelf Constants
// Identity formats and file conventions are persisted in user data. Do not change casually.

// Paths
pub const APP_DATA_FOLDER: &str = ".arcshelf";
pub const DB_FILENAME: &str = "arcshelf.db";

// Video extensions recognized as episodes (compared lowercase)
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "webm", "avi", "mov"];

// Cover image candidates, in priority order
pub const COVER_CANDIDATES: [&str; 5] = [
    "cover.jpg",
    "cover.jpeg",
    "cover.png",
    "folder.jpg",
    "arc.jpg",
];

// Sidecar description files
pub const SIDECAR_EXTENSION: &str = "txt";

// Handle identities
pub const ROOT_HANDLE_ID: &str = "root";
pub const FILE_HANDLE_PREFIX: &str = "file:";

// Playback
pub const PROGRESS_DEBOUNCE_MS: u64 = 1000;

// Thumbnail settings
pub const THUMB_QUALITY: u32 = 70;
pub const THUMB_DEFAULT_OFFSET_SECS: f64 = 1.0;
pub const THUMB_SEEK_FRACTION: f64 = 0.1;
pub const THUMB_MIME: &str = "image/jpeg";

// Backup bundle
pub const BACKUP_VERSION: u32 = 1;

// Environment overrides
pub const ENV_DATA_DIR: &str = "ARCSHELF_DATA_DIR";
pub const ENV_DEBOUNCE_MS: &str = "ARCSHELF_DEBOUNCE_MS";
pub const ENV_THUMB_OFFSET: &str = "ARCSHELF_THUMB_OFFSET";
pub const ENV_FFMPEG_PATH: &str = "ARCSHELF_FFMPEG_PATH";
pub const ENV_FFPROBE_PATH: &str = "ARCSHELF_FFPROBE_PATH";
