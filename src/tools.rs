// External tool resolver for ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (ARCSHELF_FFMPEG_PATH, ARCSHELF_FFPROBE_PATH)
// 2) Binary next to the executable, or in a bin/ subdirectory
// 3) PATH fallback

use std::env;
use std::path::PathBuf;

use crate::constants::{ENV_FFMPEG_PATH, ENV_FFPROBE_PATH};

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Resolve a tool path.
fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }

        let bin_candidate = dir.join("bin").join(&filename);
        if bin_candidate.exists() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool(ENV_FFPROBE_PATH, "ffprobe")
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool(ENV_FFMPEG_PATH, "ffmpeg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tool_fallback() {
        let path = resolve_tool("ARCSHELF_TEST_NONEXISTENT", "testcmd");
        assert_eq!(path, PathBuf::from("testcmd"));
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("fake_ffmpeg");
        std::fs::write(&tool, "test").unwrap();

        std::env::set_var("ARCSHELF_TEST_TOOL", tool.to_str().unwrap());
        let path = resolve_tool("ARCSHELF_TEST_TOOL", "default");
        assert_eq!(path, tool);
        std::env::remove_var("ARCSHELF_TEST_TOOL");
    }
}
