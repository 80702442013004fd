// Directory scanning for arcs and episodes
//
// Root subdirectories are arcs; video files directly inside an arc are
// episodes. Listing failures degrade to an empty result for that call.

use std::path::Path;

use crate::constants::{COVER_CANDIDATES, VIDEO_EXTENSIONS};
use crate::handles::{DirEntryInfo, DirHandle, EntryKind};
use crate::ingest::natural::{leading_digits, sort_natural};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredArc {
    pub id: String,
    /// Directory name, used to reopen the arc under the root.
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEpisode {
    pub file_name: String,
    pub display_name: String,
    pub episode_number: Option<u32>,
}

/// Arc id: lowercase name, whitespace runs collapsed to one hyphen.
pub fn arc_slug(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Check if a file name has a recognized video extension
pub fn is_video_file(file_name: &str) -> bool {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Episode number from the leading digits of a file name.
pub fn parse_episode_number(file_name: &str) -> Option<u32> {
    leading_digits(file_name).and_then(|d| d.parse().ok())
}

/// File name without its final extension.
pub fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

fn list_or_empty(dir: &DirHandle) -> Vec<DirEntryInfo> {
    match dir.entries() {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to list {}: {}", dir.path().display(), e);
            Vec::new()
        }
    }
}

/// Candidate arcs under the library root, naturally sorted.
pub fn discover_arcs(root: &DirHandle) -> Vec<DiscoveredArc> {
    let mut names: Vec<String> = list_or_empty(root)
        .into_iter()
        .filter(|e| e.kind == EntryKind::Directory)
        .map(|e| e.name)
        .collect();
    sort_natural(&mut names);

    names
        .into_iter()
        .map(|name| DiscoveredArc {
            id: arc_slug(&name),
            display_name: name.clone(),
            name,
        })
        .collect()
}

/// Candidate episodes inside one arc directory, naturally sorted.
pub fn discover_episodes(arc_dir: &DirHandle) -> Vec<DiscoveredEpisode> {
    let mut names: Vec<String> = list_or_empty(arc_dir)
        .into_iter()
        .filter(|e| e.kind == EntryKind::File && is_video_file(&e.name))
        .map(|e| e.name)
        .collect();
    sort_natural(&mut names);

    names
        .into_iter()
        .map(|file_name| DiscoveredEpisode {
            display_name: file_stem(&file_name),
            episode_number: parse_episode_number(&file_name),
            file_name,
        })
        .collect()
}

/// First cover candidate present in the arc directory, by priority.
pub fn find_cover(arc_dir: &DirHandle) -> Option<String> {
    let files: Vec<String> = list_or_empty(arc_dir)
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.name)
        .collect();

    COVER_CANDIDATES.iter().find_map(|candidate| {
        files
            .iter()
            .find(|name| name.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_arc_slug() {
        assert_eq!(arc_slug("Season One"), "season-one");
        assert_eq!(arc_slug("The   Long\tArc"), "the-long-arc");
        assert_eq!(arc_slug("MIXED Case"), "mixed-case");
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file("01.mp4"));
        assert!(is_video_file("Finale.MKV"));
        assert!(is_video_file("clip.webm"));
        assert!(!is_video_file("cover.jpg"));
        assert!(!is_video_file("01.txt"));
        assert!(!is_video_file("mp4"));
    }

    #[test]
    fn test_parse_episode_number() {
        assert_eq!(parse_episode_number("01 - Pilot.mp4"), Some(1));
        assert_eq!(parse_episode_number("12.mkv"), Some(12));
        assert_eq!(parse_episode_number("Pilot.mp4"), None);
    }

    #[test]
    fn test_discover_episodes_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        for name in ["10.mp4", "cover.jpg", "2.mp4", "notes.txt", "Extra.mov"] {
            fs::write(tmp.path().join(name), "x").unwrap();
        }
        fs::create_dir(tmp.path().join("subdir.mp4")).unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();

        let eps = discover_episodes(&dir);
        let names: Vec<_> = eps.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["2.mp4", "10.mp4", "Extra.mov"]);
        assert_eq!(eps[0].episode_number, Some(2));
        assert_eq!(eps[2].episode_number, None);
        assert_eq!(eps[2].display_name, "Extra");
    }

    #[test]
    fn test_find_cover_priority() {
        let tmp = TempDir::new().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        assert_eq!(find_cover(&dir), None);

        fs::write(tmp.path().join("arc.jpg"), "x").unwrap();
        fs::write(tmp.path().join("cover.png"), "x").unwrap();
        assert_eq!(find_cover(&dir), Some("cover.png".to_string()));

        fs::write(tmp.path().join("cover.jpg"), "x").unwrap();
        assert_eq!(find_cover(&dir), Some("cover.jpg".to_string()));
    }

    #[test]
    fn test_unreadable_root_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("gone");
        fs::create_dir(&gone).unwrap();
        let dir = DirHandle::open(&gone).unwrap();
        fs::remove_dir(&gone).unwrap();
        assert!(discover_arcs(&dir).is_empty());
        assert!(discover_episodes(&dir).is_empty());
    }
}
