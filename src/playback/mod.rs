// Playback module
//
// Loading an episode for playback and persisting how far it was watched.
// Progress is keyed by a stable id that includes the file's modification
// time, so a replaced file starts fresh while its old progress stays put.

pub mod debounce;
pub mod session;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::schema::{self, ArcRecord, Episode, EpisodeDescription, PlaybackProgress};
use crate::error::{Result, ShelfError};
use crate::handles::{file_identity, DirHandle, FileHandle, HandleManager};
use crate::sidecar;

pub use session::{spawn_session, PlaybackEvent, PlaybackSession, PlayerState, SessionHandle, SessionKey};

/// `{arcId}::{fileName}::{lastModifiedMillis}`
pub fn stable_id(arc_id: &str, file_name: &str, modified_millis: i64) -> String {
    format!("{}::{}::{}", arc_id, file_name, modified_millis)
}

/// Everything needed to start playing one episode.
#[derive(Debug, Clone)]
pub struct LoadedEpisode {
    pub arc: ArcRecord,
    pub episode: Episode,
    pub arc_dir: DirHandle,
    pub file: FileHandle,
    pub file_modified: i64,
    pub stable_id: String,
    pub progress: Option<PlaybackProgress>,
    pub description: Option<EpisodeDescription>,
}

impl LoadedEpisode {
    /// Where to resume, if anything was watched. Clamped to the known duration.
    pub fn resume_position(&self) -> Option<f64> {
        let progress = self.progress.as_ref()?;
        if progress.current_time <= 0.0 {
            return None;
        }
        if progress.duration > 0.0 {
            Some(progress.current_time.min(progress.duration))
        } else {
            Some(progress.current_time)
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            stable_id: self.stable_id.clone(),
            episode_id: self.episode.id.clone(),
            arc_id: self.arc.id.clone(),
        }
    }
}

/// Summary of a load, for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub stable_id: String,
    pub resume_at: Option<f64>,
    pub description: Option<String>,
}

impl From<&LoadedEpisode> for LoadSummary {
    fn from(loaded: &LoadedEpisode) -> Self {
        Self {
            stable_id: loaded.stable_id.clone(),
            resume_at: loaded.resume_position(),
            description: loaded.description.as_ref().map(|d| d.text.clone()),
        }
    }
}

/// Modification time of an episode file. A file that cannot be stat'ed is reported as missing.
fn file_version(arc: &ArcRecord, episode: &Episode, file: &FileHandle) -> Result<i64> {
    file.modified_millis().map_err(|e| {
        log::warn!("Cannot read modification time of {}: {}", file.path().display(), e);
        ShelfError::EpisodeFileNotFound {
            arc: arc.name.clone(),
            file: episode.file_name.clone(),
        }
    })
}

/// Resolve an episode down to its file and stored state.
///
/// Each failure is named so the caller can offer the right recovery:
/// `ArcNotFound` / `EpisodeNotFound` for unknown records, `CapabilityStale`
/// or `NoLibraryGranted` when the root must be selected again,
/// `ArcDirectoryMissing` / `EpisodeFileNotFound` when disk and store disagree.
pub fn load_episode(conn: &Connection, arc_id: &str, episode_id: &str) -> Result<LoadedEpisode> {
    let arc = schema::get_arc(conn, arc_id)?
        .ok_or_else(|| ShelfError::ArcNotFound(arc_id.to_string()))?;
    let episode = schema::get_episode(conn, episode_id)?
        .filter(|e| e.arc_id == arc.id)
        .ok_or_else(|| ShelfError::EpisodeNotFound(episode_id.to_string()))?;

    let handles = HandleManager::new(conn);
    let root = handles.verify_root()?;

    let arc_dir = root
        .subdir(&arc.name)
        .map_err(|_| ShelfError::ArcDirectoryMissing(arc.name.clone()))?;
    let file = arc_dir
        .file(&episode.file_name)
        .map_err(|_| ShelfError::EpisodeFileNotFound {
            arc: arc.name.clone(),
            file: episode.file_name.clone(),
        })?;

    let file_modified = file_version(&arc, &episode, &file)?;
    let stable_id = stable_id(&arc.id, &episode.file_name, file_modified);
    handles.verify(&file_identity(&stable_id), &file)?;

    let progress = schema::get_playback(conn, &stable_id)?;
    let description = sidecar::reconcile(conn, Some(&arc_dir), &episode, file_modified)?;

    log::debug!(
        "Loaded {} (resume at {:?})",
        stable_id,
        progress.as_ref().map(|p| p.current_time)
    );

    Ok(LoadedEpisode {
        arc,
        episode,
        arc_dir,
        file,
        file_modified,
        stable_id,
        progress,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use crate::db::schema::HandleStatus;
    use crate::preview::{Capture, FrameGrabber, ThumbOptions};
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct NoFrames;

    impl FrameGrabber for NoFrames {
        fn capture(&self, _video: &Path, _options: &ThumbOptions) -> Result<Capture> {
            Err(ShelfError::Decode("no decoder in tests".into()))
        }
    }

    /// Library with one arc "Arc" holding 01.mp4 (mtime 1_600_000_000 s), synced and granted.
    fn setup() -> (TempDir, Connection) {
        let tmp = TempDir::new().unwrap();
        let arc_dir = tmp.path().join("lib").join("Arc");
        fs::create_dir_all(&arc_dir).unwrap();
        let video = arc_dir.join("01.mp4");
        fs::write(&video, "video").unwrap();
        set_file_mtime(&video, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let conn = open_memory_db().unwrap();
        let handles = HandleManager::new(&conn);
        handles.grant_root(&DirHandle::open(&tmp.path().join("lib")).unwrap()).unwrap();
        crate::ingest::sync_library(&conn, &handles, &NoFrames, &ThumbOptions::default()).unwrap();
        (tmp, conn)
    }

    fn progress(id: &str, t: f64) -> PlaybackProgress {
        PlaybackProgress {
            id: id.to_string(),
            episode_id: "arc-ep-1".into(),
            arc_id: "arc".into(),
            current_time: t,
            duration: 100.0,
            last_watched: 1,
        }
    }

    #[test]
    fn test_stable_id_format() {
        assert_eq!(stable_id("arc", "01.mp4", 1_600_000_000_000), "arc::01.mp4::1600000000000");
    }

    #[test]
    fn test_stable_id_is_deterministic_across_loads() {
        let (_tmp, conn) = setup();
        let a = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        let b = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        assert_eq!(a.stable_id, "arc::01.mp4::1600000000000");
        assert_eq!(a.stable_id, b.stable_id);
        assert_eq!(
            schema::get_handle_status(&conn, &file_identity(&a.stable_id)).unwrap().unwrap().status,
            HandleStatus::Ok
        );
    }

    #[test]
    fn test_resume_from_stored_progress() {
        let (_tmp, conn) = setup();
        let id = stable_id("arc", "01.mp4", 1_600_000_000_000);
        schema::upsert_playback(&conn, &progress(&id, 42.5)).unwrap();

        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        assert_eq!(loaded.resume_position(), Some(42.5));

        schema::upsert_playback(&conn, &progress(&id, 0.0)).unwrap();
        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        assert_eq!(loaded.resume_position(), None);
    }

    #[test]
    fn test_touched_file_orphans_old_progress() {
        let (tmp, conn) = setup();
        let old_id = stable_id("arc", "01.mp4", 1_600_000_000_000);
        schema::upsert_playback(&conn, &progress(&old_id, 42.5)).unwrap();

        let video = tmp.path().join("lib").join("Arc").join("01.mp4");
        set_file_mtime(&video, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        assert_ne!(loaded.stable_id, old_id);
        assert!(loaded.progress.is_none());
        assert_eq!(loaded.resume_position(), None);
        assert_eq!(schema::get_playback(&conn, &old_id).unwrap().unwrap().current_time, 42.5);
    }

    #[test]
    fn test_named_load_errors() {
        let (tmp, conn) = setup();
        assert!(matches!(load_episode(&conn, "nope", "arc-ep-1"), Err(ShelfError::ArcNotFound(_))));
        assert!(matches!(load_episode(&conn, "arc", "arc-ep-9"), Err(ShelfError::EpisodeNotFound(_))));

        fs::remove_file(tmp.path().join("lib").join("Arc").join("01.mp4")).unwrap();
        match load_episode(&conn, "arc", "arc-ep-1") {
            Err(ShelfError::EpisodeFileNotFound { arc, file }) => {
                assert_eq!(arc, "Arc");
                assert_eq!(file, "01.mp4");
            }
            other => panic!("unexpected: {:?}", other.map(|l| l.stable_id)),
        }

        fs::remove_dir_all(tmp.path().join("lib").join("Arc")).unwrap();
        assert!(matches!(
            load_episode(&conn, "arc", "arc-ep-1"),
            Err(ShelfError::ArcDirectoryMissing(_))
        ));
    }

    #[test]
    fn test_stale_root_skips_file_access() {
        let (tmp, conn) = setup();
        load_episode(&conn, "arc", "arc-ep-1").unwrap();

        fs::remove_dir_all(tmp.path().join("lib")).unwrap();
        let err = load_episode(&conn, "arc", "arc-ep-1").unwrap_err();
        assert!(matches!(err, ShelfError::CapabilityStale(_)));
        assert!(err.needs_regrant());
        assert_eq!(
            schema::get_handle_status(&conn, "root").unwrap().unwrap().status,
            HandleStatus::Stale
        );
    }

    struct Revoked;

    impl crate::handles::Capability for Revoked {
        fn name(&self) -> &str {
            "01.mp4"
        }

        fn verify(&self) -> HandleStatus {
            HandleStatus::Stale
        }
    }

    #[test]
    fn test_file_identity_goes_stale() {
        let (_tmp, conn) = setup();
        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        let identity = file_identity(&loaded.stable_id);

        let handles = HandleManager::new(&conn);
        let err = handles.verify(&identity, &Revoked).unwrap_err();
        assert!(matches!(err, ShelfError::CapabilityStale(ref id) if *id == identity));
        assert_eq!(
            schema::get_handle_status(&conn, &identity).unwrap().unwrap().status,
            HandleStatus::Stale
        );
        // The root grant is unaffected
        assert_eq!(
            schema::get_handle_status(&conn, "root").unwrap().unwrap().status,
            HandleStatus::Ok
        );
    }

    #[test]
    fn test_unreadable_file_version_is_named() {
        let (tmp, conn) = setup();
        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        fs::remove_file(tmp.path().join("lib").join("Arc").join("01.mp4")).unwrap();

        match file_version(&loaded.arc, &loaded.episode, &loaded.file) {
            Err(ShelfError::EpisodeFileNotFound { arc, file }) => {
                assert_eq!(arc, "Arc");
                assert_eq!(file, "01.mp4");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_reads_sidecar_description() {
        let (tmp, conn) = setup();
        fs::write(tmp.path().join("lib").join("Arc").join("01.txt"), "Pilot episode").unwrap();

        let loaded = load_episode(&conn, "arc", "arc-ep-1").unwrap();
        let desc = loaded.description.unwrap();
        assert_eq!(desc.text, "Pilot episode");
        assert_eq!(desc.source, schema::DescriptionSource::Disk);
        assert_eq!(desc.last_modified, 1_600_000_000_000);
    }
}
