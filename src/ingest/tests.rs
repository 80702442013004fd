// Library sync scenarios

use super::*;
use crate::db::open_memory_db;
use crate::error::ShelfError;
use crate::preview::Capture;
use std::cell::Cell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Frame grabber that succeeds for files whose content starts with "video".
struct StubGrabber {
    calls: Cell<usize>,
}

impl StubGrabber {
    fn new() -> Self {
        Self { calls: Cell::new(0) }
    }
}

impl FrameGrabber for StubGrabber {
    fn capture(&self, video: &Path, _options: &ThumbOptions) -> Result<Capture> {
        self.calls.set(self.calls.get() + 1);
        let content = fs::read(video)?;
        if !content.starts_with(b"video") {
            return Err(ShelfError::Decode(format!("corrupt: {}", video.display())));
        }
        Ok(Capture {
            jpeg: vec![0xFF, 0xD8, 0xFF],
            width: Some(320),
            height: Some(240),
            duration_secs: 1440.0,
        })
    }
}

fn create_tree(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"video bytes").unwrap();
    }
}

fn sync(conn: &Connection, root: &Path, grabber: &StubGrabber) -> SyncResult {
    let dir = DirHandle::open(root).unwrap();
    sync_from_root(conn, &dir, grabber, &ThumbOptions::default()).unwrap()
}

#[test]
fn test_empty_root_leaves_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let conn = open_memory_db().unwrap();
    let result = sync(&conn, tmp.path(), &StubGrabber::new());

    assert_eq!(result.arcs_found, 0);
    assert!(result.arcs_added.is_empty());
    assert_eq!(schema::count_arcs(&conn).unwrap(), 0);
    assert!(schema::list_all_episodes(&conn).unwrap().is_empty());
}

#[test]
fn test_arc_with_cover_and_numbered_episodes() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["Season One/2.mp4", "Season One/cover.jpg", "Season One/10.mp4"]);
    let conn = open_memory_db().unwrap();

    let result = sync(&conn, tmp.path(), &StubGrabber::new());
    assert_eq!(result.arcs_added, vec!["season-one"]);

    let arc = schema::get_arc(&conn, "season-one").unwrap().unwrap();
    assert_eq!(arc.name, "Season One");
    assert_eq!(arc.cover_image.as_deref(), Some("cover.jpg"));
    assert_eq!(arc.order, 0);

    let episodes = schema::list_episodes(&conn, "season-one").unwrap();
    let files: Vec<_> = episodes.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(files, vec!["2.mp4", "10.mp4"]);
    assert_eq!(episodes[0].id, "season-one-ep-1");
    assert_eq!(episodes[1].id, "season-one-ep-2");
    assert_eq!(episodes[1].episode_number, Some(10));
    assert_eq!(episodes[1].order, 1);
    assert_eq!(episodes[0].duration, 1440.0);
    assert!(episodes[0].thumbnail.as_deref().unwrap().starts_with("data:image/jpeg;base64,"));
}

#[test]
fn test_second_sync_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["B Arc/01.mp4", "A Arc/01.mp4", "A Arc/02.mkv"]);
    let conn = open_memory_db().unwrap();
    let grabber = StubGrabber::new();

    let first = sync(&conn, tmp.path(), &grabber);
    assert_eq!(first.arcs_added.len(), 2);
    assert_eq!(first.episodes_added.len(), 3);
    let arcs_before = schema::list_arcs(&conn).unwrap();
    let episodes_before = schema::list_all_episodes(&conn).unwrap();
    let calls = grabber.calls.get();

    let second = sync(&conn, tmp.path(), &grabber);
    assert_eq!(second.arcs_found, 2);
    assert!(second.arcs_added.is_empty());
    assert!(second.episodes_added.is_empty());
    assert_eq!(grabber.calls.get(), calls, "known episodes are not re-captured");
    assert_eq!(schema::list_arcs(&conn).unwrap(), arcs_before);
    assert_eq!(schema::list_all_episodes(&conn).unwrap(), episodes_before);
}

#[test]
fn test_arc_order_is_count_of_known_arcs() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["Zeta/01.mp4"]);
    let conn = open_memory_db().unwrap();
    sync(&conn, tmp.path(), &StubGrabber::new());

    create_tree(tmp.path(), &["Alpha/01.mp4"]);
    sync(&conn, tmp.path(), &StubGrabber::new());

    assert_eq!(schema::get_arc(&conn, "zeta").unwrap().unwrap().order, 0);
    assert_eq!(schema::get_arc(&conn, "alpha").unwrap().unwrap().order, 1);
}

#[test]
fn test_thumbnail_failure_still_registers_episode() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["Arc/01.mp4"]);
    fs::write(tmp.path().join("Arc/02.mp4"), b"garbage").unwrap();
    let conn = open_memory_db().unwrap();

    let result = sync(&conn, tmp.path(), &StubGrabber::new());
    assert_eq!(result.episodes_added.len(), 2);
    assert_eq!(result.thumbnails_failed, 1);

    let broken = schema::get_episode(&conn, "arc-ep-2").unwrap().unwrap();
    assert!(broken.thumbnail.is_none());
    assert_eq!(broken.duration, 0.0);
}

#[test]
fn test_inserted_file_does_not_steal_existing_ids() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["Arc/01.mp4", "Arc/03.mp4"]);
    let conn = open_memory_db().unwrap();
    sync(&conn, tmp.path(), &StubGrabber::new());

    create_tree(tmp.path(), &["Arc/02.mp4"]);
    let result = sync(&conn, tmp.path(), &StubGrabber::new());
    assert_eq!(result.episodes_added, vec!["arc-ep-3"]);

    assert_eq!(schema::get_episode(&conn, "arc-ep-2").unwrap().unwrap().file_name, "03.mp4");
    let added = schema::get_episode(&conn, "arc-ep-3").unwrap().unwrap();
    assert_eq!(added.file_name, "02.mp4");
    assert_eq!(added.order, 1);
}

#[test]
fn test_duplicate_slugs_are_reported() {
    let tmp = TempDir::new().unwrap();
    create_tree(tmp.path(), &["My Arc/01.mp4", "my  arc/01.mp4"]);
    let conn = open_memory_db().unwrap();

    let result = sync(&conn, tmp.path(), &StubGrabber::new());
    assert_eq!(result.arcs_found, 2);
    assert_eq!(result.arcs_added, vec!["my-arc"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(schema::list_episodes(&conn, "my-arc").unwrap().len(), 1);
}

#[test]
fn test_sync_library_requires_valid_root() {
    let tmp = TempDir::new().unwrap();
    let lib = tmp.path().join("lib");
    create_tree(&lib, &["Arc/01.mp4"]);
    let conn = open_memory_db().unwrap();
    let handles = HandleManager::new(&conn);
    let grabber = StubGrabber::new();

    let err = sync_library(&conn, &handles, &grabber, &ThumbOptions::default()).unwrap_err();
    assert!(matches!(err, ShelfError::NoLibraryGranted));

    handles.grant_root(&DirHandle::open(&lib).unwrap()).unwrap();
    let result = sync_library(&conn, &handles, &grabber, &ThumbOptions::default()).unwrap();
    assert_eq!(result.episodes_added.len(), 1);

    fs::remove_dir_all(&lib).unwrap();
    let err = sync_library(&conn, &handles, &grabber, &ThumbOptions::default()).unwrap_err();
    assert!(matches!(err, ShelfError::CapabilityStale(_)));
    assert_eq!(schema::count_arcs(&conn).unwrap(), 1);
}
