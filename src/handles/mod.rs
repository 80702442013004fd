// Directory and file access handles
//
// A handle is a revocable grant to a directory or file. Nothing may read
// through a handle without verifying it first; the manager records the
// outcome of every verification under the handle's identity.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use walkdir::WalkDir;

use crate::constants::{FILE_HANDLE_PREFIX, ROOT_HANDLE_ID};
use crate::db::schema::{self, FileHandleStatus, HandleStatus, StoredHandle};
use crate::error::{Result, ShelfError};

/// Something that can be checked for continued access.
pub trait Capability {
    fn name(&self) -> &str;
    /// `Ok` while access is still granted, `Stale` otherwise.
    fn verify(&self) -> HandleStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
}

/// Reject anything that is not a single plain path component.
fn plain_component(name: &str) -> bool {
    let mut comps = Path::new(name).components();
    matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirHandle {
    path: PathBuf,
    name: String,
}

impl DirHandle {
    /// Acquire a handle on an existing directory.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(ShelfError::NotFound(format!("directory {}", path.display())));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self {
            path: path.to_path_buf(),
            name,
        })
    }

    /// Rebuild a handle from its persisted token. Validity is not checked.
    pub fn from_token(token: &str, name: &str) -> Self {
        Self {
            path: PathBuf::from(token),
            name: name.to_string(),
        }
    }

    pub fn token(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Immediate children, in no particular order.
    pub fn entries(&self) -> Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                // Depth 0 is the directory itself; anything deeper is one bad child
                Err(e) if e.depth() == 0 => {
                    return Err(ShelfError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
                    })));
                }
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", self.path.display(), e);
                    continue;
                }
            };
            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else if entry.file_type().is_file() {
                EntryKind::File
            } else {
                continue;
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    /// Handle on an immediate subdirectory.
    pub fn subdir(&self, name: &str) -> Result<DirHandle> {
        let path = self.path.join(name);
        if !plain_component(name) || !path.is_dir() {
            return Err(ShelfError::NotFound(format!("directory '{}' in '{}'", name, self.name)));
        }
        Ok(DirHandle {
            path,
            name: name.to_string(),
        })
    }

    /// Handle on an immediate file.
    pub fn file(&self, name: &str) -> Result<FileHandle> {
        let path = self.path.join(name);
        if !plain_component(name) || !path.is_file() {
            return Err(ShelfError::NotFound(format!("file '{}' in '{}'", name, self.name)));
        }
        Ok(FileHandle {
            path,
            name: name.to_string(),
        })
    }

    /// Create or replace a file. Writes a temp file, fsyncs it, then renames it into place.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> std::io::Result<()> {
        if !plain_component(name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid file name '{}'", name),
            ));
        }
        let final_path = self.path.join(name);
        let tmp_path = self.path.join(format!(".tmp_{}", name));

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }
}

impl Capability for DirHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn verify(&self) -> HandleStatus {
        match fs::read_dir(&self.path) {
            Ok(_) => HandleStatus::Ok,
            Err(_) => HandleStatus::Stale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
    name: String,
}

impl FileHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time in epoch milliseconds.
    pub fn modified_millis(&self) -> Result<i64> {
        let modified = fs::metadata(&self.path)?.modified()?;
        let millis = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        };
        Ok(millis)
    }

    /// File contents as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Capability for FileHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn verify(&self) -> HandleStatus {
        match fs::File::open(&self.path) {
            Ok(_) => HandleStatus::Ok,
            Err(_) => HandleStatus::Stale,
        }
    }
}

/// Identity under which a per-file check is recorded.
pub fn file_identity(stable_id: &str) -> String {
    format!("{}{}", FILE_HANDLE_PREFIX, stable_id)
}

/// Persists the library root grant and records verification outcomes.
pub struct HandleManager<'a> {
    conn: &'a Connection,
}

impl<'a> HandleManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Store (or replace) the root grant. This is also how a stale root is recovered.
    pub fn grant_root(&self, root: &DirHandle) -> Result<StoredHandle> {
        let stored = StoredHandle {
            id: ROOT_HANDLE_ID.to_string(),
            token: root.token(),
            name: root.name().to_string(),
            saved_at: schema::now_millis(),
        };
        schema::save_file_handle(self.conn, &stored)?;
        self.verify(ROOT_HANDLE_ID, root)?;
        log::info!("Library root set to {}", root.path().display());
        Ok(stored)
    }

    /// The persisted root handle, without checking it.
    pub fn stored_root(&self) -> Result<Option<DirHandle>> {
        Ok(schema::get_file_handle(self.conn, ROOT_HANDLE_ID)?
            .map(|h| DirHandle::from_token(&h.token, &h.name)))
    }

    /// Load and verify the root grant. Must precede any access under the root.
    pub fn verify_root(&self) -> Result<DirHandle> {
        let root = match self.stored_root()? {
            Some(root) => root,
            None => {
                self.record(ROOT_HANDLE_ID, HandleStatus::Missing)?;
                return Err(ShelfError::NoLibraryGranted);
            }
        };
        self.verify(ROOT_HANDLE_ID, &root)?;
        Ok(root)
    }

    /// Verify a capability and record the outcome under `identity`.
    pub fn verify<C: Capability>(&self, identity: &str, cap: &C) -> Result<()> {
        match cap.verify() {
            HandleStatus::Ok => {
                self.record(identity, HandleStatus::Ok)?;
                Ok(())
            }
            status => {
                self.record(identity, status)?;
                log::warn!("Access to '{}' ({}) is {}", cap.name(), identity, status.as_str());
                Err(ShelfError::CapabilityStale(identity.to_string()))
            }
        }
    }

    pub fn record(&self, identity: &str, status: HandleStatus) -> Result<FileHandleStatus> {
        schema::set_handle_status(self.conn, identity, status)
    }

    pub fn status(&self, identity: &str) -> Result<Option<FileHandleStatus>> {
        schema::get_handle_status(self.conn, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use tempfile::TempDir;

    #[test]
    fn test_entries_lists_immediate_children_only() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Arc One").join("nested")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        let root = DirHandle::open(tmp.path()).unwrap();

        let mut entries = root.entries().unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntryInfo { name: "Arc One".into(), kind: EntryKind::Directory },
                DirEntryInfo { name: "notes.txt".into(), kind: EntryKind::File },
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_entries_skips_dangling_symlinks() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Arc A")).unwrap();
        fs::create_dir_all(tmp.path().join("Arc B")).unwrap();
        fs::write(tmp.path().join("Arc A").join("01.mp4"), "video").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("dangling")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.mp4"), tmp.path().join("Arc A").join("03.mp4")).unwrap();

        let root = DirHandle::open(tmp.path()).unwrap();
        let mut names: Vec<_> = root.entries().unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["Arc A", "Arc B"]);

        let arc = root.subdir("Arc A").unwrap();
        let names: Vec<_> = arc.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["01.mp4"]);
    }

    #[test]
    fn test_entries_of_vanished_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("arc");
        fs::create_dir(&dir).unwrap();
        let handle = DirHandle::open(&dir).unwrap();
        fs::remove_dir(&dir).unwrap();
        assert!(handle.entries().is_err());
    }

    #[test]
    fn test_read_to_string_tolerates_latin1() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("01.txt"), b"Caf\xe9 episode").unwrap();
        let file = DirHandle::open(tmp.path()).unwrap().file("01.txt").unwrap();
        assert_eq!(file.read_to_string().unwrap(), "Caf\u{FFFD} episode");
    }

    #[test]
    fn test_open_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        let root = DirHandle::open(&tmp.path().join("a")).unwrap();
        assert!(root.subdir("..").is_err());
        assert!(root.file("../a").is_err());
        assert!(root.write_file("../escape.txt", b"x").is_err());
    }

    #[test]
    fn test_write_file_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        dir.write_file("01.txt", b"first").unwrap();
        dir.write_file("01.txt", b"second").unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("01.txt")).unwrap(), "second");
        assert!(!tmp.path().join(".tmp_01.txt").exists());
    }

    #[test]
    fn test_verify_root_without_grant_is_missing() {
        let conn = open_memory_db().unwrap();
        let mgr = HandleManager::new(&conn);
        assert!(matches!(mgr.verify_root(), Err(ShelfError::NoLibraryGranted)));
        assert_eq!(mgr.status(ROOT_HANDLE_ID).unwrap().unwrap().status, HandleStatus::Missing);
    }

    #[test]
    fn test_revoked_root_turns_stale() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("library");
        fs::create_dir_all(&lib).unwrap();
        let conn = open_memory_db().unwrap();
        let mgr = HandleManager::new(&conn);

        mgr.grant_root(&DirHandle::open(&lib).unwrap()).unwrap();
        assert!(mgr.verify_root().is_ok());
        assert_eq!(mgr.status(ROOT_HANDLE_ID).unwrap().unwrap().status, HandleStatus::Ok);

        fs::remove_dir_all(&lib).unwrap();
        let err = mgr.verify_root().unwrap_err();
        assert!(err.needs_regrant());
        assert_eq!(mgr.status(ROOT_HANDLE_ID).unwrap().unwrap().status, HandleStatus::Stale);

        // Re-granting is the recovery path
        fs::create_dir_all(&lib).unwrap();
        mgr.grant_root(&DirHandle::open(&lib).unwrap()).unwrap();
        assert!(mgr.verify_root().is_ok());
    }

    #[test]
    fn test_modified_millis_tracks_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("01.mp4");
        fs::write(&path, "video").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_600_000_000, 250_000_000))
            .unwrap();
        let dir = DirHandle::open(tmp.path()).unwrap();
        let file = dir.file("01.mp4").unwrap();
        assert_eq!(file.modified_millis().unwrap(), 1_600_000_000_250);
    }
}
