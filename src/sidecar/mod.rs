// Episode description sidecars
//
// A description can live in the store, in a `<video stem>.txt` file next to
// the video, or both. The cached copy is pinned to the video's modification
// time; once that changes, the sidecar on disk is authoritative again.

use rusqlite::Connection;

use crate::constants::SIDECAR_EXTENSION;
use crate::db::schema::{self, DescriptionSource, Episode, EpisodeDescription};
use crate::error::{Result, ShelfError};
use crate::handles::{DirHandle, EntryKind, FileHandle};
use crate::ingest::discover::file_stem;

/// Exact sidecar name for a video file.
pub fn sidecar_name(video_file_name: &str) -> String {
    format!("{}.{}", file_stem(video_file_name), SIDECAR_EXTENSION)
}

/// Locate the sidecar for a video: exact name first, then a case-insensitive scan.
pub fn find_sidecar(arc_dir: &DirHandle, video_file_name: &str) -> Option<FileHandle> {
    let exact = sidecar_name(video_file_name);
    if let Ok(file) = arc_dir.file(&exact) {
        return Some(file);
    }

    let stem = file_stem(video_file_name);
    let entries = arc_dir.entries().ok()?;
    entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .find(|e| {
            let (base, ext) = match e.name.rsplit_once('.') {
                Some(parts) => parts,
                None => return false,
            };
            ext.eq_ignore_ascii_case(SIDECAR_EXTENSION) && base.to_lowercase() == stem.to_lowercase()
        })
        .and_then(|e| arc_dir.file(&e.name).ok())
}

/// Read the sidecar for a video, if there is one.
pub fn read_sidecar(arc_dir: &DirHandle, video_file_name: &str) -> Result<Option<String>> {
    match find_sidecar(arc_dir, video_file_name) {
        Some(file) => Ok(Some(file.read_to_string()?)),
        None => Ok(None),
    }
}

/// Write the sidecar, creating it when absent. An existing case-variant file is overwritten in place.
pub fn write_sidecar(arc_dir: &DirHandle, video_file_name: &str, text: &str) -> Result<()> {
    let target = find_sidecar(arc_dir, video_file_name)
        .and_then(|f| f.path().file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| sidecar_name(video_file_name));

    arc_dir
        .write_file(&target, text.as_bytes())
        .map_err(|source| ShelfError::SidecarWrite { file: target, source })
}

fn build_record(episode: &Episode, text: String, source: DescriptionSource, file_modified: i64) -> EpisodeDescription {
    EpisodeDescription {
        id: schema::description_id(&episode.id),
        episode_id: episode.id.clone(),
        arc_id: episode.arc_id.clone(),
        file_name: episode.file_name.clone(),
        text,
        source,
        last_modified: file_modified,
        last_updated: schema::now_millis(),
    }
}

/// Resolve the description to show for an episode at load time.
///
/// A cache entry pinned to `file_modified` is returned without touching disk.
/// Otherwise a sidecar, when found, replaces the cache. Failing both, any
/// cached text is returned regardless of its pin, marked as local. The stored
/// row is left as it was.
pub fn reconcile(
    conn: &Connection,
    arc_dir: Option<&DirHandle>,
    episode: &Episode,
    file_modified: i64,
) -> Result<Option<EpisodeDescription>> {
    let cached = schema::get_description(conn, &episode.id)?;

    if let Some(ref desc) = cached {
        if desc.last_modified == file_modified {
            return Ok(cached);
        }
    }

    if let Some(dir) = arc_dir {
        match read_sidecar(dir, &episode.file_name) {
            Ok(Some(text)) => {
                let record = build_record(episode, text, DescriptionSource::Disk, file_modified);
                schema::upsert_description(conn, &record)?;
                return Ok(Some(record));
            }
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read sidecar for {}: {}", episode.file_name, e),
        }
    }

    // The text now lives only in the store, whatever its origin
    Ok(cached.map(|desc| EpisodeDescription {
        source: DescriptionSource::Local,
        ..desc
    }))
}

/// What happened to the on-disk half of a save.
#[derive(Debug)]
pub enum DiskWrite {
    /// The caller asked for a local-only save.
    NotRequested,
    /// No arc directory handle was held, so nothing was attempted.
    NoDirectory,
    Written,
    Failed(ShelfError),
}

#[derive(Debug)]
pub struct SaveOutcome {
    /// The record now in the store. Always written, even when the disk write failed.
    pub record: EpisodeDescription,
    pub disk: DiskWrite,
}

impl SaveOutcome {
    /// True only when every requested write landed.
    pub fn is_complete(&self) -> bool {
        !matches!(self.disk, DiskWrite::Failed(_) | DiskWrite::NoDirectory)
    }
}

/// Save a description to the store and, when asked, to the sidecar file.
///
/// An `Err` means the store write itself failed. Sidecar failures are reported
/// through `SaveOutcome::disk` after the store already holds the new text.
pub fn save_description(
    conn: &Connection,
    arc_dir: Option<&DirHandle>,
    episode: &Episode,
    text: &str,
    to_disk: bool,
    file_modified: i64,
) -> Result<SaveOutcome> {
    let local = build_record(episode, text.to_string(), DescriptionSource::Local, file_modified);
    schema::upsert_description(conn, &local)?;

    if !to_disk {
        return Ok(SaveOutcome {
            record: local,
            disk: DiskWrite::NotRequested,
        });
    }

    let dir = match arc_dir {
        Some(dir) => dir,
        None => {
            return Ok(SaveOutcome {
                record: local,
                disk: DiskWrite::NoDirectory,
            })
        }
    };

    match write_sidecar(dir, &episode.file_name, text) {
        Ok(()) => {
            let record = EpisodeDescription {
                source: DescriptionSource::Disk,
                ..local
            };
            schema::upsert_description(conn, &record)?;
            Ok(SaveOutcome {
                record,
                disk: DiskWrite::Written,
            })
        }
        Err(e) => {
            log::error!("Description for {} saved locally only: {}", episode.file_name, e);
            Ok(SaveOutcome {
                record: local,
                disk: DiskWrite::Failed(e),
            })
        }
    }
}
