// Library sync module
//
// Turns the scanned directory tree into arc and episode records. Sync only
// adds: existing records keep their ids, order and created_at untouched.

pub mod discover;
pub mod natural;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::schema::{self, ArcRecord, Episode};
use crate::error::Result;
use crate::handles::{DirHandle, HandleManager};
use crate::preview::{FrameGrabber, ThumbOptions};

use discover::{discover_arcs, discover_episodes, find_cover, DiscoveredArc, DiscoveredEpisode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub arcs_found: usize,
    pub arcs_added: Vec<String>,
    pub episodes_found: usize,
    pub episodes_added: Vec<String>,
    pub thumbnails_failed: usize,
    pub errors: Vec<String>,
}

/// Verify the root grant, then sync everything under it.
pub fn sync_library(
    conn: &Connection,
    handles: &HandleManager,
    grabber: &dyn FrameGrabber,
    options: &ThumbOptions,
) -> Result<SyncResult> {
    let root = handles.verify_root()?;
    sync_from_root(conn, &root, grabber, options)
}

/// Sync a library tree that has already been verified.
pub fn sync_from_root(
    conn: &Connection,
    root: &DirHandle,
    grabber: &dyn FrameGrabber,
    options: &ThumbOptions,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let mut seen: HashSet<String> = HashSet::new();

    for arc in discover_arcs(root) {
        result.arcs_found += 1;

        if !seen.insert(arc.id.clone()) {
            log::warn!("Skipping '{}': arc id '{}' already used in this library", arc.name, arc.id);
            result.errors.push(format!("Duplicate arc id '{}' for directory '{}'", arc.id, arc.name));
            continue;
        }

        let arc_dir = match root.subdir(&arc.name) {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("Arc directory '{}' vanished during sync: {}", arc.name, e);
                result.errors.push(format!("{}: {}", arc.name, e));
                continue;
            }
        };

        if register_arc(conn, &arc, &arc_dir)? {
            result.arcs_added.push(arc.id.clone());
        }

        sync_arc_episodes(conn, &arc.id, &arc_dir, grabber, options, &mut result)?;
    }

    log::info!(
        "Library sync: {} arcs ({} new), {} episodes ({} new)",
        result.arcs_found,
        result.arcs_added.len(),
        result.episodes_found,
        result.episodes_added.len()
    );

    Ok(result)
}

/// Insert a newly discovered arc. Returns false when it was already known.
fn register_arc(conn: &Connection, arc: &DiscoveredArc, arc_dir: &DirHandle) -> Result<bool> {
    if schema::get_arc(conn, &arc.id)?.is_some() {
        return Ok(false);
    }

    let record = ArcRecord {
        id: arc.id.clone(),
        name: arc.name.clone(),
        display_name: arc.display_name.clone(),
        cover_image: find_cover(arc_dir),
        description: None,
        order: schema::count_arcs(conn)?,
        created_at: schema::now_millis(),
    };
    schema::upsert_arc(conn, &record)?;
    Ok(true)
}

/// Scan one arc directory and register episodes not seen before.
pub fn sync_arc_episodes(
    conn: &Connection,
    arc_id: &str,
    arc_dir: &DirHandle,
    grabber: &dyn FrameGrabber,
    options: &ThumbOptions,
    result: &mut SyncResult,
) -> Result<()> {
    for (index, found) in discover_episodes(arc_dir).into_iter().enumerate() {
        result.episodes_found += 1;

        if schema::find_episode_by_file(conn, arc_id, &found.file_name)?.is_some() {
            continue;
        }

        let id = next_free_episode_id(conn, arc_id, index + 1)?;
        let episode = build_episode(arc_id, &id, index, &found, arc_dir, grabber, options, result);
        schema::upsert_episode(conn, &episode)?;
        result.episodes_added.push(id);
    }
    Ok(())
}

/// `{arcId}-ep-{n}`, bumping n past ids already held by other files.
fn next_free_episode_id(conn: &Connection, arc_id: &str, mut n: usize) -> Result<String> {
    loop {
        let id = schema::episode_id(arc_id, n);
        if !schema::episode_exists(conn, &id)? {
            return Ok(id);
        }
        n += 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn build_episode(
    arc_id: &str,
    id: &str,
    index: usize,
    found: &DiscoveredEpisode,
    arc_dir: &DirHandle,
    grabber: &dyn FrameGrabber,
    options: &ThumbOptions,
    result: &mut SyncResult,
) -> Episode {
    let capture = arc_dir
        .file(&found.file_name)
        .and_then(|file| grabber.capture(file.path(), options));

    let (thumbnail, duration) = match capture {
        Ok(c) => (Some(c.data_uri()), c.duration_secs),
        Err(e) => {
            log::warn!("No thumbnail for {}: {}", found.file_name, e);
            result.thumbnails_failed += 1;
            (None, 0.0)
        }
    };

    Episode {
        id: id.to_string(),
        arc_id: arc_id.to_string(),
        file_name: found.file_name.clone(),
        display_name: found.display_name.clone(),
        duration,
        thumbnail,
        order: index as i64,
        episode_number: found.episode_number,
        created_at: schema::now_millis(),
    }
}
