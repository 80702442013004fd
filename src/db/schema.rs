// Database schema types and query helpers

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShelfError};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ----- Arc -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
    pub order: i64,
    pub created_at: i64,
}

const ARC_COLUMNS: &str = "id, name, display_name, cover_image, description, sort_order, created_at";

fn row_to_arc(row: &Row) -> rusqlite::Result<ArcRecord> {
    Ok(ArcRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        cover_image: row.get(3)?,
        description: row.get(4)?,
        order: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Insert or replace an arc by id.
pub fn upsert_arc(conn: &Connection, arc: &ArcRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO arcs (id, name, display_name, cover_image, description, sort_order, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            arc.id,
            arc.name,
            arc.display_name,
            arc.cover_image,
            arc.description,
            arc.order,
            arc.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_arc(conn: &Connection, id: &str) -> Result<Option<ArcRecord>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM arcs WHERE id = ?1", ARC_COLUMNS),
            params![id],
            row_to_arc,
        )
        .optional()?;
    Ok(result)
}

/// All arcs by presentation order.
pub fn list_arcs(conn: &Connection) -> Result<Vec<ArcRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM arcs ORDER BY sort_order, id",
        ARC_COLUMNS
    ))?;
    let arcs = stmt
        .query_map([], row_to_arc)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(arcs)
}

pub fn count_arcs(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM arcs", [], |row| row.get(0))?;
    Ok(count)
}

pub fn update_arc_description(conn: &Connection, id: &str, description: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE arcs SET description = ?1 WHERE id = ?2",
        params![description, id],
    )?;
    if changed == 0 {
        return Err(ShelfError::ArcNotFound(id.to_string()));
    }
    Ok(())
}

/// Delete an arc and every episode it owns. Progress and descriptions are kept.
pub fn delete_arc(conn: &Connection, id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let episodes = tx.execute("DELETE FROM episodes WHERE arc_id = ?1", params![id])?;
    let arcs = tx.execute("DELETE FROM arcs WHERE id = ?1", params![id])?;
    if arcs == 0 {
        return Err(ShelfError::ArcNotFound(id.to_string()));
    }
    tx.commit()?;
    Ok(episodes)
}

// ----- Episode -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub arc_id: String,
    pub file_name: String,
    pub display_name: String,
    pub duration: f64,
    /// Inline `data:` URI of the poster frame.
    pub thumbnail: Option<String>,
    pub order: i64,
    pub episode_number: Option<u32>,
    pub created_at: i64,
}

/// Episode id for the n-th (1-based) episode discovered in an arc.
pub fn episode_id(arc_id: &str, n: usize) -> String {
    format!("{}-ep-{}", arc_id, n)
}

const EPISODE_COLUMNS: &str =
    "id, arc_id, file_name, display_name, duration, thumbnail, sort_order, episode_number, created_at";

fn row_to_episode(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        arc_id: row.get(1)?,
        file_name: row.get(2)?,
        display_name: row.get(3)?,
        duration: row.get(4)?,
        thumbnail: row.get(5)?,
        order: row.get(6)?,
        episode_number: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn upsert_episode(conn: &Connection, episode: &Episode) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO episodes
            (id, arc_id, file_name, display_name, duration, thumbnail, sort_order, episode_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            episode.id,
            episode.arc_id,
            episode.file_name,
            episode.display_name,
            episode.duration,
            episode.thumbnail,
            episode.order,
            episode.episode_number,
            episode.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_episode(conn: &Connection, id: &str) -> Result<Option<Episode>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM episodes WHERE id = ?1", EPISODE_COLUMNS),
            params![id],
            row_to_episode,
        )
        .optional()?;
    Ok(result)
}

pub fn find_episode_by_file(conn: &Connection, arc_id: &str, file_name: &str) -> Result<Option<Episode>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {} FROM episodes WHERE arc_id = ?1 AND file_name = ?2",
                EPISODE_COLUMNS
            ),
            params![arc_id, file_name],
            row_to_episode,
        )
        .optional()?;
    Ok(result)
}

pub fn episode_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM episodes WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Episodes of one arc by order.
pub fn list_episodes(conn: &Connection, arc_id: &str) -> Result<Vec<Episode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM episodes WHERE arc_id = ?1 ORDER BY sort_order, id",
        EPISODE_COLUMNS
    ))?;
    let episodes = stmt
        .query_map(params![arc_id], row_to_episode)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(episodes)
}

pub fn list_all_episodes(conn: &Connection) -> Result<Vec<Episode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM episodes ORDER BY arc_id, sort_order, id",
        EPISODE_COLUMNS
    ))?;
    let episodes = stmt
        .query_map([], row_to_episode)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(episodes)
}

pub fn delete_episode(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM episodes WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(ShelfError::EpisodeNotFound(id.to_string()));
    }
    Ok(())
}

// ----- Playback progress -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgress {
    /// Stable id: `{arcId}::{fileName}::{lastModifiedMillis}`.
    pub id: String,
    pub episode_id: String,
    pub arc_id: String,
    pub current_time: f64,
    pub duration: f64,
    pub last_watched: i64,
}

const PLAYBACK_COLUMNS: &str = "id, episode_id, arc_id, position, duration, last_watched";

fn row_to_playback(row: &Row) -> rusqlite::Result<PlaybackProgress> {
    Ok(PlaybackProgress {
        id: row.get(0)?,
        episode_id: row.get(1)?,
        arc_id: row.get(2)?,
        current_time: row.get(3)?,
        duration: row.get(4)?,
        last_watched: row.get(5)?,
    })
}

pub fn upsert_playback(conn: &Connection, progress: &PlaybackProgress) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO playback (id, episode_id, arc_id, position, duration, last_watched)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            progress.id,
            progress.episode_id,
            progress.arc_id,
            progress.current_time,
            progress.duration,
            progress.last_watched,
        ],
    )?;
    Ok(())
}

pub fn get_playback(conn: &Connection, id: &str) -> Result<Option<PlaybackProgress>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM playback WHERE id = ?1", PLAYBACK_COLUMNS),
            params![id],
            row_to_playback,
        )
        .optional()?;
    Ok(result)
}

fn query_playback(conn: &Connection, filter: &str, value: Option<&str>) -> Result<Vec<PlaybackProgress>> {
    let sql = format!("SELECT {} FROM playback {} ORDER BY id", PLAYBACK_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = match value {
        Some(v) => stmt.query_map(params![v], row_to_playback)?,
        None => stmt.query_map([], row_to_playback)?,
    };
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_playback(conn: &Connection) -> Result<Vec<PlaybackProgress>> {
    query_playback(conn, "", None)
}

pub fn list_playback_for_arc(conn: &Connection, arc_id: &str) -> Result<Vec<PlaybackProgress>> {
    query_playback(conn, "WHERE arc_id = ?1", Some(arc_id))
}

/// Every progress record ever written for an episode, across file versions.
pub fn list_playback_for_episode(conn: &Connection, episode_id: &str) -> Result<Vec<PlaybackProgress>> {
    query_playback(conn, "WHERE episode_id = ?1", Some(episode_id))
}

// ----- File handles -----

/// A persisted directory capability. `token` is opaque to everything but the handle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredHandle {
    pub id: String,
    pub token: String,
    pub name: String,
    pub saved_at: i64,
}

pub fn save_file_handle(conn: &Connection, handle: &StoredHandle) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO file_handles (id, token, name, saved_at) VALUES (?1, ?2, ?3, ?4)",
        params![handle.id, handle.token, handle.name, handle.saved_at],
    )?;
    Ok(())
}

pub fn get_file_handle(conn: &Connection, id: &str) -> Result<Option<StoredHandle>> {
    let result = conn
        .query_row(
            "SELECT id, token, name, saved_at FROM file_handles WHERE id = ?1",
            params![id],
            |row| {
                Ok(StoredHandle {
                    id: row.get(0)?,
                    token: row.get(1)?,
                    name: row.get(2)?,
                    saved_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}

// ----- Handle status -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleStatus {
    Ok,
    Stale,
    Missing,
}

impl HandleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleStatus::Ok => "ok",
            HandleStatus::Stale => "stale",
            HandleStatus::Missing => "missing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(HandleStatus::Ok),
            "stale" => Some(HandleStatus::Stale),
            "missing" => Some(HandleStatus::Missing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandleStatus {
    pub id: String,
    pub status: HandleStatus,
    pub last_verified: i64,
}

fn row_to_status(row: &Row) -> rusqlite::Result<FileHandleStatus> {
    let raw: String = row.get(1)?;
    let status = HandleStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown handle status '{}'", raw).into(),
        )
    })?;
    Ok(FileHandleStatus {
        id: row.get(0)?,
        status,
        last_verified: row.get(2)?,
    })
}

/// Overwrite the last verification outcome for an identity.
pub fn set_handle_status(conn: &Connection, id: &str, status: HandleStatus) -> Result<FileHandleStatus> {
    let record = FileHandleStatus {
        id: id.to_string(),
        status,
        last_verified: now_millis(),
    };
    conn.execute(
        "INSERT OR REPLACE INTO handle_status (id, status, last_verified) VALUES (?1, ?2, ?3)",
        params![record.id, record.status.as_str(), record.last_verified],
    )?;
    Ok(record)
}

pub fn get_handle_status(conn: &Connection, id: &str) -> Result<Option<FileHandleStatus>> {
    let result = conn
        .query_row(
            "SELECT id, status, last_verified FROM handle_status WHERE id = ?1",
            params![id],
            row_to_status,
        )
        .optional()?;
    Ok(result)
}

pub fn list_handle_statuses(conn: &Connection) -> Result<Vec<FileHandleStatus>> {
    let mut stmt = conn.prepare("SELECT id, status, last_verified FROM handle_status ORDER BY id")?;
    let rows = stmt
        .query_map([], row_to_status)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ----- Episode descriptions -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionSource {
    /// Text mirrors a sidecar file next to the video.
    Disk,
    /// Text exists only in the store.
    Local,
}

impl DescriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionSource::Disk => "disk",
            DescriptionSource::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeDescription {
    pub id: String,
    pub episode_id: String,
    pub arc_id: String,
    pub file_name: String,
    pub text: String,
    pub source: DescriptionSource,
    /// Modification time of the video file this text was pinned to.
    pub last_modified: i64,
    pub last_updated: i64,
}

pub fn description_id(episode_id: &str) -> String {
    format!("{}-desc", episode_id)
}

pub fn upsert_description(conn: &Connection, desc: &EpisodeDescription) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO descriptions
            (id, episode_id, arc_id, file_name, text, source, last_modified, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            desc.id,
            desc.episode_id,
            desc.arc_id,
            desc.file_name,
            desc.text,
            desc.source.as_str(),
            desc.last_modified,
            desc.last_updated,
        ],
    )?;
    Ok(())
}

pub fn get_description(conn: &Connection, episode_id: &str) -> Result<Option<EpisodeDescription>> {
    let result = conn
        .query_row(
            "SELECT id, episode_id, arc_id, file_name, text, source, last_modified, last_updated
             FROM descriptions WHERE id = ?1",
            params![description_id(episode_id)],
            |row| {
                let source: String = row.get(5)?;
                Ok(EpisodeDescription {
                    id: row.get(0)?,
                    episode_id: row.get(1)?,
                    arc_id: row.get(2)?,
                    file_name: row.get(3)?,
                    text: row.get(4)?,
                    source: if source == "disk" {
                        DescriptionSource::Disk
                    } else {
                        DescriptionSource::Local
                    },
                    last_modified: row.get(6)?,
                    last_updated: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}
