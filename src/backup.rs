// Backup bundle export and import
//
// A bundle carries the arcs, episodes and playback records as one JSON
// document. Thumbnails travel inline on episodes. Handle grants and cached
// episode descriptions are machine-local and never exported.

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::constants::BACKUP_VERSION;
use crate::db::schema::{self, ArcRecord, Episode, PlaybackProgress};
use crate::error::{Result, ShelfError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub version: u32,
    pub exported_at: String,
    #[serde(default)]
    pub arcs: Vec<ArcRecord>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub playback: Vec<PlaybackProgress>,
}

/// Counts of records written by an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub arcs: usize,
    pub episodes: usize,
    pub playback: usize,
    /// Playback records replaced by an entry with an older lastWatched.
    pub regressed: usize,
}

/// Snapshot the full contents of the three exported tables.
pub fn export_bundle(conn: &Connection) -> Result<BackupBundle> {
    Ok(BackupBundle {
        version: BACKUP_VERSION,
        exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        arcs: schema::list_arcs(conn)?,
        episodes: schema::list_all_episodes(conn)?,
        playback: schema::list_playback(conn)?,
    })
}

pub fn export_json(conn: &Connection) -> Result<String> {
    let bundle = export_bundle(conn)?;
    let json = serde_json::to_string_pretty(&bundle)?;
    log::info!(
        "Exported {} arcs, {} episodes, {} playback records",
        bundle.arcs.len(),
        bundle.episodes.len(),
        bundle.playback.len()
    );
    Ok(json)
}

/// Parse a bundle without touching the store.
pub fn parse_bundle(json: &str) -> Result<BackupBundle> {
    serde_json::from_str(json).map_err(|e| ShelfError::Format(e.to_string()))
}

/// Restore a bundle. Every record replaces the stored record with the same id.
///
/// Parsing happens before the transaction opens, so malformed input leaves the
/// store untouched. Records are not checked against each other: an episode
/// whose arc is absent is still written.
pub fn import_json(conn: &Connection, json: &str) -> Result<ImportSummary> {
    let bundle = parse_bundle(json)?;
    import_bundle(conn, &bundle)
}

pub fn import_bundle(conn: &Connection, bundle: &BackupBundle) -> Result<ImportSummary> {
    if bundle.version != BACKUP_VERSION {
        log::warn!(
            "Backup version {} differs from {}; importing anyway",
            bundle.version,
            BACKUP_VERSION
        );
    }

    let mut summary = ImportSummary::default();
    let tx = conn.unchecked_transaction()?;

    for arc in &bundle.arcs {
        schema::upsert_arc(&tx, arc)?;
        summary.arcs += 1;
    }
    for episode in &bundle.episodes {
        schema::upsert_episode(&tx, episode)?;
        summary.episodes += 1;
    }
    for progress in &bundle.playback {
        if let Some(existing) = schema::get_playback(&tx, &progress.id)? {
            if existing.last_watched > progress.last_watched {
                log::warn!(
                    "Restoring older progress for {} ({}s -> {}s)",
                    progress.id,
                    existing.current_time,
                    progress.current_time
                );
                summary.regressed += 1;
            }
        }
        schema::upsert_playback(&tx, progress)?;
        summary.playback += 1;
    }

    tx.commit()?;

    log::info!(
        "Imported backup from {}: {} arcs, {} episodes, {} playback records",
        bundle.exported_at,
        summary.arcs,
        summary.episodes,
        summary.playback
    );
    Ok(summary)
}
