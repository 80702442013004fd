// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Library, playback and handle keyspaces
    r#"
    CREATE TABLE arcs (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        cover_image TEXT,
        description TEXT,
        sort_order INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX idx_arcs_order ON arcs(sort_order);

    -- No foreign key to arcs: restored bundles are applied as-is
    CREATE TABLE episodes (
        id TEXT PRIMARY KEY NOT NULL,
        arc_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        duration REAL NOT NULL DEFAULT 0,
        thumbnail TEXT,
        sort_order INTEGER NOT NULL,
        episode_number INTEGER,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX idx_episodes_arc ON episodes(arc_id);
    CREATE INDEX idx_episodes_order ON episodes(sort_order);

    CREATE TABLE playback (
        id TEXT PRIMARY KEY NOT NULL,
        episode_id TEXT NOT NULL,
        arc_id TEXT NOT NULL,
        position REAL NOT NULL DEFAULT 0,
        duration REAL NOT NULL DEFAULT 0,
        last_watched INTEGER NOT NULL
    );
    CREATE INDEX idx_playback_arc ON playback(arc_id);
    CREATE INDEX idx_playback_episode ON playback(episode_id);

    CREATE TABLE file_handles (
        id TEXT PRIMARY KEY NOT NULL,
        token TEXT NOT NULL,
        name TEXT NOT NULL,
        saved_at INTEGER NOT NULL
    );

    CREATE TABLE handle_status (
        id TEXT PRIMARY KEY NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('ok', 'stale', 'missing')),
        last_verified INTEGER NOT NULL
    );
    "#,

    // Migration 2: Episode descriptions
    r#"
    CREATE TABLE descriptions (
        id TEXT PRIMARY KEY NOT NULL,
        episode_id TEXT NOT NULL,
        arc_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        text TEXT NOT NULL,
        source TEXT NOT NULL CHECK (source IN ('disk', 'local')),
        last_modified INTEGER NOT NULL,
        last_updated INTEGER NOT NULL
    );
    CREATE INDEX idx_descriptions_episode ON descriptions(episode_id);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    if current_version > target_version {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports (max {}). Please upgrade Arc Shelf.",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        // Each step commits together with its version bump
        conn.execute_batch(&format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        ))?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_refuses_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        assert!(run_migrations(&conn).is_err());
    }
}
