//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        migrate(conn, 1)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Monitoring sites, keyed locally by a surrogate id that never changes
        CREATE TABLE IF NOT EXISTS sites (
            site_id INTEGER PRIMARY KEY AUTOINCREMENT,
            site_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            classification TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            photo_url TEXT,
            description TEXT,
            region TEXT,
            start_date INTEGER,
            end_date INTEGER,
            updated_at INTEGER NOT NULL
        );

        -- Hourly values, one row per (site, series, timestamp)
        CREATE TABLE IF NOT EXISTS readings (
            site_id INTEGER NOT NULL REFERENCES sites(site_id),
            series TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (site_id, series, timestamp)
        ) WITHOUT ROWID;
        CREATE INDEX IF NOT EXISTS idx_readings_series_value
            ON readings(series, value);
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    if old_version < 2 {
        migrate_to_v2(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Version 2: locally maintained status for sites whose published status
/// is wrong. Re-imports never touch it.
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch("ALTER TABLE sites ADD COLUMN status_override TEXT;")?;
    Ok(())
}
