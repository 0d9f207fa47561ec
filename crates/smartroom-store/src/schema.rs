//! Database schema.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
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

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// One logical sample is split into an `input_device` row and one child row per
/// channel. Timestamps are Unix milliseconds.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS input_device (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamps INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_input_device_time
            ON input_device(timestamps);

        CREATE TABLE IF NOT EXISTS temp_sensor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input_device_id INTEGER NOT NULL UNIQUE REFERENCES input_device(id),
            temperature REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS humid_sensor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input_device_id INTEGER NOT NULL UNIQUE REFERENCES input_device(id),
            humidity REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS light_sensor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input_device_id INTEGER NOT NULL UNIQUE REFERENCES input_device(id),
            light_intensity REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS infrared_sensor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input_device_id INTEGER NOT NULL UNIQUE REFERENCES input_device(id),
            current_status INTEGER NOT NULL CHECK (current_status IN (0, 1))
        );

        CREATE TABLE IF NOT EXISTS output_device (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamps INTEGER NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('rgb_led', 'minifan', 'auto')),
            status INTEGER NOT NULL CHECK (status IN (0, 1))
        );
        CREATE INDEX IF NOT EXISTS idx_output_device_type_time
            ON output_device(type, timestamps);
        "#,
    )?;

    Ok(())
}
