//! Database migrations

use rusqlite::Connection;

use crate::error::ApiError;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<(), ApiError> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32, ApiError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &mut Connection) -> Result<(), ApiError> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            token_salt TEXT NOT NULL,
            token_hash TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            due_date TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'open',
            position INTEGER NOT NULL DEFAULT 0,
            edited_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            created_by TEXT NOT NULL REFERENCES users(id),
            updated_by TEXT NOT NULL REFERENCES users(id)
        );
        CREATE INDEX IF NOT EXISTS idx_todos_updated ON todos(updated_at_ms);

        CREATE TABLE IF NOT EXISTS tombstones (
            server_id TEXT PRIMARY KEY,
            deleted_at_ms INTEGER NOT NULL,
            recorded_at_ms INTEGER NOT NULL,
            deleted_by TEXT NOT NULL REFERENCES users(id)
        );
        CREATE INDEX IF NOT EXISTS idx_tombstones_recorded ON tombstones(recorded_at_ms);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
