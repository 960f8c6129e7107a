use rusqlite::{Connection, Result};
use std::collections::HashMap;

/// Current database schema version
const CURRENT_VERSION: u32 = 3;

/// Migration system for managing database schema versions
pub struct MigrationManager;

impl MigrationManager {
    /// Initialize the database with the current schema
    /// This creates the schema_version table and applies all migrations
    pub fn initialize(conn: &Connection) -> Result<()> {
        // Create schema_version table to track migrations
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        // Get current version
        let current_version: u32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // Apply migrations up to current version
        for version in (current_version + 1)..=CURRENT_VERSION {
            Self::apply_migration(conn, version)?;
        }

        Ok(())
    }

    /// Apply a specific migration by version number
    fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
        let migrations = get_migrations();
        if let Some(migration) = migrations.get(&version) {
            let tx = conn.unchecked_transaction()?;
            migration(&tx)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
            log::debug!("applied schema migration v{}", version);
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some(format!("No migration found for version {}", version)),
            ))
        }
    }

    /// Get the current schema version
    pub fn get_version(conn: &Connection) -> Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

/// Get all migrations indexed by version
fn get_migrations() -> HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> {
    let mut migrations: HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> = HashMap::new();
    migrations.insert(1, migration_v1);
    migrations.insert(2, migration_v2);
    migrations.insert(3, migration_v3);
    migrations
}

/// Migration v1: projects and their stage rows
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute("PRAGMA foreign_keys=ON", [])?;

    tx.execute(
        "CREATE TABLE projects (
            id TEXT PRIMARY KEY,
            name TEXT NULL,
            requirement TEXT NOT NULL,
            requester TEXT NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL CHECK(status IN ('pending','building','paused','completed','failed')),
            progress REAL NOT NULL DEFAULT 0,
            total_stages INTEGER NOT NULL DEFAULT 0,
            completed_stages INTEGER NOT NULL DEFAULT 0,
            error_json TEXT NULL,
            created_ts INTEGER NOT NULL,
            updated_ts INTEGER NOT NULL,
            completed_ts INTEGER NULL
        )",
        [],
    )?;

    // One row per pipeline stage; position is the stage's pipeline order
    tx.execute(
        "CREATE TABLE stages (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending','running','completed','failed')),
            started_ts INTEGER NULL,
            completed_ts INTEGER NULL,
            duration_secs INTEGER NULL,
            error TEXT NULL,
            PRIMARY KEY (project_id, position)
        )",
        [],
    )?;

    tx.execute(
        "CREATE INDEX idx_projects_status ON projects(status)",
        [],
    )?;

    Ok(())
}

/// Migration v2: stage log lines and development sub-stages
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "ALTER TABLE stages ADD COLUMN logs_json TEXT NOT NULL DEFAULT '[]'",
        [],
    )?;

    tx.execute(
        "CREATE TABLE sub_stages (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending','running','completed','failed')),
            artifacts_json TEXT NOT NULL DEFAULT '[]',
            started_ts INTEGER NULL,
            completed_ts INTEGER NULL,
            PRIMARY KEY (project_id, position)
        )",
        [],
    )?;

    Ok(())
}

/// Migration v3: record version for conditional writes
fn migration_v3(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "ALTER TABLE projects ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}
