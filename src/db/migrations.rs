use rusqlite::{Connection, Result};
use std::collections::HashMap;

/// Current database schema version
const CURRENT_VERSION: u32 = 2;

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
            // Execute migration in a transaction
            let tx = conn.unchecked_transaction()?;
            migration(&tx)?;
            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
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
    migrations
}

/// Migration v1: Initial schema
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    // Work orders (header)
    tx.execute(
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            of_number TEXT NOT NULL UNIQUE,
            model_code TEXT NOT NULL,
            model_label TEXT NOT NULL,
            color_code TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK(quantity > 0),
            observation TEXT NULL,
            created_ts INTEGER NOT NULL
        )",
        [],
    )?;

    // One timer per (order, stage). The three stage blocks of the original
    // layout are structurally identical, so they share one table; the
    // recut columns only carry meaning for the cut stage.
    tx.execute(
        "CREATE TABLE stage_timers (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            stage TEXT NOT NULL CHECK(stage IN ('cut','control','stitch')),
            status TEXT NOT NULL CHECK(status IN ('pending','active','done')),
            paused INTEGER NOT NULL DEFAULT 0,
            active_secs INTEGER NOT NULL DEFAULT 0,
            pause_secs INTEGER NOT NULL DEFAULT 0,
            last_reconciled_ts INTEGER NULL,
            started_ts INTEGER NULL,
            finished_ts INTEGER NULL,
            recut_active_secs INTEGER NOT NULL DEFAULT 0,
            recut_count INTEGER NOT NULL DEFAULT 0,
            recut_started_ts INTEGER NULL,
            quantity_override INTEGER NULL,
            UNIQUE(order_id, stage)
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_stage_timers_status ON stage_timers(status)",
        [],
    )?;

    // Quality totals for the control stage
    tx.execute(
        "CREATE TABLE control_ledgers (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL UNIQUE REFERENCES orders(id) ON DELETE CASCADE,
            session_target INTEGER NOT NULL DEFAULT 0,
            controlled INTEGER NOT NULL DEFAULT 0,
            accepted INTEGER NOT NULL DEFAULT 0,
            rejected INTEGER NOT NULL DEFAULT 0,
            rework INTEGER NOT NULL DEFAULT 0,
            returned INTEGER NOT NULL DEFAULT 0,
            outcome TEXT NULL,
            observation TEXT NULL
        )",
        [],
    )?;

    // Immutable per-session quality records
    tx.execute(
        "CREATE TABLE quality_sessions (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            session_no INTEGER NOT NULL,
            accepted INTEGER NOT NULL,
            rejected INTEGER NOT NULL,
            rework INTEGER NOT NULL,
            observation TEXT NULL,
            recorded_ts INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_quality_sessions_order ON quality_sessions(order_id, session_no)",
        [],
    )?;

    Ok(())
}

/// Migration v2: status-change history
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE history (
            id INTEGER PRIMARY KEY,
            order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            stage TEXT NOT NULL,
            old_status TEXT NULL,
            new_status TEXT NOT NULL,
            note TEXT NULL,
            changed_ts INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_history_order ON history(order_id, changed_ts)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_applies_all_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::initialize(&conn).unwrap();
        assert_eq!(MigrationManager::get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::initialize(&conn).unwrap();
        MigrationManager::initialize(&conn).unwrap();
        assert_eq!(MigrationManager::get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationManager::initialize(&conn).unwrap();

        for table in ["orders", "stage_timers", "control_ledgers", "quality_sessions", "history"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
