//! Versioned schema for the session database.
//!
//! Each `vNNN_*.sql` file is compiled in with [`include_str!`]. Pending
//! versions are applied oldest first, one transaction per version, and
//! recorded in `schema_version` together with the time they landed. A
//! database stamped with a version this binary does not know is refused.

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Session table with link-once memory_session_id",
        sql: include_str!("v001_sessions.sql"),
    },
    Migration {
        version: 2,
        description: "Observations keyed by memory_session_id",
        sql: include_str!("v002_observations.sql"),
    },
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT    NOT NULL,
    description TEXT
)";

/// Bring the schema up to [`latest_version`], returning how many versions ran.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    conn.execute_batch(VERSION_TABLE)
        .map_err(|e| migration_error("create schema_version", &e))?;

    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(StoreError::Migration {
            message: format!("database schema v{current} is newer than supported v{latest}"),
        });
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(version = migration.version, description = migration.description, "migrating");
        apply(conn, migration)?;
        applied += 1;
    }

    debug!(from = current, to = latest, applied, "schema up to date");
    Ok(applied)
}

/// Highest version recorded in `schema_version`, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| migration_error("read schema_version", &e))
}

/// Newest version compiled into this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let step = format!("v{:03} ({})", migration.version, migration.description);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| migration_error(&step, &e))?;
    tx.execute_batch(migration.sql)
        .map_err(|e| migration_error(&step, &e))?;
    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
            params![migration.version, Utc::now().to_rfc3339(), migration.description],
        )
        .map_err(|e| migration_error(&step, &e))?;
    tx.commit().map_err(|e| migration_error(&step, &e))
}

fn migration_error(step: &str, err: &rusqlite::Error) -> StoreError {
    StoreError::Migration {
        message: format!("{step}: {err}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect()
    }

    #[test]
    fn run_migrations_creates_all_tables() {
        let conn = open_memory();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, latest_version());

        let tables = table_names(&conn);
        for expected in ["observations", "schema_version", "sdk_sessions"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        let second = run_migrations(&conn).unwrap();
        assert_eq!(second, 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn run_migrations_refuses_newer_schema() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, 'later')",
            [latest_version() + 1],
        )
        .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn memory_session_id_trigger_blocks_overwrite() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO sdk_sessions (content_session_id, memory_session_id, project, started_at, started_at_epoch)
             VALUES ('c-1', 'mem-1', 'p', '2026-01-01T00:00:00Z', 0)",
            [],
        )
        .unwrap();

        let err = conn
            .execute(
                "UPDATE sdk_sessions SET memory_session_id = 'mem-2' WHERE content_session_id = 'c-1'",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));

        let err = conn
            .execute(
                "UPDATE sdk_sessions SET memory_session_id = NULL WHERE content_session_id = 'c-1'",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn memory_session_id_trigger_allows_first_set_and_same_value() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO sdk_sessions (content_session_id, project, started_at, started_at_epoch)
             VALUES ('c-1', 'p', '2026-01-01T00:00:00Z', 0)",
            [],
        )
        .unwrap();

        conn.execute(
            "UPDATE sdk_sessions SET memory_session_id = 'mem-1' WHERE content_session_id = 'c-1'",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE sdk_sessions SET memory_session_id = 'mem-1' WHERE content_session_id = 'c-1'",
            [],
        )
        .unwrap();
    }

    #[test]
    fn observation_fk_requires_registered_memory_session() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        let err = conn
            .execute(
                "INSERT INTO observations (memory_session_id, project, kind, text, created_at, created_at_epoch)
                 VALUES ('mem-missing', 'p', 'note', 't', '2026-01-01T00:00:00Z', 0)",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"));
    }
}
