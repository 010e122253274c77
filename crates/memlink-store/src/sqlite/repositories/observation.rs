//! Observation repository.
//!
//! Observations reference `sdk_sessions.memory_session_id`, so a memory
//! session id must be registered before anything can be stored under it.

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::sqlite::row_types::ObservationRow;

/// Fields for a new observation.
#[derive(Clone, Debug, Default)]
pub struct NewObservation<'a> {
    /// Project name.
    pub project: &'a str,
    /// Observation kind.
    pub kind: &'a str,
    /// Optional short title.
    pub title: Option<&'a str>,
    /// Observation body.
    pub text: &'a str,
}

/// Observation repository. Stateless; every method takes `&Connection`.
pub struct ObservationRepo;

impl ObservationRepo {
    /// Insert an observation, returning its row id.
    ///
    /// Fails with a foreign key violation if `memory_session_id` is not
    /// registered on any session.
    pub fn insert(
        conn: &Connection,
        memory_session_id: &str,
        obs: &NewObservation<'_>,
    ) -> Result<i64> {
        let now = Utc::now();
        let _ = conn.execute(
            "INSERT INTO observations
             (memory_session_id, project, kind, title, text, created_at, created_at_epoch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                memory_session_id,
                obs.project,
                obs.kind,
                obs.title,
                obs.text,
                now.to_rfc3339(),
                now.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List observations for a memory session, oldest first.
    pub fn list_by_memory_session(
        conn: &Connection,
        memory_session_id: &str,
    ) -> Result<Vec<ObservationRow>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM observations WHERE memory_session_id = ?1
             ORDER BY created_at_epoch ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![memory_session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count observations for a memory session.
    pub fn count_by_memory_session(conn: &Connection, memory_session_id: &str) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE memory_session_id = ?1",
            params![memory_session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObservationRow> {
        Ok(ObservationRow {
            id: row.get("id")?,
            memory_session_id: row.get("memory_session_id")?,
            project: row.get("project")?,
            kind: row.get("kind")?,
            title: row.get("title")?,
            text: row.get("text")?,
            created_at: row.get("created_at")?,
            created_at_epoch: row.get("created_at_epoch")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
