//! Session repository: session rows and memory session id registration.
//!
//! Registration is a compare-and-set on `memory_session_id`: the column moves
//! from `NULL` to a value exactly once. [`SessionRepo::register_memory_session_id`]
//! reports which of the possible outcomes happened; it does not open its own
//! transaction, so callers that race on the same row must run it inside an
//! `IMMEDIATE` transaction (see [`crate::store::SessionStore`]).

use chrono::Utc;
use memlink_core::SessionDbId;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::SessionRow;

/// Lifecycle state stored in `sdk_sessions.status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session is running.
    Active,
    /// Session finished normally.
    Completed,
    /// Session ended with an error.
    Failed,
}

impl SessionStatus {
    /// Column value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a column value.
    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Result of a memory session id registration attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The column was unset and now holds the candidate.
    Registered,
    /// The column already held the candidate; nothing was written.
    AlreadyRegistered,
    /// The column holds a different value; nothing was written.
    Conflict {
        /// Value currently bound.
        existing: String,
    },
    /// The candidate is bound to another session; nothing was written.
    Taken {
        /// Session that owns the candidate.
        owner: SessionDbId,
    },
    /// No session row with that id.
    NotFound,
}

/// Options for listing sessions.
#[derive(Default)]
pub struct ListSessionsOptions<'a> {
    /// Filter by project.
    pub project: Option<&'a str>,
    /// Filter by status.
    pub status: Option<SessionStatus>,
    /// Maximum results.
    pub limit: Option<i64>,
}

/// Session repository. Stateless; every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Create a session, or return the existing one for `content_session_id`.
    ///
    /// An existing row is left untouched except that an empty `project` is
    /// backfilled when a non-empty one is supplied.
    pub fn create(
        conn: &Connection,
        content_session_id: &str,
        project: &str,
        user_prompt: Option<&str>,
    ) -> Result<SessionDbId> {
        let now = Utc::now();
        let _ = conn.execute(
            "INSERT OR IGNORE INTO sdk_sessions
             (content_session_id, project, user_prompt, started_at, started_at_epoch, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active')",
            params![
                content_session_id,
                project,
                user_prompt,
                now.to_rfc3339(),
                now.timestamp_millis(),
            ],
        )?;

        if !project.is_empty() {
            let _ = conn.execute(
                "UPDATE sdk_sessions SET project = ?1
                 WHERE content_session_id = ?2 AND project = ''",
                params![project, content_session_id],
            )?;
        }

        let id = conn.query_row(
            "SELECT id FROM sdk_sessions WHERE content_session_id = ?1",
            params![content_session_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get session by primary key.
    pub fn get_by_id(conn: &Connection, id: SessionDbId) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM sdk_sessions WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get session by the originating system's session id.
    pub fn get_by_content_session_id(
        conn: &Connection,
        content_session_id: &str,
    ) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM sdk_sessions WHERE content_session_id = ?1",
                params![content_session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get session by its registered memory session id.
    pub fn get_by_memory_session_id(
        conn: &Connection,
        memory_session_id: &str,
    ) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM sdk_sessions WHERE memory_session_id = ?1",
                params![memory_session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Check if session exists.
    pub fn exists(conn: &Connection, id: SessionDbId) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sdk_sessions WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Bind `candidate` as the memory session id of session `id`.
    ///
    /// Writes only on [`RegisterOutcome::Registered`].
    pub fn register_memory_session_id(
        conn: &Connection,
        id: SessionDbId,
        candidate: &str,
    ) -> Result<RegisterOutcome> {
        if let Some(outcome) = classify(Self::read_memory_session_id(conn, id)?, candidate) {
            return Ok(outcome);
        }

        if let Some(owner) = Self::memory_session_owner(conn, candidate)? {
            return Ok(RegisterOutcome::Taken { owner });
        }

        let changed = conn.execute(
            "UPDATE sdk_sessions SET memory_session_id = ?1
             WHERE id = ?2 AND memory_session_id IS NULL",
            params![candidate, id],
        )?;
        if changed > 0 {
            return Ok(RegisterOutcome::Registered);
        }

        // Another connection bound the row between our read and write.
        Ok(
            classify(Self::read_memory_session_id(conn, id)?, candidate)
                .unwrap_or(RegisterOutcome::NotFound),
        )
    }

    /// Increment the prompt counter, returning the new value.
    ///
    /// Returns `None` if the session does not exist.
    pub fn increment_prompt_counter(conn: &Connection, id: SessionDbId) -> Result<Option<i64>> {
        let counter = conn
            .query_row(
                "UPDATE sdk_sessions SET prompt_counter = prompt_counter + 1
                 WHERE id = ?1 RETURNING prompt_counter",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(counter)
    }

    /// Move an active session to `completed` or `failed`.
    ///
    /// Returns `false` if the session is missing or no longer active.
    pub fn finish(conn: &Connection, id: SessionDbId, status: SessionStatus) -> Result<bool> {
        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE sdk_sessions SET status = ?1, completed_at = ?2, completed_at_epoch = ?3
             WHERE id = ?4 AND status = 'active'",
            params![status.as_str(), now.to_rfc3339(), now.timestamp_millis(), id],
        )?;
        Ok(changed > 0)
    }

    /// List sessions, newest first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        use std::fmt::Write;
        let mut sql = String::from("SELECT * FROM sdk_sessions WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(project) = opts.project {
            let _ = write!(sql, " AND project = ?{}", param_values.len() + 1);
            param_values.push(Box::new(project.to_string()));
        }
        if let Some(status) = opts.status {
            let _ = write!(sql, " AND status = ?{}", param_values.len() + 1);
            param_values.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY started_at_epoch DESC, id DESC");
        if let Some(limit) = opts.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(Box::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// `None` = no row, `Some(None)` = row with unset memory session id.
    fn read_memory_session_id(
        conn: &Connection,
        id: SessionDbId,
    ) -> Result<Option<Option<String>>> {
        let current = conn
            .query_row(
                "SELECT memory_session_id FROM sdk_sessions WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(current)
    }

    fn memory_session_owner(
        conn: &Connection,
        memory_session_id: &str,
    ) -> Result<Option<SessionDbId>> {
        let owner = conn
            .query_row(
                "SELECT id FROM sdk_sessions WHERE memory_session_id = ?1",
                params![memory_session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get("id")?,
            content_session_id: row.get("content_session_id")?,
            memory_session_id: row.get("memory_session_id")?,
            project: row.get("project")?,
            user_prompt: row.get("user_prompt")?,
            started_at: row.get("started_at")?,
            started_at_epoch: row.get("started_at_epoch")?,
            completed_at: row.get("completed_at")?,
            completed_at_epoch: row.get("completed_at_epoch")?,
            status: row.get("status")?,
            prompt_counter: row.get("prompt_counter")?,
        })
    }
}

/// Decide the outcome from the current column value, or `None` if unset.
fn classify(current: Option<Option<String>>, candidate: &str) -> Option<RegisterOutcome> {
    match current {
        None => Some(RegisterOutcome::NotFound),
        Some(None) => None,
        Some(Some(existing)) if existing == candidate => Some(RegisterOutcome::AlreadyRegistered),
        Some(Some(existing)) => Some(RegisterOutcome::Conflict { existing }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use assert_matches::assert_matches;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn create_default_session(conn: &Connection, content_id: &str) -> SessionDbId {
        SessionRepo::create(conn, content_id, "test-project", Some("initial prompt")).unwrap()
    }

    #[test]
    fn create_session() {
        let conn = setup();
        let id = create_default_session(&conn, "claude-session-1");

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.content_session_id, "claude-session-1");
        assert_eq!(row.project, "test-project");
        assert_eq!(row.user_prompt.as_deref(), Some("initial prompt"));
        assert_eq!(row.status, "active");
        assert_eq!(row.prompt_counter, 0);
        assert!(row.memory_session_id.is_none());
        assert!(row.completed_at.is_none());
    }

    #[test]
    fn create_is_idempotent_on_content_id() {
        let conn = setup();
        let first = create_default_session(&conn, "claude-session-1");
        let second =
            SessionRepo::create(&conn, "claude-session-1", "other-project", Some("other")).unwrap();
        assert_eq!(first, second);

        let row = SessionRepo::get_by_id(&conn, first).unwrap().unwrap();
        assert_eq!(row.project, "test-project");
        assert_eq!(row.user_prompt.as_deref(), Some("initial prompt"));
    }

    #[test]
    fn create_backfills_empty_project() {
        let conn = setup();
        let id = SessionRepo::create(&conn, "c-1", "", None).unwrap();
        SessionRepo::create(&conn, "c-1", "late-project", None).unwrap();

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.project, "late-project");
    }

    #[test]
    fn get_by_id_not_found() {
        let conn = setup();
        assert!(SessionRepo::get_by_id(&conn, SessionDbId::new(99_999)).unwrap().is_none());
    }

    #[test]
    fn lookups_by_external_ids() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();

        let by_content = SessionRepo::get_by_content_session_id(&conn, "c-1").unwrap().unwrap();
        assert_eq!(by_content.id, id);
        let by_memory = SessionRepo::get_by_memory_session_id(&conn, "mem-1").unwrap().unwrap();
        assert_eq!(by_memory.id, id);
        assert!(SessionRepo::get_by_memory_session_id(&conn, "mem-2").unwrap().is_none());
    }

    #[test]
    fn exists_session() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        assert!(SessionRepo::exists(&conn, id).unwrap());
        assert!(!SessionRepo::exists(&conn, SessionDbId::new(99_999)).unwrap());
    }

    // ── Registration ─────────────────────────────────────────────────

    #[test]
    fn register_sets_unset_column() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");

        let outcome = SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();
        assert_eq!(outcome, RegisterOutcome::Registered);

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.memory_session_id.as_deref(), Some("mem-1"));
    }

    #[test]
    fn register_same_value_is_noop() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();

        let outcome = SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();
        assert_eq!(outcome, RegisterOutcome::AlreadyRegistered);
    }

    #[test]
    fn register_different_value_conflicts() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        SessionRepo::register_memory_session_id(&conn, id, "mem-a").unwrap();

        let outcome = SessionRepo::register_memory_session_id(&conn, id, "mem-b").unwrap();
        assert_matches!(outcome, RegisterOutcome::Conflict { existing } if existing == "mem-a");

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.memory_session_id.as_deref(), Some("mem-a"));
    }

    #[test]
    fn register_missing_session() {
        let conn = setup();
        let outcome =
            SessionRepo::register_memory_session_id(&conn, SessionDbId::new(99_999), "mem-1")
                .unwrap();
        assert_eq!(outcome, RegisterOutcome::NotFound);
    }

    #[test]
    fn register_value_owned_by_other_session() {
        let conn = setup();
        let a = create_default_session(&conn, "c-a");
        let b = create_default_session(&conn, "c-b");
        SessionRepo::register_memory_session_id(&conn, a, "mem-shared").unwrap();

        let outcome = SessionRepo::register_memory_session_id(&conn, b, "mem-shared").unwrap();
        assert_eq!(outcome, RegisterOutcome::Taken { owner: a });

        let row = SessionRepo::get_by_id(&conn, b).unwrap().unwrap();
        assert!(row.memory_session_id.is_none());
    }

    #[test]
    fn register_is_case_sensitive() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        SessionRepo::register_memory_session_id(&conn, id, "Mem-1").unwrap();

        let outcome = SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();
        assert_matches!(outcome, RegisterOutcome::Conflict { .. });
    }

    #[test]
    fn classify_cases() {
        assert_eq!(classify(None, "m"), Some(RegisterOutcome::NotFound));
        assert_eq!(classify(Some(None), "m"), None);
        assert_eq!(
            classify(Some(Some("m".into())), "m"),
            Some(RegisterOutcome::AlreadyRegistered)
        );
        assert_eq!(
            classify(Some(Some("x".into())), "m"),
            Some(RegisterOutcome::Conflict {
                existing: "x".into()
            })
        );
    }

    // ── Counters and status ──────────────────────────────────────────

    #[test]
    fn increment_prompt_counter() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        assert_eq!(SessionRepo::increment_prompt_counter(&conn, id).unwrap(), Some(1));
        assert_eq!(SessionRepo::increment_prompt_counter(&conn, id).unwrap(), Some(2));
        assert_eq!(
            SessionRepo::increment_prompt_counter(&conn, SessionDbId::new(99_999)).unwrap(),
            None
        );
    }

    #[test]
    fn finish_only_from_active() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");

        assert!(SessionRepo::finish(&conn, id, SessionStatus::Completed).unwrap());
        assert!(!SessionRepo::finish(&conn, id, SessionStatus::Failed).unwrap());

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert!(row.completed_at.is_some());
        assert!(row.completed_at_epoch.is_some());
    }

    #[test]
    fn finish_does_not_touch_memory_session_id() {
        let conn = setup();
        let id = create_default_session(&conn, "c-1");
        SessionRepo::register_memory_session_id(&conn, id, "mem-1").unwrap();
        SessionRepo::finish(&conn, id, SessionStatus::Failed).unwrap();

        let row = SessionRepo::get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(row.memory_session_id.as_deref(), Some("mem-1"));
        assert_eq!(row.status, "failed");
    }

    #[test]
    fn list_filters_and_orders() {
        let conn = setup();
        let a = SessionRepo::create(&conn, "c-a", "alpha", None).unwrap();
        let b = SessionRepo::create(&conn, "c-b", "alpha", None).unwrap();
        SessionRepo::create(&conn, "c-c", "beta", None).unwrap();
        SessionRepo::finish(&conn, a, SessionStatus::Completed).unwrap();

        let all = SessionRepo::list(&conn, &ListSessionsOptions::default()).unwrap();
        assert_eq!(all.len(), 3);

        let alpha = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                project: Some("alpha"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0].id, b);

        let active_alpha = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                project: Some("alpha"),
                status: Some(SessionStatus::Active),
                limit: Some(10),
            },
        )
        .unwrap();
        assert_eq!(active_alpha.len(), 1);
        assert_eq!(active_alpha[0].id, b);

        let limited = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                limit: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn status_parse() {
        assert_eq!(SessionStatus::parse("active"), Some(SessionStatus::Active));
        assert_eq!(SessionStatus::parse("failed"), Some(SessionStatus::Failed));
        assert_eq!(SessionStatus::parse("done"), None);
        assert_eq!(SessionStatus::Completed.as_str(), "completed");
    }
}
