//! Transactional `SessionStore` API.

use memlink_core::SessionDbId;
use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::{current_version, run_migrations};
use crate::sqlite::repositories::observation::{NewObservation, ObservationRepo};
use crate::sqlite::repositories::session::{
    ListSessionsOptions, RegisterOutcome, SessionRepo, SessionStatus,
};
use crate::sqlite::row_types::{ObservationRow, SessionRow};

/// Session store wrapping a connection pool and all repositories.
///
/// The store is the only writer of `sdk_sessions.memory_session_id`. It is
/// `Send + Sync`; share it behind an `Arc` across threads. Dropping the store
/// (or calling [`SessionStore::close`]) releases every pooled connection.
pub struct SessionStore {
    pool: ConnectionPool,
}

impl SessionStore {
    /// Wrap an existing pool. The schema is assumed to be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store and apply pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        Self::migrated(pool)
    }

    /// Open a private in-memory store and apply migrations.
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::migrated(pool)
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            debug!(applied, "session store ready");
        }
        Ok(Self::new(pool))
    }

    /// Release the store and its connections.
    pub fn close(self) {
        debug!(
            connections = self.pool.state().connections,
            "closing session store"
        );
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Highest applied schema migration.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        current_version(&conn)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session for `content_session_id`, or return the existing one.
    #[instrument(skip(self, user_prompt))]
    pub fn create_sdk_session(
        &self,
        content_session_id: &str,
        project: &str,
        user_prompt: Option<&str>,
    ) -> Result<SessionDbId> {
        if content_session_id.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "content_session_id must not be empty".into(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = begin_immediate(&mut conn)?;
        let id = SessionRepo::create(&tx, content_session_id, project, user_prompt)?;
        tx.commit()?;

        debug!(session_id = %id, "session created or reused");
        Ok(id)
    }

    /// Get session by primary key.
    pub fn get_session_by_id(&self, session_id: SessionDbId) -> Result<Option<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::get_by_id(&conn, session_id)
    }

    /// Get session by the originating system's session id.
    pub fn find_by_content_session_id(
        &self,
        content_session_id: &str,
    ) -> Result<Option<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::get_by_content_session_id(&conn, content_session_id)
    }

    /// Get session by its registered memory session id.
    pub fn find_by_memory_session_id(&self, memory_session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::get_by_memory_session_id(&conn, memory_session_id)
    }

    /// List sessions, newest first.
    pub fn list_recent_sessions(&self, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::list(&conn, opts)
    }

    /// Bind `memory_session_id` to the session, at most once.
    ///
    /// Returns `true` if this call performed the binding and `false` if the
    /// session was already bound to the same value. Fails with
    /// [`StoreError::SessionNotFound`] when the session does not exist and
    /// with [`StoreError::MemorySessionIdConflict`] when it is bound to a
    /// different value. Only the `true` path writes.
    #[instrument(skip(self))]
    pub fn ensure_memory_session_id_registered(
        &self,
        session_id: SessionDbId,
        memory_session_id: &str,
    ) -> Result<bool> {
        if memory_session_id.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "memory_session_id must not be empty".into(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = begin_immediate(&mut conn)?;
        let outcome = SessionRepo::register_memory_session_id(&tx, session_id, memory_session_id)?;

        match outcome {
            RegisterOutcome::Registered => {
                tx.commit()?;
                info!(memory_session_id, "memory session id registered");
                Ok(true)
            }
            RegisterOutcome::AlreadyRegistered => {
                debug!(memory_session_id, "memory session id already registered");
                Ok(false)
            }
            RegisterOutcome::Conflict { existing } => {
                warn!(
                    existing = %existing,
                    requested = memory_session_id,
                    "memory session id conflict"
                );
                Err(StoreError::MemorySessionIdConflict {
                    session_id,
                    existing,
                    requested: memory_session_id.to_string(),
                })
            }
            RegisterOutcome::Taken { owner } => {
                warn!(owner = %owner, memory_session_id, "memory session id owned by another session");
                Err(StoreError::MemorySessionIdTaken {
                    memory_session_id: memory_session_id.to_string(),
                    owner,
                })
            }
            RegisterOutcome::NotFound => Err(StoreError::SessionNotFound(session_id)),
        }
    }

    /// Increment the prompt counter, returning the new value.
    pub fn increment_prompt_counter(&self, session_id: SessionDbId) -> Result<i64> {
        let conn = self.conn()?;
        SessionRepo::increment_prompt_counter(&conn, session_id)?
            .ok_or(StoreError::SessionNotFound(session_id))
    }

    /// Mark an active session completed. Returns `false` if it was not active.
    pub fn complete_session(&self, session_id: SessionDbId) -> Result<bool> {
        self.finish_session(session_id, SessionStatus::Completed)
    }

    /// Mark an active session failed. Returns `false` if it was not active.
    pub fn fail_session(&self, session_id: SessionDbId) -> Result<bool> {
        self.finish_session(session_id, SessionStatus::Failed)
    }

    #[instrument(skip(self))]
    fn finish_session(&self, session_id: SessionDbId, status: SessionStatus) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = begin_immediate(&mut conn)?;
        if !SessionRepo::exists(&tx, session_id)? {
            return Err(StoreError::SessionNotFound(session_id));
        }
        let changed = SessionRepo::finish(&tx, session_id, status)?;
        tx.commit()?;

        if changed {
            info!(status = status.as_str(), "session finished");
        }
        Ok(changed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observations
    // ─────────────────────────────────────────────────────────────────────

    /// Store an observation under a registered memory session id.
    ///
    /// An empty `obs.project` falls back to the owning session's project.
    #[instrument(skip(self, obs))]
    pub fn store_observation(
        &self,
        memory_session_id: &str,
        obs: &NewObservation<'_>,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = begin_immediate(&mut conn)?;

        let session = SessionRepo::get_by_memory_session_id(&tx, memory_session_id)?
            .ok_or_else(|| StoreError::UnknownMemorySession(memory_session_id.to_string()))?;

        let project = if obs.project.is_empty() {
            session.project.as_str()
        } else {
            obs.project
        };
        let id = ObservationRepo::insert(
            &tx,
            memory_session_id,
            &NewObservation { project, ..obs.clone() },
        )?;
        tx.commit()?;

        debug!(observation_id = id, session_id = %session.id, "observation stored");
        Ok(id)
    }

    /// List observations for a memory session, oldest first.
    pub fn get_observations(&self, memory_session_id: &str) -> Result<Vec<ObservationRow>> {
        let conn = self.conn()?;
        ObservationRepo::list_by_memory_session(&conn, memory_session_id)
    }

    /// Number of observations stored under a memory session id.
    pub fn count_observations(&self, memory_session_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        ObservationRepo::count_by_memory_session(&conn, memory_session_id)
    }
}

/// Begin a transaction that takes the write lock up front.
///
/// Waiting on another writer is bounded by the connection's `busy_timeout`.
fn begin_immediate(conn: &mut PooledConnection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from)
        .inspect_err(|e| {
            if e.is_busy() {
                warn!(error = %e, "timed out waiting for the database write lock");
            }
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
