//! Error types for the session store.
//!
//! [`StoreError`] is returned by every store and repository operation. The
//! two registration failures ([`StoreError::SessionNotFound`] and
//! [`StoreError::MemorySessionIdConflict`]) are distinct variants so callers
//! can tell an ordering bug from a genuine identity conflict.

use memlink_core::SessionDbId;
use thiserror::Error;

/// Errors that can occur during session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// No session row exists for the given primary key.
    #[error("session {0} does not exist")]
    SessionNotFound(SessionDbId),

    /// The session is already bound to a different memory session id.
    #[error(
        "session {session_id} already has different memory_session_id \
         (existing: {existing}, requested: {requested})"
    )]
    MemorySessionIdConflict {
        /// Session being registered.
        session_id: SessionDbId,
        /// Memory session id currently bound.
        existing: String,
        /// Memory session id the caller attempted to bind.
        requested: String,
    },

    /// The memory session id is already bound to another session.
    #[error("memory_session_id {memory_session_id} is already bound to session {owner}")]
    MemorySessionIdTaken {
        /// Memory session id the caller attempted to bind.
        memory_session_id: String,
        /// Session that owns it.
        owner: SessionDbId,
    },

    /// No session has registered this memory session id.
    #[error("memory session {0} is not registered on any session")]
    UnknownMemorySession(String),

    /// Caller-supplied value rejected before touching storage.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether this error is a `SQLITE_BUSY`/`SQLITE_LOCKED` failure.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
