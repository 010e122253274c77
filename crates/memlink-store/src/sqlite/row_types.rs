//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! These mirror the raw table shape. Timestamps are kept as the stored
//! RFC 3339 strings plus millisecond epochs.

use memlink_core::SessionDbId;
use serde::{Deserialize, Serialize};

/// Raw session row from the `sdk_sessions` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    /// Database-assigned primary key.
    pub id: SessionDbId,
    /// Originating system's session id.
    pub content_session_id: String,
    /// Memory session id, once registered.
    pub memory_session_id: Option<String>,
    /// Project name.
    pub project: String,
    /// First prompt of the session.
    pub user_prompt: Option<String>,
    /// Start timestamp (RFC 3339).
    pub started_at: String,
    /// Start timestamp (ms since epoch).
    pub started_at_epoch: i64,
    /// Completion timestamp (null while active).
    pub completed_at: Option<String>,
    /// Completion timestamp (ms since epoch).
    pub completed_at_epoch: Option<i64>,
    /// `active`, `completed`, or `failed`.
    pub status: String,
    /// Number of prompts seen so far.
    pub prompt_counter: i64,
}

/// Raw observation row from the `observations` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Row ID.
    pub id: i64,
    /// Owning memory session id.
    pub memory_session_id: String,
    /// Project name.
    pub project: String,
    /// Observation kind (free-form, e.g. `decision`, `bugfix`).
    pub kind: String,
    /// Optional short title.
    pub title: Option<String>,
    /// Observation body.
    pub text: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Creation timestamp (ms since epoch).
    pub created_at_epoch: i64,
}
