//! # memlink-store
//!
//! Session persistence with a `SQLite` backend.
//!
//! - **Session store**: owned, transactional API over a connection pool
//! - **Memory session registration**: link-once binding of a memory session id
//!   to a session row (compare-and-set inside an `IMMEDIATE` transaction)
//! - **Observations**: memory records keyed by a registered memory session id
//! - **`SQLite` backend**: `rusqlite` + `r2d2` with a stateless repository layer
//! - **Migrations**: version-tracked SQL schema evolution

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use memlink_core::SessionDbId;
pub use sqlite::connection::{ConnectionConfig, ConnectionPool};
pub use sqlite::repositories::observation::NewObservation;
pub use sqlite::repositories::session::{ListSessionsOptions, RegisterOutcome, SessionStatus};
pub use sqlite::row_types::{ObservationRow, SessionRow};
pub use store::SessionStore;
