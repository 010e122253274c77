//! High-level `SessionStore` API.
//!
//! The [`SessionStore`] owns the connection pool and composes repository
//! operations into atomic methods. Writes that read before they write run in
//! an `IMMEDIATE` transaction, so concurrent callers are serialized by
//! `SQLite` rather than by application locks.

mod session_store;

pub use session_store::*;
