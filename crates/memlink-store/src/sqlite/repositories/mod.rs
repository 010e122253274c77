//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter. Transaction boundaries belong to the caller.

pub mod observation;
pub mod session;
