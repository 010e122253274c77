//! # memlink-core
//!
//! Foundation types shared by every memlink crate:
//!
//! - **[`ids`]**: the [`SessionDbId`] primary-key newtype
//! - **[`logging`]**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::SessionDbId;
