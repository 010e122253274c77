//! # memlink-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MemlinkSettings::default()`]
//! 2. **User file**: `~/.memlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MEMLINK_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and passes
//! the values it needs down to the store.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
