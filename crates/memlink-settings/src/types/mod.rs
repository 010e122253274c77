//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs to name the values it changes.

mod database;
mod logging;

pub use database::*;
pub use logging::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "database": { "path": "/var/lib/memlink/memlink.db", "poolSize": 4 },
///   "logging": { "level": "info", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemlinkSettings {
    /// Settings schema version.
    pub version: String,
    /// Session database settings.
    pub database: DatabaseSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for MemlinkSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl MemlinkSettings {
    /// Reject values that would leave the store unusable.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "database.path must not be empty".into(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "database.poolSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(MemlinkSettings::default()).unwrap();
        assert!(json["database"].get("poolSize").is_some());
        assert!(json["database"].get("busyTimeoutMs").is_some());
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: MemlinkSettings =
            serde_json::from_str(r#"{"database": {"poolSize": 2}}"#).unwrap();
        assert_eq!(settings.database.pool_size, 2);
        assert_eq!(settings.database.busy_timeout_ms, 30_000);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let mut settings = MemlinkSettings::default();
        settings.database.pool_size = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_blank_path() {
        let mut settings = MemlinkSettings::default();
        settings.database.path = "  ".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(MemlinkSettings::default().validate().is_ok());
    }
}
