//! Runtime settings from the environment.
//!
//! A `.env` file is loaded first when present (via `dotenvy`). Command-line
//! flags override these values.
//!
//! | Variable                    | Default |
//! |-----------------------------|---------|
//! | `ROLLBOOK_PORT`             | 3000    |
//! | `ROLLBOOK_IMPORT_URL`       | unset   |
//! | `ROLLBOOK_IMPORT_TOKEN`     | unset   |
//! | `ROLLBOOK_BATCH_SIZE`       | 10      |
//! | `ROLLBOOK_BATCH_DELAY_MS`   | 250     |
//! | `ROLLBOOK_IDENTITY_KEY`     | any     |
//! | `ROLLBOOK_MAX_UPLOAD_BYTES` | 10 MiB  |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::import::{HttpImporter, ImportOptions, DEFAULT_BATCH_DELAY_MS, DEFAULT_BATCH_SIZE};
use crate::validation::{IdentityKey, ValidationOptions};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Settings shared by the CLI and the HTTP server
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub import_url: Option<String>,
    pub import_token: Option<String>,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub identity_key: IdentityKey,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            import_url: None,
            import_token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            identity_key: IdentityKey::Any,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Read settings from the process environment (and `.env`).
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read settings through `lookup`, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let batch_size = parse_var(&get, "ROLLBOOK_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "ROLLBOOK_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parse_var(&get, "ROLLBOOK_PORT", defaults.port)?,
            import_url: get("ROLLBOOK_IMPORT_URL"),
            import_token: get("ROLLBOOK_IMPORT_TOKEN"),
            batch_size,
            batch_delay_ms: parse_var(&get, "ROLLBOOK_BATCH_DELAY_MS", defaults.batch_delay_ms)?,
            identity_key: parse_var(&get, "ROLLBOOK_IDENTITY_KEY", defaults.identity_key)?,
            max_upload_bytes: parse_var(&get, "ROLLBOOK_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            delay: Duration::from_millis(self.batch_delay_ms),
        }
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            identity_key: self.identity_key,
            ..Default::default()
        }
    }

    /// HTTP importer for the configured endpoint, if any.
    pub fn importer(&self) -> Option<HttpImporter> {
        let url = self.import_url.as_ref()?;
        let importer = HttpImporter::new(url.clone());
        Some(match self.import_token {
            Some(ref token) => importer.with_api_key(token.clone()),
            None => importer,
        })
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ConfigResult<Settings> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.importer().is_none());
        assert_eq!(settings.import_options(), ImportOptions::default());
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("ROLLBOOK_PORT", "8080"),
            ("ROLLBOOK_IMPORT_URL", "http://localhost:9000/students/bulk"),
            ("ROLLBOOK_BATCH_SIZE", "25"),
            ("ROLLBOOK_BATCH_DELAY_MS", "0"),
            ("ROLLBOOK_IDENTITY_KEY", "email"),
        ])
        .unwrap();

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.import_options().batch_size, 25);
        assert!(settings.import_options().delay.is_zero());
        assert_eq!(settings.validation_options().identity_key, IdentityKey::Email);
        assert_eq!(
            settings.importer().unwrap().endpoint(),
            "http://localhost:9000/students/bulk"
        );
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let settings = settings(&[("ROLLBOOK_PORT", "  "), ("ROLLBOOK_IMPORT_URL", "")]).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert!(settings.import_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let err = settings(&[("ROLLBOOK_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("ROLLBOOK_PORT"));

        let err = settings(&[("ROLLBOOK_BATCH_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        assert!(settings(&[("ROLLBOOK_IDENTITY_KEY", "fingerprint")]).is_err());
    }
}
