//! Configuration module for environment variable parsing.
//!
//! Everything the relay needs before it can fetch its dashboard config is read
//! from the environment once at startup and never touched again.

use std::env;
use std::time::Duration;
use tracing::warn;

/// Default header carrying the Looker instance identifier.
pub const DEFAULT_INSTANCE_HEADER: &str = "X-Looker-Instance";

/// Default header carrying the shared webhook token.
pub const DEFAULT_TOKEN_HEADER: &str = "X-Looker-Webhook-Token";

/// Errors raised while reading settings from the environment.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("unsupported storage backend {0:?}; expected \"gcs\" or \"local\"")]
    UnknownBackend(String),
}

/// Where buckets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Google Cloud Storage, credentials discovered from the environment.
    Gcs,
    /// A local directory with one subdirectory per bucket.
    Local { root: String },
}

/// Expected Looker webhook credentials and the headers they arrive in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookCredentials {
    pub instance: String,
    pub token: String,
    pub instance_header: String,
    pub token_header: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Port for the web server to listen on
    pub port: u16,

    /// Looker header credentials
    pub credentials: WebhookCredentials,

    /// `gs://bucket/path` location of the dashboards config object
    pub config_location: String,

    /// Wall-clock budget for the startup config fetch
    pub config_fetch_timeout: Duration,

    /// Object storage backend
    pub storage: StorageBackend,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,

    /// Maximum number of entries an attachment archive may hold
    pub max_archive_entries: usize,

    /// Maximum total decompressed bytes read from one attachment
    pub max_archive_bytes: u64,
}

impl Settings {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(SettingsError::Missing(name))
        };

        let storage = match lookup("STORAGE_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("gcs") => StorageBackend::Gcs,
            Some("local") => StorageBackend::Local {
                root: lookup("LOCAL_STORAGE_ROOT").unwrap_or_else(|| "./storage".to_string()),
            },
            Some(other) => return Err(SettingsError::UnknownBackend(other.to_string())),
        };

        Ok(Settings {
            port: parse_or(&lookup, "PORT", 8080),

            credentials: WebhookCredentials {
                instance: required("LOOKER_INSTANCE")?,
                token: required("LOOKER_WEBHOOK_TOKEN")?,
                instance_header: lookup("LOOKER_INSTANCE_HEADER")
                    .unwrap_or_else(|| DEFAULT_INSTANCE_HEADER.to_string()),
                token_header: lookup("LOOKER_TOKEN_HEADER")
                    .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.to_string()),
            },

            config_location: required("CONFIG_FILE")?,

            config_fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONFIG_FETCH_TIMEOUT_SECS",
                50,
            )),

            storage,

            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", 32 * 1024 * 1024),

            max_archive_entries: parse_or(&lookup, "MAX_ARCHIVE_ENTRIES", 1024),

            max_archive_bytes: parse_or(&lookup, "MAX_ARCHIVE_BYTES", 256 * 1024 * 1024),
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("LOOKER_INSTANCE", "looker.example.com"),
        ("LOOKER_WEBHOOK_TOKEN", "s3cret"),
        ("CONFIG_FILE", "gs://config-bucket/relay/config.json"),
    ];

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.credentials.instance, "looker.example.com");
        assert_eq!(settings.credentials.token, "s3cret");
        assert_eq!(settings.credentials.instance_header, DEFAULT_INSTANCE_HEADER);
        assert_eq!(settings.credentials.token_header, DEFAULT_TOKEN_HEADER);
        assert_eq!(settings.config_location, "gs://config-bucket/relay/config.json");
        assert_eq!(settings.config_fetch_timeout, Duration::from_secs(50));
        assert_eq!(settings.storage, StorageBackend::Gcs);
        assert_eq!(settings.max_archive_entries, 1024);
    }

    #[test]
    fn test_missing_required() {
        let err = Settings::from_lookup(lookup_from(&REQUIRED[1..])).unwrap_err();
        assert_eq!(err, SettingsError::Missing("LOOKER_INSTANCE"));

        let mut vars = REQUIRED.to_vec();
        vars[1] = ("LOOKER_WEBHOOK_TOKEN", "   ");
        let err = Settings::from_lookup(lookup_from(&vars)).unwrap_err();
        assert_eq!(err, SettingsError::Missing("LOOKER_WEBHOOK_TOKEN"));
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "9090"),
            ("MAX_ARCHIVE_ENTRIES", "not-a-number"),
            ("LOOKER_TOKEN_HEADER", "X-Custom-Token"),
            ("STORAGE_BACKEND", "Local"),
            ("LOCAL_STORAGE_ROOT", "/tmp/buckets"),
        ]);

        let settings = Settings::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(settings.port, 9090);
        assert_eq!(settings.max_archive_entries, 1024);
        assert_eq!(settings.credentials.token_header, "X-Custom-Token");
        assert_eq!(
            settings.storage,
            StorageBackend::Local {
                root: "/tmp/buckets".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_backend() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("STORAGE_BACKEND", "s3"));

        let err = Settings::from_lookup(lookup_from(&vars)).unwrap_err();
        assert_eq!(err, SettingsError::UnknownBackend("s3".to_string()));
    }
}
