//! Dashboard delivery configuration.
//!
//! The relay learns which Looker dashboards it handles, and where their files
//! go, from a JSON object in storage:
//!
//! ```json
//! {
//!   "dashboards": [
//!     {
//!       "name": "Daily Sales",
//!       "bucket": "sales-exports",
//!       "archives": [
//!         { "filename": "orders.csv", "destinationprefix": "orders/daily" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! It is fetched once before the server starts and is read-only afterwards.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::storage::{client::object_path, StorageClient, StorageError};

/// Config loading failures. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("could not fetch config object: {0}")]
    Fetch(#[from] StorageError),

    #[error("timed out after {0:?} fetching config object")]
    Timeout(Duration),

    #[error("could not parse config object: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A zip entry to pick out of an attachment and where to put it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArchiveMapping {
    /// Name of the entry inside the attachment archive
    pub filename: String,
    /// Base of the uploaded object key
    #[serde(rename = "destinationprefix")]
    pub destination_prefix: String,
}

impl ArchiveMapping {
    /// Object key for an upload made at `unix_seconds`.
    pub fn object_key(&self, unix_seconds: u64) -> String {
        format!("{}-{}.csv", self.destination_prefix, unix_seconds)
    }
}

/// A Looker dashboard the relay accepts deliveries for.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Dashboard {
    /// Matched against the scheduled plan title
    pub name: String,
    /// Destination bucket for every file of this dashboard
    pub bucket: String,
    pub archives: Vec<ArchiveMapping>,
}

impl Dashboard {
    /// Mappings that pick up the archive entry `entry_name`.
    pub fn mappings_for<'a>(
        &'a self,
        entry_name: &'a str,
    ) -> impl Iterator<Item = &'a ArchiveMapping> + 'a {
        self.archives.iter().filter(move |m| m.filename == entry_name)
    }
}

/// The full dashboard list, in config order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DashboardConfig {
    pub dashboards: Vec<Dashboard>,
}

impl DashboardConfig {
    /// Parse and validate a raw config document.
    pub fn from_slice(raw: &[u8]) -> Result<Self, ConfigError> {
        let config: DashboardConfig = serde_json::from_slice(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fetch the config from `location` (`gs://bucket/path`) within `timeout`.
    pub async fn load(
        storage: &StorageClient,
        location: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let (bucket, key) = parse_location(location)?;

        info!(bucket = %bucket, object = %key, "config_fetch_start");

        let raw = fetch_within(timeout, storage.get(&bucket, &key)).await?;

        let config = Self::from_slice(&raw)?;

        info!(
            dashboards = config.dashboards.len(),
            names = ?config.dashboards.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "config_loaded"
        );

        Ok(config)
    }

    /// Dashboards whose name equals `title`, in config order.
    pub fn matching<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a Dashboard> + 'a {
        self.dashboards.iter().filter(move |d| d.name == title)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, dashboard) in self.dashboards.iter().enumerate() {
            if dashboard.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("dashboard #{i} has no name")));
            }
            if dashboard.bucket.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "dashboard {:?} has no bucket",
                    dashboard.name
                )));
            }
            for archive in &dashboard.archives {
                if archive.filename.is_empty() || archive.destination_prefix.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "dashboard {:?} has an archive mapping without filename or destinationprefix",
                        dashboard.name
                    )));
                }
                if let Err(e) = object_path(&archive.object_key(0)) {
                    return Err(ConfigError::Invalid(format!(
                        "dashboard {:?} has an unusable destinationprefix {:?}: {e}",
                        dashboard.name, archive.destination_prefix
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Await a config fetch, giving up after `timeout`.
async fn fetch_within<F>(timeout: Duration, fetch: F) -> Result<Bytes, ConfigError>
where
    F: Future<Output = Result<Bytes, StorageError>>,
{
    Ok(tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| ConfigError::Timeout(timeout))??)
}

/// Split `gs://bucket/path/to/object` into bucket and object key.
fn parse_location(location: &str) -> Result<(String, String), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;

    if url.scheme() != "gs" {
        return Err(invalid("scheme must be gs://"));
    }

    let bucket = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing bucket"))?;

    let path = urlencoding::decode(url.path()).map_err(|e| invalid(&e.to_string()))?;
    let key = path.trim_matches('/');
    if key.is_empty() {
        return Err(invalid("missing object path"));
    }

    Ok((bucket.to_string(), key.to_string()))
}
