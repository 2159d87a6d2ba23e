//! Lookerdrop - Looker webhook relay.
//!
//! Receives Looker scheduled-plan webhooks carrying a base64 zip attachment,
//! picks the configured files out of the zip and writes each one to the
//! dashboard's bucket as `<destinationprefix>-<unix seconds>.csv`.
//!
//! ## Architecture
//!
//! ```text
//! Looker → POST / → header check → payload → dashboard match → unzip → object storage
//! ```

pub mod archive;
pub mod config;
pub mod dashboards;
pub mod delivery;
pub mod error;
pub mod payload;
pub mod storage;
pub mod web;

// Re-export commonly used types
pub use archive::{ArchiveError, ArchiveLimits, Attachment};
pub use config::{Settings, SettingsError, StorageBackend, WebhookCredentials};
pub use dashboards::{ArchiveMapping, ConfigError, Dashboard, DashboardConfig};
pub use delivery::{deliver, DeliveryReport, UploadedObject};
pub use error::RelayError;
pub use payload::LookerPayload;
pub use storage::{StorageClient, StorageError};
pub use web::{router, AppState};
