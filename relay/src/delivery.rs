//! Dashboard delivery: from an authenticated Looker payload to stored files.
//!
//! ## Flow
//!
//! ```text
//! LookerPayload → attachment check → dashboard match → unzip → upload per mapping
//! ```
//!
//! Uploads happen one at a time in archive order. The first failure aborts
//! the delivery; objects already written stay written.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{info, warn};

use crate::archive::{ArchiveLimits, Attachment};
use crate::dashboards::DashboardConfig;
use crate::error::RelayError;
use crate::payload::LookerPayload;
use crate::storage::StorageClient;

/// Content type of every uploaded object.
pub const UPLOAD_CONTENT_TYPE: &str = "text/csv";

/// An object written during a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub size: usize,
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of dashboards whose name matched the plan title
    pub dashboards: usize,
    pub uploaded: Vec<UploadedObject>,
}

/// Relay the attachment of `payload` to every matching dashboard's bucket.
pub async fn deliver(
    dashboards: &DashboardConfig,
    storage: &StorageClient,
    limits: ArchiveLimits,
    payload: &LookerPayload,
) -> Result<DeliveryReport, RelayError> {
    let title = payload.scheduled_plan.title.as_str();
    let attachment = &payload.attachment;

    if !attachment.is_zip() {
        return Err(RelayError::UnsupportedAttachment {
            extension: attachment.extension.clone(),
            mimetype: attachment.mimetype.clone(),
        });
    }

    let matched: Vec<_> = dashboards.matching(title).collect();
    if matched.is_empty() {
        return Err(RelayError::DashboardNotFound {
            title: title.to_string(),
        });
    }

    let mut archive = Attachment::decode(&attachment.data, limits)?;
    let entries = archive.entries()?;

    info!(
        dashboard = %title,
        matched_dashboards = matched.len(),
        archive_entries = entries.len(),
        "delivery_start"
    );

    let mut report = DeliveryReport {
        dashboards: matched.len(),
        uploaded: Vec::new(),
    };

    // Each entry is decompressed once per delivery and shared by every
    // dashboard that maps it, so the byte budget is charged once per entry.
    let mut contents: HashMap<usize, Bytes> = HashMap::new();

    for dashboard in matched {
        for (index, name) in &entries {
            let mut mappings = dashboard.mappings_for(name).peekable();
            if mappings.peek().is_none() {
                continue;
            }

            let content = match contents.get(index) {
                Some(content) => content.clone(),
                None => {
                    let content = Bytes::from(archive.read(*index)?);
                    contents.insert(*index, content.clone());
                    content
                }
            };

            for mapping in mappings {
                let key = mapping.object_key(unix_seconds());

                info!(
                    entry = %name,
                    bucket = %dashboard.bucket,
                    key = %key,
                    size = content.len(),
                    "delivery_entry_uploading"
                );

                storage
                    .put(&dashboard.bucket, &key, content.clone(), UPLOAD_CONTENT_TYPE)
                    .await?;

                report.uploaded.push(UploadedObject {
                    bucket: dashboard.bucket.clone(),
                    key,
                    size: content.len(),
                });
            }
        }
    }

    if report.uploaded.is_empty() {
        warn!(dashboard = %title, "delivery_no_matching_entries");
    }

    info!(
        dashboard = %title,
        uploaded = report.uploaded.len(),
        "delivery_complete"
    );

    Ok(report)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
