//! Looker webhook payload types.
//!
//! Only the scheduled plan title and the attachment are acted on. The other
//! fields Looker sends are kept for logging.

use serde::Deserialize;

/// Attachment extension Looker uses for zipped deliveries.
pub const ZIP_EXTENSION: &str = "zip";

/// Attachment mimetype Looker uses for zipped deliveries.
pub const ZIP_MIMETYPE: &str = "application/zip;base64";

/// Body of a Looker scheduled-plan webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct LookerPayload {
    pub scheduled_plan: ScheduledPlan,
    pub attachment: Attachment,
    /// Delivery type, e.g. `"dashboard"`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The scheduled plan that triggered a delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledPlan {
    /// Plan title, used to select the dashboard config
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scheduled_plan_id: Option<serde_json::Value>,
    #[serde(default)]
    pub query_id: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The delivered file.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub mimetype: String,
    /// Base64-encoded file content
    #[serde(default)]
    pub data: String,
}

impl Attachment {
    /// True when both the extension and the mimetype announce a base64 zip.
    pub fn is_zip(&self) -> bool {
        self.extension == ZIP_EXTENSION && self.mimetype == ZIP_MIMETYPE
    }
}
