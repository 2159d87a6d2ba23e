//! Request-level errors and their HTTP mapping.
//!
//! Clients only ever see a stable status code string. The detailed cause,
//! which may include storage internals, is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::archive::ArchiveError;
use crate::storage::StorageError;
use crate::web::WebhookResponse;

/// Everything that can end a webhook request early.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("looker headers did not match the configured credentials")]
    Unauthorized,

    #[error("request body is not a valid looker payload: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("unsupported attachment (extension {extension:?}, mimetype {mimetype:?})")]
    UnsupportedAttachment { extension: String, mimetype: String },

    #[error("no dashboard configured for {title:?}")]
    DashboardNotFound { title: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RelayError {
    /// HTTP status returned for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::DashboardNotFound { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::InvalidBody(_)
            | Self::UnsupportedAttachment { .. }
            | Self::Archive(_)
            | Self::Storage(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable, client-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidBody(_) => "invalid_body",
            Self::UnsupportedAttachment { .. } => "unsupported_attachment",
            Self::DashboardNotFound { .. } => "dashboard_not_configured",
            Self::Archive(ArchiveError::Base64(_)) => "invalid_attachment_encoding",
            Self::Archive(ArchiveError::TooManyEntries { .. } | ArchiveError::TooLarge { .. }) => {
                "attachment_too_large"
            }
            Self::Archive(_) => "invalid_attachment_archive",
            Self::Storage(StorageError::Read { .. } | StorageError::NotFound { .. }) => {
                "storage_read_failed"
            }
            Self::Storage(_) => "storage_write_failed",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Storage(_) => error!(error = %self, code = self.code(), "relay_request_failed"),
            _ => warn!(error = %self, code = self.code(), "relay_request_rejected"),
        }

        (
            status,
            Json(WebhookResponse {
                status: self.code(),
                uploaded: None,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RelayError::DashboardNotFound {
                title: "x".to_string()
            }
            .status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            RelayError::UnsupportedAttachment {
                extension: "csv".to_string(),
                mimetype: "text/csv".to_string()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Storage(StorageError::EmptyBucket).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Archive(ArchiveError::TooLarge { limit: 1 }).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_code_does_not_leak_detail() {
        let err = RelayError::Storage(StorageError::Write {
            bucket: "private-bucket".to_string(),
            key: "secret/key.csv".to_string(),
            source: object_store::Error::NotImplemented,
        });

        assert_eq!(err.code(), "storage_write_failed");
        assert!(!err.code().contains("private-bucket"));
        assert!(err.to_string().contains("private-bucket"));
    }
}
