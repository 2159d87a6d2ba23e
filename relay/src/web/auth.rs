//! Looker webhook header verification.
//!
//! Looker authenticates a webhook with two static headers: the sending
//! instance and a shared token. Both must equal the configured values
//! exactly.

use axum::http::HeaderMap;
use tracing::warn;

use crate::config::WebhookCredentials;

/// Verify the Looker instance and token headers on a request.
///
/// Header names are matched case-insensitively, values exactly. A missing or
/// non-UTF-8 header fails verification.
pub fn verify_looker_headers(credentials: &WebhookCredentials, headers: &HeaderMap) -> bool {
    let instance = header_value(headers, &credentials.instance_header);
    let token = header_value(headers, &credentials.token_header);

    let instance_ok = instance
        .map(|v| constant_time_compare(v, &credentials.instance))
        .unwrap_or(false);
    let token_ok = token
        .map(|v| constant_time_compare(v, &credentials.token))
        .unwrap_or(false);

    if !(instance_ok && token_ok) {
        warn!(
            has_instance = instance.is_some(),
            has_token = token.is_some(),
            instance_matches = instance_ok,
            "looker_headers_invalid"
        );
    }

    instance_ok && token_ok
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
