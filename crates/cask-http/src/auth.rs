//! Cluster-secret checking for inter-node endpoints.
//!
//! This is a single equality test against one shared secret rather than a
//! credentials lookup, and it can't be a generic `axum::middleware` layer:
//! `/local/` carries the secret in a header, `/join/` and `/heartbeat/` carry
//! it in the body, which only the handler can parse without buffering the
//! request twice. Each handler calls [`require_secret`] itself instead.

use axum::http::HeaderMap;
use cask_cluster::Site;
use cask_core::CaskError;

pub const SECRET_HEADER: &str = "X-Cask-Cluster-Secret";

pub fn header_secret(headers: &HeaderMap) -> Option<&str> {
    headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok())
}

pub fn require_secret(site: &Site, provided: Option<&str>) -> Result<(), CaskError> {
    match provided {
        Some(candidate) if site.cluster.check_secret(candidate) => Ok(()),
        _ => Err(CaskError::SecretMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_secret_reads_configured_header_name() {
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cr3t"));
        assert_eq!(header_secret(&headers), Some("s3cr3t"));
    }

    #[test]
    fn header_secret_absent_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(header_secret(&headers), None);
    }
}
