//! Error types shared across the workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaskError>;

/// Errors that can arise from key parsing, storage, cluster, and HTTP layers.
///
/// Every variant maps to an [`CaskError::http_status`] so the HTTP adapter
/// can translate it without re-deriving the logic at each call site.
#[derive(Debug, Error)]
pub enum CaskError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("no writeable neighbors available to satisfy replication")]
    NoWriteableNeighbors,

    #[error("cluster secret mismatch")]
    SecretMismatch,

    #[error("neighbor not found: {0}")]
    NeighborNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CaskError {
    /// HTTP status code an adapter should respond with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            CaskError::InvalidKey(_) => 400,
            CaskError::NotFound(_) | CaskError::NeighborNotFound(_) => 404,
            CaskError::SecretMismatch => 403,
            CaskError::ChecksumMismatch { .. } => 409,
            CaskError::NoWriteableNeighbors | CaskError::PeerUnreachable(_) => 503,
            CaskError::InvalidConfig(_) => 400,
            CaskError::Storage(_)
            | CaskError::Io(_)
            | CaskError::Http(_)
            | CaskError::Json(_)
            | CaskError::TomlParse(_)
            | CaskError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code, e.g. for logging or response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CaskError::InvalidKey(_) => "invalid_key",
            CaskError::NotFound(_) => "not_found",
            CaskError::ChecksumMismatch { .. } => "checksum_mismatch",
            CaskError::PeerUnreachable(_) => "peer_unreachable",
            CaskError::NoWriteableNeighbors => "no_writeable_neighbors",
            CaskError::SecretMismatch => "secret_mismatch",
            CaskError::NeighborNotFound(_) => "neighbor_not_found",
            CaskError::InvalidConfig(_) => "invalid_config",
            CaskError::Storage(_) => "storage_error",
            CaskError::Io(_) => "io_error",
            CaskError::Http(_) => "http_error",
            CaskError::Json(_) => "serialization_error",
            CaskError::TomlParse(_) => "config_parse_error",
            CaskError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(CaskError::NotFound("x".into()).http_status(), 404);
    }

    #[test]
    fn secret_mismatch_maps_to_403() {
        assert_eq!(CaskError::SecretMismatch.http_status(), 403);
    }

    #[test]
    fn no_writeable_neighbors_maps_to_503() {
        assert_eq!(CaskError::NoWriteableNeighbors.http_status(), 503);
    }
}
