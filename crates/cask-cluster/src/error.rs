//! Cluster-level errors, wrapping the crate-wide [`CaskError`].

use cask_core::CaskError;
use thiserror::Error;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("neighbor not found: {0}")]
    NeighborNotFound(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("peer reported a corrupt copy")]
    Corrupt,

    #[error("no replica found anywhere in the cluster")]
    NotFoundInCluster,

    #[error("join rejected: {0}")]
    JoinRejected(String),

    #[error("cluster secret mismatch")]
    SecretMismatch,

    #[error(transparent)]
    Core(#[from] CaskError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn http_status(&self) -> u16 {
        match self {
            ClusterError::NeighborNotFound(_) | ClusterError::NotFoundInCluster => 404,
            ClusterError::SecretMismatch => 403,
            ClusterError::Corrupt => 409,
            ClusterError::PeerUnreachable(_) => 503,
            ClusterError::JoinRejected(_) => 400,
            ClusterError::Core(e) => e.http_status(),
            ClusterError::Transport(_) | ClusterError::Serialization(_) => 500,
        }
    }
}
