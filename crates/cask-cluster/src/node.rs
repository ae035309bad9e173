//! Peer descriptors and the remote operations performed against them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use cask_core::{Key, RING_REPLICAS_PER_NODE};

/// A peer in the cluster, or the local node itself (`Site::myself`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    pub base_url: String,
    pub writeable: bool,
    pub last_seen: DateTime<Utc>,
    pub last_failed: DateTime<Utc>,
}

impl Node {
    pub fn new(uuid: impl Into<String>, base_url: impl Into<String>, writeable: bool) -> Self {
        let now = Utc::now();
        Self {
            uuid: uuid.into(),
            base_url: base_url.into(),
            writeable,
            last_seen: now,
            // Epoch, so a freshly created node is healthy (last_failed <= last_seen).
            last_failed: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// A node is unhealthy once it has failed more recently than it was seen.
    pub fn unhealthy(&self) -> bool {
        self.last_failed > self.last_seen
    }

    /// The node's 16 virtual ring tokens: `sha1(uuid || i)` in lowercase hex,
    /// for `i` in `0..16`.
    pub fn hash_keys(&self) -> [String; RING_REPLICAS_PER_NODE] {
        std::array::from_fn(|i| {
            let mut hasher = Sha1::new();
            hasher.update(self.uuid.as_bytes());
            hasher.update(i.to_string().as_bytes());
            hex::encode(hasher.finalize())
        })
    }
}

/// A heartbeat message: `Myself` plus the sender's full neighbor list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub uuid: String,
    pub base_url: String,
    pub writeable: bool,
    pub secret: String,
    pub neighbors: Vec<NeighborSummary>,
}

/// The trimmed neighbor shape carried inside a heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborSummary {
    pub uuid: String,
    pub base_url: String,
    pub writeable: bool,
}

impl From<&Node> for NeighborSummary {
    fn from(n: &Node) -> Self {
        Self {
            uuid: n.uuid.clone(),
            base_url: n.base_url.clone(),
            writeable: n.writeable,
        }
    }
}

/// The result of asking a peer whether it holds a key intact.
pub enum CheckFileOutcome {
    Found(Bytes),
    NotFound,
    /// Bytes arrived but their hash didn't match the key.
    Corrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_keys_are_deterministic_and_distinct() {
        let n = Node::new("node-a", "http://a", true);
        let keys1 = n.hash_keys();
        let keys2 = n.hash_keys();
        assert_eq!(keys1, keys2);

        let unique: std::collections::HashSet<_> = keys1.iter().collect();
        assert_eq!(unique.len(), RING_REPLICAS_PER_NODE);
        for k in &keys1 {
            assert_eq!(k.len(), 40);
            assert!(k.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn fresh_node_is_healthy() {
        let n = Node::new("node-a", "http://a", true);
        assert!(!n.unhealthy());
    }

    #[test]
    fn failed_after_seen_is_unhealthy() {
        let mut n = Node::new("node-a", "http://a", true);
        n.last_failed = n.last_seen + chrono::Duration::seconds(1);
        assert!(n.unhealthy());
    }

    #[test]
    fn key_smoke() {
        let _ = Key::from_bytes(b"x");
    }
}
