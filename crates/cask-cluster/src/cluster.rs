//! Cluster membership: a single-consumer serialization queue guarding the
//! neighbors map, plus ring construction and the read/write fan-out paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use cask_core::Key;
use cask_storage::Backend;

use crate::error::{ClusterError, ClusterResult};
use crate::node::{Heartbeat, NeighborSummary, Node};
use crate::ring::{build_ring, build_write_ring, hash_order, RingEntry};
use crate::transport::NodeClient;

const HEARTBEAT_JITTER_MAX_SECS: u64 = 4;
const REAP_JITTER_MAX_SECS: u64 = 4;

enum Command {
    AddNeighbor(Node),
    RemoveNeighbor(String),
    UpdateNeighbor(Node),
    FailedNeighbor(String),
    FindByUuid(String, oneshot::Sender<Option<Node>>),
    GetNeighbors(oneshot::Sender<Vec<Node>>),
}

/// Membership state plus placement. Cheaply `Clone`-able: the neighbors map
/// itself lives in a dedicated task and is only ever touched through `tx`.
#[derive(Clone)]
pub struct Cluster {
    myself: Node,
    secret: String,
    heartbeat_interval: Duration,
    tx: mpsc::Sender<Command>,
    client: Arc<NodeClient>,
}

impl Cluster {
    pub fn new(myself: Node, secret: impl Into<String>, heartbeat_interval: Duration) -> Self {
        let secret = secret.into();
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_backend(rx));
        Self {
            client: Arc::new(NodeClient::new(secret.clone())),
            myself,
            secret,
            heartbeat_interval,
            tx,
        }
    }

    pub fn myself(&self) -> &Node {
        &self.myself
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Plain equality; nothing here depends on timing-safety since the
    /// secret is a single cluster-wide shared value, not a per-user credential.
    pub fn check_secret(&self, candidate: &str) -> bool {
        candidate == self.secret
    }

    pub async fn add_neighbor(&self, n: Node) {
        let _ = self.tx.send(Command::AddNeighbor(n)).await;
    }

    pub async fn remove_neighbor(&self, uuid: &str) {
        let _ = self.tx.send(Command::RemoveNeighbor(uuid.to_string())).await;
    }

    /// Merges `BaseURL` + `Writeable` and advances `LastSeen` monotonically
    /// (a stamp older than what's on file is ignored).
    pub async fn update_neighbor(&self, n: Node) {
        let _ = self.tx.send(Command::UpdateNeighbor(n)).await;
    }

    pub async fn failed_neighbor(&self, uuid: &str) {
        let _ = self.tx.send(Command::FailedNeighbor(uuid.to_string())).await;
    }

    pub async fn find_neighbor_by_uuid(&self, uuid: &str) -> Option<Node> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Command::FindByUuid(uuid.to_string(), reply_tx))
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    pub async fn get_neighbors(&self) -> Vec<Node> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::GetNeighbors(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn neighbors_inclusive(&self) -> Vec<Node> {
        let mut all = vec![self.myself.clone()];
        all.extend(self.get_neighbors().await);
        all
    }

    pub async fn writeable_neighbors(&self) -> Vec<Node> {
        self.neighbors_inclusive()
            .await
            .into_iter()
            .filter(|n| n.writeable)
            .collect()
    }

    pub async fn ring(&self) -> Vec<RingEntry> {
        build_ring(&self.neighbors_inclusive().await)
    }

    pub async fn write_ring(&self) -> Vec<RingEntry> {
        build_write_ring(&self.neighbors_inclusive().await)
    }

    /// The placement walk over the full ring (all nodes, `Myself` included
    /// for placement). `size` is neighbor count + 1, not the (possibly
    /// smaller) distinct-node count of a filtered ring.
    pub async fn read_order(&self, hash: &str) -> Vec<Node> {
        let size = self.get_neighbors().await.len() + 1;
        hash_order(hash, size, &self.ring().await)
    }

    pub async fn write_order(&self, hash: &str) -> Vec<Node> {
        let size = self.get_neighbors().await.len() + 1;
        hash_order(hash, size, &self.write_ring().await)
    }

    /// Walk `ReadOrder(key)` skipping `Myself`; return the first peer that
    /// has the object.
    pub async fn retrieve(&self, key: &Key) -> ClusterResult<Bytes> {
        let hash = key.to_string();
        for node in self.read_order(&hash).await {
            if node.uuid == self.myself.uuid {
                continue;
            }
            match self.client.retrieve(&node, key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    debug!(peer = %node.base_url, error = %e, "retrieve from peer failed");
                }
            }
        }
        Err(ClusterError::NotFoundInCluster)
    }

    /// Fan out a write along `WriteOrder(key)`. When `Myself` is selected the
    /// replica is written straight to `backend` rather than looped back
    /// through HTTP. Stops once `count` exceeds `replication`; returns whether
    /// `count >= min_replication`.
    pub async fn add_file(
        &self,
        backend: &dyn Backend,
        key: &Key,
        data: Bytes,
        replication: usize,
        min_replication: usize,
    ) -> bool {
        let hash = key.to_string();
        let mut count = 0usize;
        for node in self.write_order(&hash).await {
            if node.uuid == self.myself.uuid {
                match backend.write(key, data.clone()).await {
                    Ok(()) => count += 1,
                    Err(e) => warn!(%key, error = %e, "local replica write failed"),
                }
            } else {
                match self.client.add_file(&node, key, data.clone()).await {
                    Ok(true) => {
                        count += 1;
                        let mut updated = node.clone();
                        updated.last_seen = Utc::now();
                        self.update_neighbor(updated).await;
                    }
                    Ok(false) | Err(_) => {
                        warn!(peer = %node.base_url, "replica write failed");
                        self.failed_neighbor(&node.uuid).await;
                    }
                }
            }
            if count > replication {
                break;
            }
        }
        count >= min_replication
    }

    /// Learn a peer's `Node` descriptor via `GET <url>/config/`, reject
    /// self-joins and duplicates, add it, then propagate the join to every
    /// existing neighbor and reciprocally to the new peer.
    pub async fn join_neighbor(&self, url: &str) -> ClusterResult<Node> {
        let node = self.client.fetch_config(url).await?;
        if node.uuid == self.myself.uuid {
            return Err(ClusterError::JoinRejected("cannot join self".into()));
        }
        if self.find_neighbor_by_uuid(&node.uuid).await.is_some() {
            return Err(ClusterError::JoinRejected(format!(
                "neighbor {} already known",
                node.uuid
            )));
        }

        self.add_neighbor(node.clone()).await;

        for existing in self.get_neighbors().await {
            if existing.uuid == node.uuid {
                continue;
            }
            if let Err(e) = self.client.announce_join(&existing.base_url, url).await {
                warn!(peer = %existing.base_url, error = %e, "failed to propagate join");
            }
        }
        if let Err(e) = self
            .client
            .announce_join(&node.base_url, &self.myself.base_url)
            .await
        {
            warn!(peer = %node.base_url, error = %e, "failed to announce ourselves to new neighbor");
        }

        Ok(node)
    }

    /// Second-hand news about a node: update it if already known, otherwise
    /// add it as a newly discovered neighbor. Never touches `Myself`.
    pub async fn observe_neighbor(&self, neighbor: Node) {
        if neighbor.uuid == self.myself.uuid {
            return;
        }
        if self.find_neighbor_by_uuid(&neighbor.uuid).await.is_some() {
            self.update_neighbor(neighbor).await;
        } else {
            self.add_neighbor(neighbor).await;
        }
    }

    /// Background loop: every `heartbeat_interval + jitter`, assemble a
    /// heartbeat naming `Myself` and all neighbors, and POST it to every
    /// neighbor.
    pub async fn run_heartbeat(self) -> ! {
        loop {
            let jitter = rand::thread_rng().gen_range(0..=HEARTBEAT_JITTER_MAX_SECS);
            tokio::time::sleep(self.heartbeat_interval + Duration::from_secs(jitter)).await;

            let neighbors = self.get_neighbors().await;
            let hb = Heartbeat {
                uuid: self.myself.uuid.clone(),
                base_url: self.myself.base_url.clone(),
                writeable: self.myself.writeable,
                secret: self.secret.clone(),
                neighbors: neighbors.iter().map(NeighborSummary::from).collect(),
            };

            for node in &neighbors {
                if let Err(e) = self.client.send_heartbeat(node, &hb).await {
                    debug!(peer = %node.base_url, error = %e, "heartbeat failed");
                    self.failed_neighbor(&node.uuid).await;
                }
            }
        }
    }

    /// Background loop: after an initial `3 × interval` warm-up, every
    /// `interval + jitter`, evict neighbors silent for more than
    /// `3 × heartbeat_interval`.
    pub async fn run_reaper(self) -> ! {
        tokio::time::sleep(self.heartbeat_interval * 3).await;
        loop {
            let now = Utc::now();
            let threshold = chrono::Duration::from_std(self.heartbeat_interval * 3)
                .unwrap_or(chrono::Duration::seconds(30));

            for n in self.get_neighbors().await {
                if now - n.last_seen > threshold {
                    info!(peer = %n.base_url, uuid = %n.uuid, "reaping silent neighbor");
                    self.remove_neighbor(&n.uuid).await;
                }
            }

            let jitter = rand::thread_rng().gen_range(0..=REAP_JITTER_MAX_SECS);
            tokio::time::sleep(self.heartbeat_interval + Duration::from_secs(jitter)).await;
        }
    }
}

async fn run_backend(mut rx: mpsc::Receiver<Command>) {
    let mut neighbors: HashMap<String, Node> = HashMap::new();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::AddNeighbor(n) => {
                neighbors.insert(n.uuid.clone(), n);
            }
            Command::RemoveNeighbor(uuid) => {
                neighbors.remove(&uuid);
            }
            Command::UpdateNeighbor(n) => {
                if let Some(existing) = neighbors.get_mut(&n.uuid) {
                    existing.base_url = n.base_url;
                    existing.writeable = n.writeable;
                    if n.last_seen > existing.last_seen {
                        existing.last_seen = n.last_seen;
                    }
                }
            }
            Command::FailedNeighbor(uuid) => {
                if let Some(existing) = neighbors.get_mut(&uuid) {
                    existing.writeable = false;
                    existing.last_failed = Utc::now();
                }
            }
            Command::FindByUuid(uuid, reply) => {
                let _ = reply.send(neighbors.get(&uuid).cloned());
            }
            Command::GetNeighbors(reply) => {
                let _ = reply.send(neighbors.values().cloned().collect());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn myself() -> Node {
        Node::new("self", "http://self", true)
    }

    #[tokio::test]
    async fn add_then_find_neighbor() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        let n = Node::new("peer-a", "http://peer-a", true);
        c.add_neighbor(n.clone()).await;
        let found = c.find_neighbor_by_uuid("peer-a").await;
        assert_eq!(found.unwrap().uuid, "peer-a");
    }

    #[tokio::test]
    async fn add_then_remove_neighbor_is_gone() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        let n = Node::new("peer-a", "http://peer-a", true);
        c.add_neighbor(n).await;
        c.remove_neighbor("peer-a").await;
        assert!(c.find_neighbor_by_uuid("peer-a").await.is_none());
    }

    #[tokio::test]
    async fn update_neighbor_is_monotonic_in_last_seen() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        let mut n = Node::new("peer-a", "http://peer-a", true);
        n.last_seen = Utc::now();
        c.add_neighbor(n.clone()).await;

        let mut stale = n.clone();
        stale.last_seen = n.last_seen - chrono::Duration::seconds(60);
        c.update_neighbor(stale).await;

        let found = c.find_neighbor_by_uuid("peer-a").await.unwrap();
        assert_eq!(found.last_seen, n.last_seen);
    }

    #[tokio::test]
    async fn failed_neighbor_marks_unwriteable() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        c.add_neighbor(Node::new("peer-a", "http://peer-a", true)).await;
        c.failed_neighbor("peer-a").await;
        let found = c.find_neighbor_by_uuid("peer-a").await.unwrap();
        assert!(!found.writeable);
        assert!(found.unhealthy());
    }

    #[tokio::test]
    async fn neighbors_inclusive_contains_myself() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        c.add_neighbor(Node::new("peer-a", "http://peer-a", true)).await;
        let all = c.neighbors_inclusive().await;
        assert!(all.iter().any(|n| n.uuid == "self"));
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn check_secret_is_plain_equality() {
        let c = Cluster::new(myself(), "right-secret", Duration::from_secs(5));
        assert!(c.check_secret("right-secret"));
        assert!(!c.check_secret("wrong-secret"));
    }

    #[tokio::test]
    async fn observe_neighbor_never_touches_myself() {
        let c = Cluster::new(myself(), "secret", Duration::from_secs(5));
        let mut impostor = myself();
        impostor.base_url = "http://hijacked".to_string();
        c.observe_neighbor(impostor).await;
        assert!(c.find_neighbor_by_uuid("self").await.is_none());
    }
}
