//! Corruption detection and peer-repair, serialized through its own
//! single-consumer queue, separate from `Cluster`'s and `Rebalancer`'s.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use cask_core::{CaskError, Key};
use cask_storage::Backend;

use crate::cluster::Cluster;
use crate::error::{ClusterError, ClusterResult};
use crate::node::CheckFileOutcome;
use crate::transport::NodeClient;

enum Request {
    Verify {
        key: Key,
        observed_hash: String,
        reply: oneshot::Sender<ClusterResult<()>>,
    },
    VerifyKey {
        key: Key,
        reply: oneshot::Sender<ClusterResult<()>>,
    },
}

#[derive(Clone)]
pub struct Verifier {
    tx: mpsc::Sender<Request>,
}

impl Verifier {
    pub fn new(cluster: Cluster, backend: Arc<dyn Backend>, client: Arc<NodeClient>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run(rx, cluster, backend, client));
        Self { tx }
    }

    /// `observed_hash` is the already-computed hex digest of the bytes on
    /// disk; if it disagrees with `key`, repair is attempted from a peer.
    pub async fn verify(&self, key: &Key, observed_hash: &str) -> ClusterResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Request::Verify {
                key: key.clone(),
                observed_hash: observed_hash.to_string(),
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }

    /// Reads the local copy, hashes it, and delegates to [`Self::verify`].
    pub async fn verify_key(&self, key: &Key) -> ClusterResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Request::VerifyKey {
                key: key.clone(),
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

async fn run(
    mut rx: mpsc::Receiver<Request>,
    cluster: Cluster,
    backend: Arc<dyn Backend>,
    client: Arc<NodeClient>,
) {
    while let Some(req) = rx.recv().await {
        match req {
            Request::Verify {
                key,
                observed_hash,
                reply,
            } => {
                let result = do_verify(&cluster, backend.as_ref(), client.as_ref(), &key, &observed_hash).await;
                let _ = reply.send(result);
            }
            Request::VerifyKey { key, reply } => {
                let result = do_verify_key(&cluster, backend.as_ref(), client.as_ref(), &key).await;
                let _ = reply.send(result);
            }
        }
    }
}

async fn do_verify_key(
    cluster: &Cluster,
    backend: &dyn Backend,
    client: &NodeClient,
    key: &Key,
) -> ClusterResult<()> {
    let data = backend.read(key).await?;
    let observed = Key::from_bytes(&data);
    do_verify(cluster, backend, client, key, observed.value()).await
}

async fn do_verify(
    cluster: &Cluster,
    backend: &dyn Backend,
    client: &NodeClient,
    key: &Key,
    observed_hash: &str,
) -> ClusterResult<()> {
    if format!("sha1:{observed_hash}") == key.to_string() {
        return Ok(());
    }

    warn!(%key, "corrupted local copy detected");
    match repair_from_peer(cluster, backend, client, key).await {
        Ok(()) => {
            info!(%key, "successfully repaired corrupted file from a peer");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn repair_from_peer(
    cluster: &Cluster,
    backend: &dyn Backend,
    client: &NodeClient,
    key: &Key,
) -> ClusterResult<()> {
    let nodes = cluster.read_order(&key.to_string()).await;
    for node in nodes {
        if node.uuid == cluster.myself().uuid {
            continue;
        }
        match client.check_file(&node, key).await {
            Ok(CheckFileOutcome::Found(bytes)) => {
                backend.write(key, bytes).await?;
                return Ok(());
            }
            Ok(CheckFileOutcome::NotFound) | Ok(CheckFileOutcome::Corrupt) => continue,
            Err(_) => continue,
        }
    }
    Err(ClusterError::Core(CaskError::NotFound(format!(
        "unrepairable: no good copy of {key} found in cluster"
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_storage::LocalBackend;

    #[tokio::test]
    async fn matching_hash_verifies_clean() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(dir.path()));
        let myself = crate::node::Node::new("self", "http://self", true);
        let cluster = Cluster::new(myself, "secret", std::time::Duration::from_secs(5));
        let client = Arc::new(NodeClient::new("secret"));

        let key = Key::from_bytes(b"hello");
        let result = do_verify(&cluster, backend.as_ref(), client.as_ref(), &key, key.value()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mismatched_hash_with_no_peers_is_unrepairable() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(dir.path()));
        let myself = crate::node::Node::new("self", "http://self", true);
        let cluster = Cluster::new(myself, "secret", std::time::Duration::from_secs(5));
        let client = Arc::new(NodeClient::new("secret"));

        let key = Key::from_bytes(b"hello");
        let result = do_verify(&cluster, backend.as_ref(), client.as_ref(), &key, "0000000000000000000000000000000000000000").await;
        assert!(result.is_err());
    }
}
