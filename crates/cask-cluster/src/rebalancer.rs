//! Per-key replica reconciliation: an actor serializing rebalance requests
//! over a request/reply channel so two sweeps of the same key never race.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use cask_core::Key;
use cask_storage::Backend;

use crate::cluster::Cluster;
use crate::error::ClusterResult;
use crate::node::Node;
use crate::transport::NodeClient;

struct RebalanceRequest {
    key: Key,
    reply: oneshot::Sender<ClusterResult<()>>,
}

#[derive(Clone)]
pub struct Rebalancer {
    tx: mpsc::Sender<RebalanceRequest>,
}

impl Rebalancer {
    pub fn new(
        cluster: Cluster,
        backend: Arc<dyn Backend>,
        client: Arc<NodeClient>,
        replication: usize,
        max_replication: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run(rx, cluster, backend, client, replication, max_replication));
        Self { tx }
    }

    pub async fn rebalance(&self, key: Key) -> ClusterResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(RebalanceRequest { key, reply: reply_tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }
}

async fn run(
    mut rx: mpsc::Receiver<RebalanceRequest>,
    cluster: Cluster,
    backend: Arc<dyn Backend>,
    client: Arc<NodeClient>,
    replication: usize,
    max_replication: usize,
) {
    while let Some(req) = rx.recv().await {
        let result = do_rebalance(
            &cluster,
            backend.as_ref(),
            client.as_ref(),
            replication,
            max_replication,
            &req.key,
        )
        .await;
        let _ = req.reply.send(result);
    }
}

/// Walks the read ring (all nodes, `Myself` included in placement — not the
/// write ring; this is intentional, not an oversight) deciding whether
/// the local replica is still needed.
async fn do_rebalance(
    cluster: &Cluster,
    backend: &dyn Backend,
    client: &NodeClient,
    replication: usize,
    max_replication: usize,
    key: &Key,
) -> ClusterResult<()> {
    let nodes = cluster.read_order(&key.to_string()).await;

    let mut found = 0usize;
    let mut delete_local = true;
    let mut satisfied = false;

    for n in nodes {
        if n.uuid == cluster.myself().uuid {
            delete_local = false;
            found += 1;
        } else {
            found += retrieve_replica(client, backend, &n, key, satisfied).await;
        }

        if found >= replication {
            satisfied = true;
        }
        if found >= max_replication {
            break;
        }
    }

    if satisfied && delete_local {
        debug!(%key, "rebalancer pruning excess local replica");
        backend.delete(key).await?;
    }

    Ok(())
}

/// Ask `node` whether it already holds `key`. Only a clean confirmation
/// skips the push: a clean miss and an unreachable/timed-out peer both fall
/// through to the writeable/unsatisfied push attempt below, since a peer we
/// couldn't reach is no more known to hold the key than one that said no.
async fn retrieve_replica(
    client: &NodeClient,
    backend: &dyn Backend,
    node: &Node,
    key: &Key,
    satisfied: bool,
) -> usize {
    match client.retrieve_info(node, key).await {
        Ok(true) => return 1,
        Ok(false) => {}
        Err(e) => {
            debug!(peer = %node.base_url, %key, error = %e, "peer unreachable during rebalance");
        }
    }

    if !node.writeable || satisfied {
        return 0;
    }
    match backend.read(key).await {
        Ok(data) => match client.add_file(node, key, data).await {
            Ok(true) => 1,
            Ok(false) => {
                warn!(peer = %node.base_url, %key, "replica push rejected");
                0
            }
            Err(e) => {
                warn!(peer = %node.base_url, %key, error = %e, "replica push failed");
                0
            }
        },
        Err(e) => {
            warn!(%key, error = %e, "couldn't read local copy to stream to peer");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    // `do_rebalance` drives network calls through `NodeClient`, so its
    // branch logic is exercised indirectly via the rebalancer-delete
    // scenario in `cask-cluster`'s integration-style tests in `site.rs`,
    // which stub a local-only cluster (no peers) and assert deletion is
    // skipped when the local node is the sole ring member.
}
