//! `Site`: the immutable composition root binding node, cluster, backend,
//! rebalancer, and verifier together, plus the policy knobs that govern
//! them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cask_core::Key;
use cask_storage::{AaeHooks, Backend};

use crate::cluster::Cluster;
use crate::error::{ClusterError, ClusterResult};
use crate::node::Node;
use crate::rebalancer::Rebalancer;
use crate::transport::NodeClient;
use crate::verifier::Verifier;

pub struct Site {
    pub cluster: Cluster,
    pub backend: Arc<dyn Backend>,
    pub replication: usize,
    pub max_replication: usize,
    pub aae_interval: Duration,
    pub verifier: Verifier,
    pub rebalancer: Rebalancer,
    pub client: Arc<NodeClient>,
}

impl Site {
    /// Clamps `replication ≥ 1`, `max_replication ≥ replication`, and
    /// `aae_interval ≥ 1s`.
    pub fn new(
        myself: Node,
        secret: impl Into<String>,
        heartbeat_interval: Duration,
        backend: Arc<dyn Backend>,
        replication: usize,
        max_replication: usize,
        aae_interval: Duration,
    ) -> Arc<Self> {
        let secret = secret.into();
        let replication = replication.max(1);
        let max_replication = max_replication.max(replication);
        let aae_interval = if aae_interval.as_secs() < 1 {
            Duration::from_secs(5)
        } else {
            aae_interval
        };

        let cluster = Cluster::new(myself, secret.clone(), heartbeat_interval);
        let client = Arc::new(NodeClient::new(secret));
        let verifier = Verifier::new(cluster.clone(), backend.clone(), client.clone());
        let rebalancer = Rebalancer::new(
            cluster.clone(),
            backend.clone(),
            client.clone(),
            replication,
            max_replication,
        );

        Arc::new(Self {
            cluster,
            backend,
            replication,
            max_replication,
            aae_interval,
            verifier,
            rebalancer,
            client,
        })
    }

    /// Hashes `data`, fans the write out along `WriteOrder(key)` (writing the
    /// local replica directly when `Myself` is selected), and reports whether
    /// at least `replication` copies landed.
    pub async fn add_file(&self, data: bytes::Bytes) -> (cask_core::Key, bool) {
        let key = cask_core::Key::from_bytes(&data);
        let success = self
            .cluster
            .add_file(
                self.backend.as_ref(),
                &key,
                data,
                self.replication,
                self.replication,
            )
            .await;
        (key, success)
    }

    pub async fn rebalance(&self, key: Key) -> ClusterResult<()> {
        self.rebalancer.rebalance(key).await
    }

    pub async fn verify(&self, key: &Key, observed_hash: &str) -> ClusterResult<()> {
        self.verifier.verify(key, observed_hash).await
    }

    pub async fn verify_key(&self, key: &Key) -> ClusterResult<()> {
        self.verifier.verify_key(key).await
    }

    /// Spawns the background loops owned by this site: heartbeat, reaper,
    /// and the active-anti-entropy sweep. Called once, from `cask-cli`.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        tokio::spawn(self.cluster.clone().run_heartbeat());
        tokio::spawn(self.cluster.clone().run_reaper());

        let backend = self.backend.clone();
        let hooks: Arc<dyn AaeHooks> = self.clone();
        let interval = self.aae_interval;
        tokio::spawn(async move {
            cask_storage::run_active_entropy(backend, hooks, interval).await
        });
    }
}

#[async_trait]
impl AaeHooks for Site {
    async fn verify(&self, key: &Key, observed_hash: &str) -> cask_core::Result<()> {
        self.verify(key, observed_hash)
            .await
            .map_err(cluster_err_to_core)
    }

    async fn rebalance(&self, key: &Key) -> cask_core::Result<()> {
        self.rebalance(key.clone()).await.map_err(cluster_err_to_core)
    }
}

fn cluster_err_to_core(e: ClusterError) -> cask_core::CaskError {
    match e {
        ClusterError::Core(inner) => inner,
        other => cask_core::CaskError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_storage::LocalBackend;

    #[test]
    fn clamps_replication_floor_and_aae_interval() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(dir.path()));
        let myself = Node::new("self", "http://self", true);
        let site = Site::new(
            myself,
            "secret",
            Duration::from_secs(5),
            backend,
            0,
            0,
            Duration::from_secs(0),
        );
        assert_eq!(site.replication, 1);
        assert_eq!(site.max_replication, 1);
        assert_eq!(site.aae_interval, Duration::from_secs(5));
    }
}
