//! HTTP client for node-to-node communication.
//!
//! One [`NodeClient`] per process, holding a single pooled `reqwest::Client`,
//! mirroring `ClusterTransport`'s approach of a shared client rather than
//! one per call.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{multipart, Client, StatusCode};
use tracing::{debug, warn};

use cask_core::Key;

use crate::error::{ClusterError, ClusterResult};
use crate::node::{CheckFileOutcome, Heartbeat, Node};

const SECRET_HEADER: &str = "X-Cask-Cluster-Secret";
const RETRIEVE_INFO_TIMEOUT: Duration = Duration::from_secs(1);

pub struct NodeClient {
    http: Client,
    secret: String,
}

impl NodeClient {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            secret: secret.into(),
        }
    }

    /// Multipart POST of `data` to `node`'s `/local/` endpoint. A write is
    /// only considered successful if the peer echoes back `key.to_string()`,
    /// an end-to-end integrity check that catches in-flight corruption.
    pub async fn add_file(&self, node: &Node, key: &Key, data: Bytes) -> ClusterResult<bool> {
        let part = multipart::Part::bytes(data.to_vec()).file_name("data");
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/local/", node.base_url))
            .header(SECRET_HEADER, &self.secret)
            .multipart(form)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Ok(false);
        }
        let body = resp.text().await?;
        Ok(body.trim() == key.to_string())
    }

    /// GET `node`'s `/file/<key>/`.
    pub async fn retrieve(&self, node: &Node, key: &Key) -> ClusterResult<Bytes> {
        let resp = self
            .http
            .get(format!("{}/file/{}/", node.base_url, key))
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(ClusterError::NotFoundInCluster);
        }
        Ok(resp.bytes().await?)
    }

    /// HEAD `node`'s `/local/<key>/` with a 1-second timeout. A timeout is
    /// distinct from "not found": it surfaces as `PeerUnreachable` so callers
    /// (the rebalancer) can tell a dead peer from a peer that genuinely
    /// doesn't hold the key.
    pub async fn retrieve_info(&self, node: &Node, key: &Key) -> ClusterResult<bool> {
        let result = self
            .http
            .head(format!("{}/local/{}/", node.base_url, key))
            .header(SECRET_HEADER, &self.secret)
            .timeout(RETRIEVE_INFO_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) => Ok(resp.status() == StatusCode::OK),
            Err(e) if e.is_timeout() => {
                Err(ClusterError::PeerUnreachable(node.base_url.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// GET `node`'s `/file/<key>/` and recompute the hash locally, so a
    /// corrupt peer copy is detected even though the peer reported success.
    pub async fn check_file(&self, node: &Node, key: &Key) -> ClusterResult<CheckFileOutcome> {
        let resp = self
            .http
            .get(format!("{}/file/{}/", node.base_url, key))
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Ok(CheckFileOutcome::NotFound);
        }
        let bytes = resp.bytes().await?;
        let observed = Key::from_bytes(&bytes);
        if observed.to_string() == key.to_string() {
            Ok(CheckFileOutcome::Found(bytes))
        } else {
            Ok(CheckFileOutcome::Corrupt)
        }
    }

    /// POST a heartbeat to `node`. Errors are logged and swallowed by the
    /// caller (the heartbeat loop), not here, so callers can still decide to
    /// mark the peer failed.
    pub async fn send_heartbeat(&self, node: &Node, hb: &Heartbeat) -> ClusterResult<()> {
        let resp = self
            .http
            .post(format!("{}/heartbeat/", node.base_url))
            .json(hb)
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(peer = %node.base_url, status = %resp.status(), "heartbeat rejected");
        }
        Ok(())
    }

    /// GET `<base_url>/config/` to learn a remote's `Node` descriptor, used
    /// when joining a new neighbor.
    pub async fn fetch_config(&self, base_url: &str) -> ClusterResult<Node> {
        let resp = self.http.get(format!("{}/config/", base_url)).send().await?;
        if !resp.status().is_success() {
            return Err(ClusterError::JoinRejected(format!(
                "GET /config/ failed: {}",
                resp.status()
            )));
        }
        debug!(base_url, "fetched peer config");
        Ok(resp.json().await?)
    }

    /// POST `{url, secret}` to `target`'s `/join/`, propagating a new
    /// neighbor to an already-known peer (or announcing ourselves to a
    /// newly discovered one).
    pub async fn announce_join(&self, target: &str, joined_url: &str) -> ClusterResult<()> {
        let resp = self
            .http
            .post(format!("{}/join/", target))
            .form(&[("url", joined_url), ("secret", &self.secret)])
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(target, status = %resp.status(), "join propagation rejected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_is_constructible() {
        let _ = NodeClient::new("s3cr3t");
    }
}
